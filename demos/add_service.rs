//! Add/ping/panic daemon - request/response over the in-process transport.
//!
//! This example demonstrates:
//! - Building a server with typed handlers
//! - Calling it from a session with `send_and_wait`
//! - Shutting down on Ctrl-C with `run_until`
//!
//! ```text
//! RUST_LOG=xpcwire=debug cargo run --example add_service
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;
use xpcwire::{LocalTransport, RequestContext, Server, Session};

const ADD: &str = "com.foobar.daemon.add";
const PING: &str = "com.foobar.daemon.ping";
const PANIC: &str = "com.foobar.daemon.panic";

#[derive(Serialize, Deserialize, Debug)]
struct AddRequest {
    #[serde(rename = "FirstNumber")]
    first: i64,
    #[serde(rename = "SecondNumber")]
    second: i64,
}

#[derive(Serialize, Deserialize, Debug)]
struct AddResponse {
    #[serde(rename = "Result")]
    result: i64,
}

#[derive(Serialize, Deserialize, Debug)]
struct Greeting {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct PanicRequest {
    #[serde(rename = "Panic")]
    panic: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let transport = Arc::new(LocalTransport::new());

    let server = Arc::new(
        Server::builder(transport.clone())
            .handle(ADD, |req: AddRequest, ctx: RequestContext| async move {
                ctx.respond(&AddResponse {
                    result: req.first + req.second,
                })
            })
            .handle(PING, |req: Greeting, ctx: RequestContext| async move {
                info!(message = %req.message, "ping");
                ctx.respond(&Greeting {
                    message: "pong".into(),
                })
            })
            .handle(PANIC, |req: PanicRequest, ctx: RequestContext| async move {
                if req.panic {
                    panic!("panic requested by client");
                }
                ctx.respond(&Greeting {
                    message: "didn't panic".into(),
                })
            })
            .build()?,
    );

    let daemon = {
        let server = server.clone();
        tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
        })
    };

    let add = Session::open(transport.clone(), ADD)?;
    let sum: AddResponse = add
        .send_and_wait(&AddRequest {
            first: 1,
            second: 2,
        })
        .await?;
    println!("1 + 2 = {}", sum.result);
    add.close()?;

    let ping = Session::open(transport.clone(), PING)?;
    let pong: Greeting = ping
        .send_and_wait(&Greeting {
            message: "hello".into(),
        })
        .await?;
    println!("ping -> {}", pong.message);
    ping.close()?;

    let calm = Session::open(transport.clone(), PANIC)?;
    let reply: Greeting = calm.send_and_wait(&PanicRequest { panic: false }).await?;
    println!("panic endpoint -> {}", reply.message);
    calm.close()?;

    println!("serving until Ctrl-C");
    daemon.await??;
    Ok(())
}
