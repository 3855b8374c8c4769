//! Integration tests for xpcwire.
//!
//! These tests run a server and sessions against the in-process transport.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use xpcwire::codec::{DynamicCodec, Object};
use xpcwire::handler::{Handler, RawHandler};
use xpcwire::transport::{Message, MessageId};
use xpcwire::{
    ListenerConfig, ListenerState, LocalTransport, RequestContext, Server, Session, XpcError,
};

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

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct AddResponse {
    #[serde(rename = "Result")]
    result: i64,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Greeting {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct PanicRequest {
    #[serde(rename = "Panic")]
    panic: bool,
}

fn daemon(transport: Arc<LocalTransport>) -> Arc<Server> {
    let server = Server::builder(transport)
        .handle(ADD, |req: AddRequest, ctx: RequestContext| async move {
            ctx.respond(&AddResponse {
                result: req.first + req.second,
            })
        })
        .handle(PING, |req: Greeting, ctx: RequestContext| async move {
            let message = if req.message == "hello" { "pong" } else { "what?" };
            ctx.respond(&Greeting {
                message: message.into(),
            })
        })
        .handle(PANIC, |req: PanicRequest, ctx: RequestContext| async move {
            if req.panic {
                panic!("asked to panic");
            }
            ctx.respond(&Greeting {
                message: "didn't panic".into(),
            })
        })
        .build()
        .unwrap();
    Arc::new(server)
}

fn spawn_run(server: &Arc<Server>) -> JoinHandle<xpcwire::Result<()>> {
    let server = server.clone();
    tokio::spawn(async move { server.run().await })
}

/// The add endpoint sums the two numbers.
#[tokio::test]
async fn test_add_end_to_end() {
    let transport = Arc::new(LocalTransport::new());
    let server = daemon(transport.clone());
    let runner = spawn_run(&server);

    let session = Session::open(transport.clone(), ADD).unwrap();
    let reply: AddResponse = session
        .send_and_wait(&AddRequest {
            first: 1,
            second: 2,
        })
        .await
        .unwrap();
    assert_eq!(reply, AddResponse { result: 3 });

    session.close().unwrap();
    server.close().unwrap();
    runner.await.unwrap().unwrap();
    assert_eq!(transport.live_handles(), 0);
}

/// The ping endpoint answers "hello" with "pong".
#[tokio::test]
async fn test_ping_pong() {
    let transport = Arc::new(LocalTransport::new());
    let server = daemon(transport.clone());
    let runner = spawn_run(&server);

    let session = Session::open(transport.clone(), PING).unwrap();
    let reply: Greeting = session
        .send_and_wait(&Greeting {
            message: "hello".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply.message, "pong");

    server.close().unwrap();
    runner.await.unwrap().unwrap();
}

/// A request that does not panic gets its normal reply.
#[tokio::test]
async fn test_panic_endpoint_without_panic() {
    let transport = Arc::new(LocalTransport::new());
    let server = daemon(transport.clone());
    let runner = spawn_run(&server);

    let session = Session::open(transport.clone(), PANIC).unwrap();
    let reply: Greeting = session
        .send_and_wait(&PanicRequest { panic: false })
        .await
        .unwrap();
    assert_eq!(reply.message, "didn't panic");

    server.close().unwrap();
    runner.await.unwrap().unwrap();
}

/// A panicking handler fails the waiting client and is fatal for the server.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_handler() {
    let transport = Arc::new(LocalTransport::new());
    let server = daemon(transport.clone());
    let runner = spawn_run(&server);

    let session = Session::open(transport.clone(), PANIC).unwrap();
    let err = session
        .send_and_wait::<_, Greeting>(&PanicRequest { panic: true })
        .await
        .unwrap_err();
    match err {
        XpcError::Transport(rich) => assert!(!rich.can_retry()),
        other => panic!("unexpected error: {other:?}"),
    }

    server.close().unwrap();
    let joined = runner.await;
    assert!(joined.unwrap_err().is_panic());
}

/// Handler order equals delivery order with several concurrent senders.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_keep_delivery_order() {
    const ENDPOINT: &str = "com.example.ordered";
    const SENDERS: usize = 4;
    const PER_SENDER: i64 = 50;

    let transport = Arc::new(LocalTransport::new());
    let seen: Arc<Mutex<Vec<MessageId>>> = Arc::default();
    let recorder = seen.clone();

    let server = Arc::new(
        Server::builder(transport.clone())
            .handle_raw(ENDPOINT, move |_peer, message: Message| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push(message.id());
                    Ok(())
                }
            })
            .build()
            .unwrap(),
    );
    let runner = spawn_run(&server);

    let senders: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let transport = transport.clone();
            std::thread::spawn(move || {
                let session = Session::open(transport, ENDPOINT).unwrap();
                for seq in 0..PER_SENDER {
                    session
                        .send(&AddRequest {
                            first: sender as i64,
                            second: seq,
                        })
                        .unwrap();
                }
                session.close().unwrap();
            })
        })
        .collect();
    for sender in senders {
        sender.join().unwrap();
    }

    let delivered = transport.delivery_log(ENDPOINT);
    server.close().unwrap();
    runner.await.unwrap().unwrap();

    assert!(transport.delivery_log(ENDPOINT).is_empty());
    assert_eq!(delivered.len(), SENDERS * PER_SENDER as usize);
    assert_eq!(*seen.lock().unwrap(), delivered);
}

/// Three endpoints where the second fails activation leave nothing registered.
#[test]
fn test_partial_startup_rolls_back() {
    let transport = Arc::new(LocalTransport::new());
    transport.fail_activation("com.example.second");

    let noop = || -> Arc<dyn Handler> { Arc::new(RawHandler::new(|_peer, _msg| async { Ok(()) })) };
    let err = Server::new(
        transport.clone(),
        vec![
            (ListenerConfig::new("com.example.first"), noop()),
            (ListenerConfig::new("com.example.second"), noop()),
            (ListenerConfig::new("com.example.third"), noop()),
        ],
    )
    .unwrap_err();

    match err {
        XpcError::ActivationFailed { endpoint, .. } => assert_eq!(endpoint, "com.example.second"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.live_registrations(), 0);
    assert_eq!(transport.live_handles(), 0);
    assert!(!transport.is_active("com.example.first"));
}

/// Close reports every failing listener, and still releases all of them.
#[tokio::test]
async fn test_close_collects_every_failure() {
    let transport = Arc::new(LocalTransport::new());
    transport.fail_cancellation(ADD);
    transport.fail_cancellation(PANIC);

    let server = daemon(transport.clone());
    let runner = spawn_run(&server);

    let err = server.close().unwrap_err();
    match err {
        XpcError::Close(errors) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.to_string().contains(ADD));
            assert!(errors.to_string().contains(PANIC));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    runner.await.unwrap().unwrap();
    for listener in server.listeners() {
        assert_eq!(listener.state(), ListenerState::Closed);
    }
    assert_eq!(transport.live_handles(), 0);
}

/// `run_until` closes everything once the shutdown future resolves.
#[tokio::test]
async fn test_run_until_shutdown_signal() {
    let transport = Arc::new(LocalTransport::new());
    let server = daemon(transport.clone());
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let runner = {
        let server = server.clone();
        tokio::spawn(async move { server.run_until(stop_rx).await })
    };

    let session = Session::open(transport.clone(), ADD).unwrap();
    let reply: AddResponse = session
        .send_and_wait(&AddRequest {
            first: 20,
            second: 22,
        })
        .await
        .unwrap();
    assert_eq!(reply.result, 42);
    session.close().unwrap();

    stop_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
    assert_eq!(transport.live_handles(), 0);
    assert!(Session::open(transport, ADD).is_err());
}

/// A request without the expected fields decodes with zero values.
#[tokio::test]
async fn test_missing_fields_decode_as_zero() {
    #[derive(Serialize)]
    struct OnlyFirst {
        #[serde(rename = "FirstNumber")]
        first: i64,
    }

    let transport = Arc::new(LocalTransport::new());
    let server = daemon(transport.clone());
    let runner = spawn_run(&server);

    let session = Session::open(transport.clone(), ADD).unwrap();
    let reply: AddResponse = session.send_and_wait(&OnlyFirst { first: 5 }).await.unwrap();
    assert_eq!(reply.result, 5);

    server.close().unwrap();
    runner.await.unwrap().unwrap();
}

/// A raw handler sees the undecoded dictionary.
#[tokio::test]
async fn test_raw_handler_sees_object() {
    let transport = Arc::new(LocalTransport::new());
    let server = Arc::new(
        Server::builder(transport.clone())
            .handle_raw("com.example.raw", |peer, message: Message| async move {
                let keys = message.body().as_dictionary().map_or(0, |d| d.len());
                peer.reply(
                    &message,
                    &AddResponse {
                        result: keys as i64,
                    },
                )
            })
            .build()
            .unwrap(),
    );
    let runner = spawn_run(&server);

    let session = Session::open(transport.clone(), "com.example.raw").unwrap();
    let reply: AddResponse = session
        .send_and_wait(&AddRequest {
            first: 0,
            second: 0,
        })
        .await
        .unwrap();
    assert_eq!(reply.result, 2);

    server.close().unwrap();
    runner.await.unwrap().unwrap();
}

/// A file descriptor crosses the transport and can be read on the other side.
#[cfg(unix)]
#[tokio::test]
async fn test_file_descriptor_round_trip() {
    use std::io::{Read, Seek, SeekFrom, Write};
    use xpcwire::Fd;

    #[derive(Serialize, Deserialize)]
    struct ReadFile {
        #[serde(rename = "File")]
        file: Fd,
    }

    let transport = Arc::new(LocalTransport::new());
    let server = Arc::new(
        Server::builder(transport.clone())
            .handle("com.example.cat", |req: ReadFile, ctx: RequestContext| async move {
                let mut contents = String::new();
                let mut file = req
                    .file
                    .try_clone_file()
                    .map_err(|e| XpcError::Codec(e.to_string()))?;
                file.seek(SeekFrom::Start(0))
                    .and_then(|_| file.read_to_string(&mut contents))
                    .map_err(|e| XpcError::Codec(e.to_string()))?;
                ctx.respond(&Greeting { message: contents })
            })
            .build()
            .unwrap(),
    );
    let runner = spawn_run(&server);

    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"hello from a descriptor").unwrap();

    let session = Session::open(transport.clone(), "com.example.cat").unwrap();
    let reply: Greeting = session
        .send_and_wait(&ReadFile {
            file: Fd::from_file(&file),
        })
        .await
        .unwrap();
    assert_eq!(reply.message, "hello from a descriptor");

    server.close().unwrap();
    runner.await.unwrap().unwrap();
}

/// Payloads that are not structs never reach the transport.
#[tokio::test]
async fn test_non_struct_payload_rejected() {
    let transport = Arc::new(LocalTransport::new());
    let server = daemon(transport.clone());

    let session = Session::open(transport.clone(), ADD).unwrap();
    let err = session
        .send_and_wait::<_, AddResponse>(&42i64)
        .await
        .unwrap_err();
    assert!(matches!(err, XpcError::PayloadMustBeStruct(_)));
    assert!(transport.delivery_log(ADD).is_empty());

    server.close().unwrap();
}

/// Encoded objects render as JSON for logging.
#[test]
fn test_object_display_for_logs() {
    let obj = DynamicCodec::encode(&AddResponse { result: 3 }).unwrap();
    assert_eq!(obj.to_string(), r#"{"Result":3}"#);
    assert_eq!(obj.get("Result"), Some(&Object::Int64(3)));
}
