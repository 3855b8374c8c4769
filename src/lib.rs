//! # xpcwire
//!
//! Typed request/response messaging over a dynamic-object IPC transport.
//!
//! The transport only understands nine tagged kinds (null, bool, signed and
//! unsigned 64-bit integers, double, string, array, dictionary and file
//! descriptor). This crate lets both sides exchange ordinary Rust values:
//!
//! - **Codec** ([`codec`]): serde-driven conversion between native values and [`Object`]
//! - **Client** ([`Session`]): one-way sends and request/reply over one connection
//! - **Server** ([`Listener`], [`Server`]): registered endpoints with ordered dispatch
//!
//! The host facility is abstracted by [`Transport`]; [`LocalTransport`]
//! routes everything in-process.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use xpcwire::{LocalTransport, Server, Session};
//!
//! #[tokio::main]
//! async fn main() -> xpcwire::Result<()> {
//!     let transport = Arc::new(LocalTransport::new());
//!
//!     let server = Server::builder(transport.clone())
//!         .handle("com.example.add", |req: AddRequest, ctx| async move {
//!             ctx.respond(&AddResponse { result: req.first + req.second })
//!         })
//!         .build()?;
//!
//!     let session = Session::open(transport, "com.example.add")?;
//!     let reply: AddResponse = session
//!         .send_and_wait(&AddRequest { first: 1, second: 2 })
//!         .await?;
//!
//!     server.close()?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod listener;
pub mod transport;

mod server;
mod session;

pub use codec::{DynamicCodec, Fd, Object, RemoteError, StructuredError};
pub use error::{CloseErrors, RichError, XpcError, Result};
pub use handler::{Peer, RequestContext};
pub use listener::{Listener, ListenerConfig, ListenerState};
pub use server::{Server, ServerBuilder};
pub use session::Session;
pub use transport::{LocalTransport, Transport};
