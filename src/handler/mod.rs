//! Handler module - what runs for each inbound message.
//!
//! Provides:
//! - [`Handler`] - the trait a listener's dispatch loop calls
//! - [`TypedHandler`] / [`RawHandler`] - closures adapted to [`Handler`]
//! - [`HandlerRegistry`] - maps endpoint names to handlers
//! - [`Peer`] / [`RequestContext`] - reply to the sender
//!
//! # Example
//!
//! ```ignore
//! use xpcwire::handler::{HandlerRegistry, RequestContext};
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register("com.example.ping", |req: Greeting, ctx: RequestContext| async move {
//!     ctx.respond(&Greeting { message: "pong".into() })
//! });
//! ```

mod context;
mod registry;

pub use context::{Peer, RequestContext};
pub(crate) use registry::EndpointEntry;
pub use registry::{BoxFuture, Handler, HandlerRegistry, HandlerResult, RawHandler, TypedHandler};
