//! Handlers and the endpoint registry a server is built from.
//!
//! Each endpoint has exactly one handler. Typed handlers decode the request
//! body before user code runs; raw handlers see the [`Peer`] and the
//! undecoded [`Message`].
//!
//! # Example
//!
//! ```ignore
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register("com.example.add", |req: AddRequest, ctx| async move {
//!     ctx.respond(&AddResponse { result: req.first + req.second })
//! });
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::{Peer, RequestContext};
use crate::codec::DynamicCodec;
use crate::error::Result;
use crate::listener::ListenerConfig;
use crate::transport::Message;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle one inbound message.
    fn call(&self, peer: Peer, message: Message) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that decodes the message body before calling the handler.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> Handler for TypedHandler<F, T, Fut>
where
    F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, peer: Peer, message: Message) -> BoxFuture<'static, HandlerResult> {
        let request: T = match DynamicCodec::decode(message.body()) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(request, RequestContext::new(peer, message));
        Box::pin(fut)
    }
}

/// Wrapper for handlers that work on the undecoded message.
pub struct RawHandler<F, Fut>
where
    F: Fn(Peer, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
}

impl<F, Fut> RawHandler<F, Fut>
where
    F: Fn(Peer, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> Handler for RawHandler<F, Fut>
where
    F: Fn(Peer, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, peer: Peer, message: Message) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(peer, message))
    }
}

/// Entry for a registered endpoint.
pub(crate) struct EndpointEntry {
    pub(crate) config: ListenerConfig,
    pub(crate) handler: Arc<dyn Handler>,
}

/// Registry mapping endpoint names to handlers, in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<EndpointEntry>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for `endpoint`.
    pub fn register<F, T, Fut>(&mut self, endpoint: &str, handler: F)
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert(ListenerConfig::new(endpoint), Arc::new(TypedHandler::new(handler)));
    }

    /// Register a raw handler for `endpoint`.
    pub fn register_raw<F, Fut>(&mut self, endpoint: &str, handler: F)
    where
        F: Fn(Peer, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.insert(ListenerConfig::new(endpoint), Arc::new(RawHandler::new(handler)));
    }

    /// Register a handler under a full listener configuration.
    ///
    /// Registering the same endpoint twice keeps the position of the first
    /// registration and the handler of the last.
    pub fn insert(&mut self, config: ListenerConfig, handler: Arc<dyn Handler>) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.config.endpoint() == config.endpoint())
        {
            Some(entry) => {
                entry.config = config;
                entry.handler = handler;
            }
            None => self.entries.push(EndpointEntry { config, handler }),
        }
    }

    /// Get a handler by endpoint name.
    pub fn get_handler(&self, endpoint: &str) -> Option<&dyn Handler> {
        self.entries
            .iter()
            .find(|e| e.config.endpoint() == endpoint)
            .map(|e| e.handler.as_ref())
    }

    /// Endpoint names in registration order.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.config.endpoint())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut EndpointEntry> {
        self.entries.iter_mut()
    }

    pub(crate) fn into_entries(self) -> Vec<EndpointEntry> {
        self.entries
    }
}
