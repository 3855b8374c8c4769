//! Server builder and runtime.
//!
//! The [`ServerBuilder`] provides a fluent API for pairing endpoints with
//! handlers. The [`Server`] owns the resulting listeners:
//! 1. Create every listener (all or nothing)
//! 2. Run one dispatch loop per listener concurrently
//! 3. Close every listener, collecting all failures
//!
//! # Example
//!
//! ```ignore
//! use xpcwire::Server;
//!
//! let server = Server::builder(transport)
//!     .handle("com.example.add", |req: AddRequest, ctx| async move {
//!         ctx.respond(&AddResponse { result: req.first + req.second })
//!     })
//!     .build()?;
//!
//! server.run_until(tokio::signal::ctrl_c()).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{CloseErrors, Result, XpcError};
use crate::handler::{EndpointEntry, Handler, HandlerRegistry, HandlerResult, Peer, RequestContext};
use crate::listener::{Listener, ListenerConfig};
use crate::transport::{Message, Transport};

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    transport: Arc<dyn Transport>,
    registry: HandlerRegistry,
    requirement: Option<String>,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            registry: HandlerRegistry::new(),
            requirement: None,
        }
    }

    /// Peer requirement for every listener that does not set its own.
    pub fn requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirement = Some(requirement.into());
        self
    }

    /// Register a typed handler for `endpoint`.
    ///
    /// The handler receives the decoded request and a context for replying.
    pub fn handle<F, T, Fut>(mut self, endpoint: &str, handler: F) -> Self
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(endpoint, handler);
        self
    }

    /// Register a handler that receives the undecoded message.
    pub fn handle_raw<F, Fut>(mut self, endpoint: &str, handler: F) -> Self
    where
        F: Fn(Peer, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register_raw(endpoint, handler);
        self
    }

    /// Add every endpoint of a prepared registry.
    ///
    /// Endpoints already on the builder are replaced in place.
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        for entry in registry.into_entries() {
            self.registry.insert(entry.config, entry.handler);
        }
        self
    }

    /// Register a handler under a full listener configuration.
    pub fn listener(mut self, config: ListenerConfig, handler: Arc<dyn Handler>) -> Self {
        self.registry.insert(config, handler);
        self
    }

    /// Create and activate every listener.
    ///
    /// # Errors
    ///
    /// The first listener failure. Listeners created before it are closed.
    pub fn build(mut self) -> Result<Server> {
        if let Some(requirement) = &self.requirement {
            for entry in self.registry.entries_mut() {
                if entry.config.peer_requirement().is_none() {
                    entry.config = entry.config.clone().requirement(requirement.clone());
                }
            }
        }
        Server::from_entries(self.transport, self.registry.into_entries())
    }
}

/// A set of listeners started and stopped together.
#[derive(Debug)]
pub struct Server {
    listeners: Vec<Arc<Listener>>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder(transport: Arc<dyn Transport>) -> ServerBuilder {
        ServerBuilder::new(transport)
    }

    /// Create one listener per configuration, all or nothing.
    ///
    /// # Errors
    ///
    /// The first listener failure. Listeners created before it are closed.
    pub fn new<I>(transport: Arc<dyn Transport>, listeners: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ListenerConfig, Arc<dyn Handler>)>,
    {
        let entries = listeners
            .into_iter()
            .map(|(config, handler)| EndpointEntry { config, handler })
            .collect();
        Self::from_entries(transport, entries)
    }

    fn from_entries(transport: Arc<dyn Transport>, entries: Vec<EndpointEntry>) -> Result<Self> {
        let mut listeners = Vec::with_capacity(entries.len());
        for EndpointEntry { config, handler } in entries {
            match Listener::new(transport.clone(), config, handler) {
                Ok(listener) => listeners.push(Arc::new(listener)),
                Err(e) => {
                    for listener in &listeners {
                        if let Err(close_err) = listener.close() {
                            warn!(endpoint = listener.endpoint(), error = %close_err, "rollback close failed");
                        }
                    }
                    return Err(e);
                }
            }
        }
        debug!(count = listeners.len(), "server ready");
        Ok(Self { listeners })
    }

    pub fn listeners(&self) -> &[Arc<Listener>] {
        &self.listeners
    }

    /// Run every dispatch loop until all of them end.
    ///
    /// Loops end when their listener is closed. A handler panic is resumed
    /// here once observed.
    ///
    /// # Errors
    ///
    /// The first loop error, e.g. [`XpcError::AlreadyRunning`].
    pub async fn run(&self) -> Result<()> {
        let mut loops = JoinSet::new();
        for listener in &self.listeners {
            let listener = listener.clone();
            loops.spawn(async move { listener.run().await });
        }
        info!(listeners = self.listeners.len(), "server running");

        let mut first_error = None;
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "dispatch loop failed");
                    first_error.get_or_insert(e);
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => warn!(error = %e, "dispatch loop cancelled"),
            }
        }
        info!("server stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Run until `shutdown` resolves, then close and drain every loop.
    pub async fn run_until<F: Future>(&self, shutdown: F) -> Result<()> {
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            _ = shutdown => info!("shutdown requested"),
        }

        let closed = self.close();
        let drained = run.await;
        closed.and(drained)
    }

    /// Close every listener.
    ///
    /// # Errors
    ///
    /// [`XpcError::Close`] listing every listener that failed to close.
    pub fn close(&self) -> Result<()> {
        let errors: Vec<XpcError> = self
            .listeners
            .iter()
            .filter_map(|listener| listener.close().err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CloseErrors::new(errors).into())
        }
    }
}
