//! Listener - one registered endpoint and its dispatch loop.
//!
//! Lifecycle:
//! 1. Open a hand-off channel and register it with the [`bridge`]
//! 2. Register the endpoint with the transport
//! 3. Apply the peer requirement, if any
//! 4. Activate
//! 5. [`Listener::run`] drains the channel, one handler call at a time
//! 6. [`Listener::close`] tears everything down and ends the loop
//!
//! A failure in steps 1-4 releases whatever was acquired before the error
//! is returned.

pub mod bridge;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use self::bridge::{BridgeToken, Delivery};
use crate::error::{Result, XpcError};
use crate::handler::{Handler, Peer};
use crate::transport::{Handle, Registration, Transport};

/// Configuration of one listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    endpoint: String,
    requirement: Option<String>,
}

impl ListenerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            requirement: None,
        }
    }

    /// Restrict connecting peers to those satisfying `requirement`.
    ///
    /// Ignored (with a warning) on transports without peer requirements.
    pub fn requirement(mut self, requirement: impl Into<String>) -> Self {
        self.requirement = Some(requirement.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn peer_requirement(&self) -> Option<&str> {
        self.requirement.as_deref()
    }
}

/// Where a listener is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Unregistered,
    Registering,
    Activating,
    Live,
    Closing,
    Closed,
}

/// Releases partially acquired resources unless disarmed.
struct Rollback<'a> {
    transport: &'a dyn Transport,
    token: BridgeToken,
    registration: Option<Registration>,
}

impl Rollback<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if let Some(registration) = self.registration {
            self.transport.release(Handle::Registration(registration.id));
            if let Some(queue) = registration.queue {
                self.transport.release(Handle::Queue(queue));
            }
        }
        bridge::retire(self.token);
    }
}

/// A registered endpoint delivering inbound messages to one handler.
pub struct Listener {
    endpoint: String,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn Handler>,
    registration: Registration,
    token: BridgeToken,
    state: Mutex<ListenerState>,
    inbound: Mutex<Option<UnboundedReceiver<Delivery>>>,
}

impl Listener {
    /// Register, configure and activate a listener.
    ///
    /// # Errors
    ///
    /// - [`XpcError::RegistrationFailed`] if the transport refuses the endpoint
    /// - [`XpcError::RequirementRejected`] if it refuses the peer requirement
    /// - [`XpcError::ActivationFailed`] if activation fails
    ///
    /// Nothing stays registered after an error.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ListenerConfig,
        handler: Arc<dyn Handler>,
    ) -> Result<Self> {
        let endpoint = config.endpoint;
        let (token, inbound) = bridge::open();
        let mut rollback = Rollback {
            transport: transport.as_ref(),
            token,
            registration: None,
        };

        debug!(%endpoint, state = ?ListenerState::Registering, "creating listener");
        let registration = transport
            .create_listener(&endpoint, token)
            .map_err(|source| XpcError::RegistrationFailed {
                endpoint: endpoint.clone(),
                source,
            })?;
        rollback.registration = Some(registration);

        if let Some(requirement) = config.requirement.as_deref() {
            if transport.supports_peer_requirement() {
                transport
                    .set_peer_requirement(registration.id, requirement)
                    .map_err(|source| XpcError::RequirementRejected {
                        endpoint: endpoint.clone(),
                        source,
                    })?;
            } else {
                warn!(%endpoint, "transport has no peer requirements, requirement ignored");
            }
        }

        debug!(%endpoint, state = ?ListenerState::Activating, "activating listener");
        transport
            .activate(registration.id)
            .map_err(|source| XpcError::ActivationFailed {
                endpoint: endpoint.clone(),
                source,
            })?;
        rollback.disarm();

        debug!(%endpoint, %token, "listener live");
        Ok(Self {
            endpoint,
            transport,
            handler,
            registration,
            token,
            state: Mutex::new(ListenerState::Live),
            inbound: Mutex::new(Some(inbound)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ListenerState {
        *self.lock_state()
    }

    /// Token the transport delivers this listener's messages with.
    pub fn token(&self) -> BridgeToken {
        self.token
    }

    fn lock_state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the dispatch loop until the listener is closed.
    ///
    /// Messages are handled one at a time in delivery order. A handler error
    /// is logged and the loop moves on; a handler panic propagates.
    ///
    /// # Errors
    ///
    /// [`XpcError::AlreadyRunning`] if the loop was already started.
    pub async fn run(&self) -> Result<()> {
        let taken = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut inbound = taken.ok_or_else(|| XpcError::AlreadyRunning(self.endpoint.clone()))?;

        debug!(endpoint = %self.endpoint, "dispatch loop started");
        while let Some(Delivery { peer, message }) = inbound.recv().await {
            let id = message.id();
            let peer = Peer::new(self.transport.clone(), peer);
            if let Err(e) = self.handler.call(peer, message).await {
                warn!(endpoint = %self.endpoint, message = %id, error = %e, "handler failed");
            }
        }
        debug!(endpoint = %self.endpoint, "dispatch loop ended");
        Ok(())
    }

    /// Stop accepting messages and release the endpoint.
    ///
    /// Messages already handed off are still dispatched before
    /// [`run`](Self::run) returns. Closing a listener that is not live is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`XpcError::Transport`] if the transport fails to cancel the
    /// registration; resources are released regardless.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if *state != ListenerState::Live {
                debug!(endpoint = %self.endpoint, state = ?*state, "close ignored");
                return Ok(());
            }
            *state = ListenerState::Closing;
        }

        let cancelled = self.transport.cancel_listener(self.registration.id);
        self.transport
            .release(Handle::Registration(self.registration.id));
        if let Some(queue) = self.registration.queue {
            self.transport.release(Handle::Queue(queue));
        }
        bridge::retire(self.token);

        *self.lock_state() = ListenerState::Closed;
        debug!(endpoint = %self.endpoint, "listener closed");
        cancelled.map_err(XpcError::from)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(endpoint = %self.endpoint, error = %e, "failed to close listener on drop");
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token)
            .field("state", &self.state())
            .finish()
    }
}
