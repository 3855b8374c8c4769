//! In-process transport.
//!
//! Endpoints, connections and replies are all routed inside the current
//! process. Every handle handed out is tracked until released, and each
//! endpoint keeps a log of the messages it accepted, in delivery order.
//! Registration, requirement, activation and cancellation failures can be
//! injected per endpoint.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::{
    Connection, ConnectionId, Handle, Message, MessageId, PeerId, QueueId, Registration,
    RegistrationId, Transport,
};
use crate::error::RichError;
use crate::listener::bridge::{self, BridgeToken};

struct RegistrationEntry {
    endpoint: String,
    token: BridgeToken,
    requirement: Option<String>,
    active: bool,
}

struct ConnectionEntry {
    endpoint: String,
    peer: PeerId,
    cancelled: bool,
}

#[derive(Default)]
struct Faults {
    registration: HashSet<String>,
    requirement: HashSet<String>,
    activation: HashSet<String>,
    cancellation: HashSet<String>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    endpoints: HashMap<String, RegistrationId>,
    registrations: HashMap<RegistrationId, RegistrationEntry>,
    connections: HashMap<ConnectionId, ConnectionEntry>,
    peers: HashMap<PeerId, ConnectionId>,
    live: HashSet<Handle>,
    delivered: HashMap<String, Vec<MessageId>>,
    faults: Faults,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn registration(&self, reg: RegistrationId) -> Result<&RegistrationEntry, RichError> {
        self.registrations
            .get(&reg)
            .ok_or_else(|| RichError::new(format!("unknown registration {reg}"), false))
    }
}

/// Transport that routes every message within the current process.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use xpcwire::transport::LocalTransport;
///
/// let transport = Arc::new(LocalTransport::new());
/// transport.fail_activation("com.example.broken");
/// assert_eq!(transport.live_handles(), 0);
/// ```
pub struct LocalTransport {
    state: Mutex<State>,
    peer_requirements: bool,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            peer_requirements: true,
        }
    }

    /// A transport that reports peer requirements as unavailable.
    pub fn without_peer_requirements() -> Self {
        Self {
            peer_requirements: false,
            ..Self::new()
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `create_listener` fail for `endpoint`.
    pub fn fail_registration(&self, endpoint: &str) {
        self.state().faults.registration.insert(endpoint.to_string());
    }

    /// Make `set_peer_requirement` fail for `endpoint`.
    pub fn reject_requirement(&self, endpoint: &str) {
        self.state().faults.requirement.insert(endpoint.to_string());
    }

    /// Make `activate` fail for `endpoint`.
    pub fn fail_activation(&self, endpoint: &str) {
        self.state().faults.activation.insert(endpoint.to_string());
    }

    /// Make `cancel_listener` fail for `endpoint`.
    pub fn fail_cancellation(&self, endpoint: &str) {
        self.state().faults.cancellation.insert(endpoint.to_string());
    }

    /// Number of handles handed out and not yet released.
    pub fn live_handles(&self) -> usize {
        self.state().live.len()
    }

    /// Number of registration handles not yet released.
    pub fn live_registrations(&self) -> usize {
        self.state()
            .live
            .iter()
            .filter(|h| matches!(h, Handle::Registration(_)))
            .count()
    }

    /// Whether `endpoint` is registered and activated.
    pub fn is_active(&self, endpoint: &str) -> bool {
        let state = self.state();
        state
            .endpoints
            .get(endpoint)
            .and_then(|reg| state.registrations.get(reg))
            .is_some_and(|entry| entry.active)
    }

    /// The requirement applied to `endpoint`, if any.
    pub fn peer_requirement(&self, endpoint: &str) -> Option<String> {
        let state = self.state();
        state
            .endpoints
            .get(endpoint)
            .and_then(|reg| state.registrations.get(reg))
            .and_then(|entry| entry.requirement.clone())
    }

    /// Ids of the messages `endpoint` accepted, in delivery order.
    ///
    /// The log belongs to the registration and is dropped when it is released.
    pub fn delivery_log(&self, endpoint: &str) -> Vec<MessageId> {
        self.state()
            .delivered
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LocalTransport {
    fn supports_peer_requirement(&self) -> bool {
        self.peer_requirements
    }

    fn connect(&self, endpoint: &str) -> Result<Connection, RichError> {
        let mut state = self.state();
        if !state.endpoints.contains_key(endpoint) {
            return Err(RichError::new(
                format!("no listener registered for {endpoint}"),
                true,
            ));
        }

        let id = ConnectionId::new(state.next_id());
        let queue = QueueId::new(state.next_id());
        let peer = PeerId::new(state.next_id());
        state.connections.insert(
            id,
            ConnectionEntry {
                endpoint: endpoint.to_string(),
                peer,
                cancelled: false,
            },
        );
        state.peers.insert(peer, id);
        state.live.insert(Handle::Connection(id));
        state.live.insert(Handle::Queue(queue));

        debug!(endpoint, %id, "connection opened");
        Ok(Connection {
            id,
            queue: Some(queue),
        })
    }

    fn send(&self, conn: ConnectionId, message: Message) -> Result<(), RichError> {
        let mut state = self.state();
        let (endpoint, peer) = match state.connections.get(&conn) {
            Some(entry) if !entry.cancelled => (entry.endpoint.clone(), entry.peer),
            Some(_) => return Err(RichError::new(format!("{conn} was cancelled"), false)),
            None => return Err(RichError::new(format!("unknown connection {conn}"), false)),
        };

        let token = match state
            .endpoints
            .get(&endpoint)
            .and_then(|reg| state.registrations.get(reg))
        {
            Some(entry) if entry.active => entry.token,
            _ => {
                return Err(RichError::new(
                    format!("endpoint {endpoint} is not accepting messages"),
                    true,
                ))
            }
        };

        // Delivered under the state lock so the log matches channel order.
        let id = message.id();
        bridge::deliver(token, peer, message)?;
        state.delivered.entry(endpoint).or_default().push(id);

        trace!(%conn, message = %id, "delivered");
        Ok(())
    }

    fn send_with_reply_sync(&self, conn: ConnectionId, message: Message) -> Result<Message, RichError> {
        let rx = message.expect_reply();
        self.send(conn, message)?;
        rx.blocking_recv()
            .map_err(|_| RichError::new("reply channel closed", false))?
    }

    fn reply(&self, peer: PeerId, reply: Message) -> Result<(), RichError> {
        let known = {
            let state = self.state();
            state
                .peers
                .get(&peer)
                .and_then(|conn| state.connections.get(conn))
                .is_some_and(|entry| !entry.cancelled)
        };
        if !known {
            return Err(RichError::new(format!("{peer} is no longer connected"), false));
        }

        match reply.take_pending_reply() {
            Some(pending) => {
                trace!(%peer, message = %reply.id(), "reply routed");
                pending.resolve(Ok(reply));
                Ok(())
            }
            None => Err(RichError::new(
                "the original message does not expect a reply",
                false,
            )),
        }
    }

    fn cancel_connection(&self, conn: ConnectionId) -> Result<(), RichError> {
        let mut state = self.state();
        match state.connections.get_mut(&conn) {
            Some(entry) => {
                entry.cancelled = true;
                debug!(%conn, endpoint = %entry.endpoint, "connection cancelled");
                Ok(())
            }
            None => Err(RichError::new(format!("unknown connection {conn}"), false)),
        }
    }

    fn create_listener(&self, endpoint: &str, token: BridgeToken) -> Result<Registration, RichError> {
        let mut state = self.state();
        if state.faults.registration.contains(endpoint) {
            return Err(RichError::new(
                format!("registration of {endpoint} refused"),
                false,
            ));
        }
        if state.endpoints.contains_key(endpoint) {
            return Err(RichError::new(
                format!("{endpoint} is already registered"),
                false,
            ));
        }

        let id = RegistrationId::new(state.next_id());
        let queue = QueueId::new(state.next_id());
        state.endpoints.insert(endpoint.to_string(), id);
        state.registrations.insert(
            id,
            RegistrationEntry {
                endpoint: endpoint.to_string(),
                token,
                requirement: None,
                active: false,
            },
        );
        state.live.insert(Handle::Registration(id));
        state.live.insert(Handle::Queue(queue));

        debug!(endpoint, %id, %token, "listener registered");
        Ok(Registration {
            id,
            queue: Some(queue),
        })
    }

    fn set_peer_requirement(&self, reg: RegistrationId, requirement: &str) -> Result<(), RichError> {
        let mut state = self.state();
        let endpoint = state.registration(reg)?.endpoint.clone();
        if state.faults.requirement.contains(&endpoint) {
            return Err(RichError::new(
                format!("peer requirement for {endpoint} rejected"),
                false,
            ));
        }
        if let Some(entry) = state.registrations.get_mut(&reg) {
            entry.requirement = Some(requirement.to_string());
        }
        Ok(())
    }

    fn activate(&self, reg: RegistrationId) -> Result<(), RichError> {
        let mut state = self.state();
        let endpoint = state.registration(reg)?.endpoint.clone();
        if state.faults.activation.contains(&endpoint) {
            return Err(RichError::new(
                format!("activation of {endpoint} failed"),
                true,
            ));
        }
        if let Some(entry) = state.registrations.get_mut(&reg) {
            entry.active = true;
        }
        debug!(endpoint, %reg, "listener activated");
        Ok(())
    }

    fn cancel_listener(&self, reg: RegistrationId) -> Result<(), RichError> {
        let mut state = self.state();
        let endpoint = state.registration(reg)?.endpoint.clone();
        if state.faults.cancellation.contains(&endpoint) {
            return Err(RichError::new(
                format!("cancellation of {endpoint} failed"),
                false,
            ));
        }
        if let Some(entry) = state.registrations.get_mut(&reg) {
            entry.active = false;
        }
        if state.endpoints.get(&endpoint) == Some(&reg) {
            state.endpoints.remove(&endpoint);
        }
        debug!(endpoint, %reg, "listener cancelled");
        Ok(())
    }

    fn release(&self, handle: Handle) {
        let mut state = self.state();
        if !state.live.remove(&handle) {
            debug!(?handle, "release of unknown handle ignored");
            return;
        }
        match handle {
            Handle::Registration(reg) => {
                if let Some(entry) = state.registrations.remove(&reg) {
                    if state.endpoints.get(&entry.endpoint) == Some(&reg) {
                        state.endpoints.remove(&entry.endpoint);
                    }
                    state.delivered.remove(&entry.endpoint);
                }
            }
            Handle::Connection(conn) => {
                if let Some(entry) = state.connections.remove(&conn) {
                    state.peers.remove(&entry.peer);
                }
            }
            Handle::Queue(_) => {}
        }
        trace!(?handle, "released");
    }
}
