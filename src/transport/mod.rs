//! Transport module - the host IPC contract.
//!
//! The crate never talks to an operating-system facility directly. Everything
//! goes through [`Transport`], which offers:
//!
//! - outbound connections with one-way and blocking request/reply sends
//! - named endpoint registration, activation and cancellation
//! - delivery of inbound messages through [`bridge::deliver`](crate::listener::bridge::deliver)
//!
//! [`LocalTransport`] implements the contract in-process.

mod handle;
mod local;
mod message;

pub use handle::HandleTable;
pub use local::LocalTransport;
pub use message::{Message, MessageId, PendingReply, ReplyResult};

use std::fmt;

use crate::error::RichError;
use crate::listener::bridge::BridgeToken;

macro_rules! transport_id {
    ($($(#[$meta:meta])* $name:ident,)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u64);

            impl $name {
                pub fn new(raw: u64) -> Self {
                    Self(raw)
                }

                pub fn as_u64(&self) -> u64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}({})", stringify!($name), self.0)
                }
            }
        )*
    };
}

transport_id! {
    /// An outbound connection.
    ConnectionId,
    /// A registered endpoint.
    RegistrationId,
    /// A dispatch queue owned by a connection or registration.
    QueueId,
    /// The remote side of an inbound message.
    PeerId,
}

/// Handles returned by [`Transport::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub queue: Option<QueueId>,
}

/// Handles returned by [`Transport::create_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub id: RegistrationId,
    pub queue: Option<QueueId>,
}

/// Anything the transport hands out that must be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Connection(ConnectionId),
    Registration(RegistrationId),
    Queue(QueueId),
}

/// The host IPC facility.
///
/// Implementations deliver inbound messages by calling
/// [`bridge::deliver`](crate::listener::bridge::deliver) with the token
/// passed to [`create_listener`](Self::create_listener), from any thread.
pub trait Transport: Send + Sync + 'static {
    /// Whether [`set_peer_requirement`](Self::set_peer_requirement) is available.
    fn supports_peer_requirement(&self) -> bool;

    fn connect(&self, endpoint: &str) -> Result<Connection, RichError>;

    /// One-way send.
    fn send(&self, conn: ConnectionId, message: Message) -> Result<(), RichError>;

    /// Send and block the calling thread until the peer replies or fails.
    fn send_with_reply_sync(&self, conn: ConnectionId, message: Message) -> Result<Message, RichError>;

    /// Build an empty reply scoped to `original`.
    fn create_reply(&self, original: &Message) -> Message {
        original.reply_envelope()
    }

    /// Send a reply back to the peer that sent the original message.
    fn reply(&self, peer: PeerId, reply: Message) -> Result<(), RichError>;

    fn cancel_connection(&self, conn: ConnectionId) -> Result<(), RichError>;

    /// Register `endpoint`. Inbound messages are delivered with `token`.
    fn create_listener(&self, endpoint: &str, token: BridgeToken) -> Result<Registration, RichError>;

    /// Restrict which peers may connect to a registration.
    fn set_peer_requirement(&self, reg: RegistrationId, requirement: &str) -> Result<(), RichError>;

    fn activate(&self, reg: RegistrationId) -> Result<(), RichError>;

    fn cancel_listener(&self, reg: RegistrationId) -> Result<(), RichError>;

    fn release(&self, handle: Handle);
}
