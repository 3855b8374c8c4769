//! Per-request handles given to handlers.
//!
//! - [`Peer`] - the sender of an inbound message, able to receive replies
//! - [`RequestContext`] - a decoded request's peer and original message
//!
//! # Example
//!
//! ```ignore
//! async fn add(req: AddRequest, ctx: RequestContext) -> HandlerResult {
//!     ctx.respond(&AddResponse { result: req.first + req.second })
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::codec::DynamicCodec;
use crate::error::Result;
use crate::transport::{Message, PeerId, Transport};

/// The remote side of an inbound message.
#[derive(Clone)]
pub struct Peer {
    transport: Arc<dyn Transport>,
    id: PeerId,
}

impl Peer {
    pub(crate) fn new(transport: Arc<dyn Transport>, id: PeerId) -> Self {
        Self { transport, id }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Reply to `original` with `value`.
    ///
    /// `value` must encode to a dictionary; its fields fill the reply
    /// envelope the transport scopes to `original`.
    ///
    /// A [`StructuredError`](crate::StructuredError) reply keeps its
    /// [`ERROR_KEY`](crate::codec::ERROR_KEY) marker next to the error's
    /// fields, so the sender can decode it as a
    /// [`RemoteError`](crate::RemoteError).
    ///
    /// # Errors
    ///
    /// - [`XpcError::PayloadMustBeStruct`](crate::XpcError::PayloadMustBeStruct) before anything is sent
    /// - [`XpcError::Transport`](crate::XpcError::Transport) if the transport refuses the reply
    pub fn reply<T: Serialize + ?Sized>(&self, original: &Message, value: &T) -> Result<()> {
        let body = DynamicCodec::encode_payload(value)?;
        let mut reply = self.transport.create_reply(original);
        reply.set_body(body);
        self.transport.reply(self.id, reply)?;
        Ok(())
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer").field("id", &self.id).finish()
    }
}

/// Context passed to typed handlers.
///
/// Owns the original message, so a request whose context is dropped without
/// [`respond`](Self::respond) fails the waiting sender.
#[derive(Debug)]
pub struct RequestContext {
    peer: Peer,
    message: Message,
}

impl RequestContext {
    pub fn new(peer: Peer, message: Message) -> Self {
        Self { peer, message }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// The message as received, before decoding.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Whether the sender is waiting for a reply.
    pub fn expects_reply(&self) -> bool {
        self.message.wants_reply()
    }

    /// Send a reply. See [`Peer::reply`].
    pub fn respond<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.peer.reply(&self.message, value)
    }
}
