//! Messages as they travel through a transport.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::codec::Object;
use crate::error::RichError;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    fn next() -> Self {
        Self(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome handed to a sender blocked in `send_with_reply_sync`.
pub type ReplyResult = Result<Message, RichError>;

/// The reply slot of a request. Resolves exactly once.
///
/// Dropping an unresolved slot fails the waiting sender, so a request that
/// is discarded without an answer never leaves the sender blocked.
pub struct PendingReply {
    tx: Option<oneshot::Sender<ReplyResult>>,
}

impl PendingReply {
    pub fn new() -> (Self, oneshot::Receiver<ReplyResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Resolve the waiting sender. A sender that gave up is ignored.
    pub fn resolve(mut self, result: ReplyResult) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(RichError::new(
                "peer dropped the request without replying",
                false,
            )));
        }
    }
}

/// A dynamic object in flight, plus its reply slot when the sender waits.
pub struct Message {
    id: MessageId,
    reply_to: Option<MessageId>,
    body: Object,
    pending: Mutex<Option<PendingReply>>,
}

impl Message {
    pub fn new(body: Object) -> Self {
        Self {
            id: MessageId::next(),
            reply_to: None,
            body,
            pending: Mutex::new(None),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// The request this message answers, if it is a reply.
    pub fn reply_to(&self) -> Option<MessageId> {
        self.reply_to
    }

    pub fn body(&self) -> &Object {
        &self.body
    }

    pub fn into_body(self) -> Object {
        self.body
    }

    /// Replace the body, e.g. to fill in a reply envelope.
    pub fn set_body(&mut self, body: Object) {
        self.body = body;
    }

    /// Attach a reply slot and return the receiving end.
    ///
    /// Called by transports before delivering a request whose sender waits.
    pub fn expect_reply(&self) -> oneshot::Receiver<ReplyResult> {
        let (pending, rx) = PendingReply::new();
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(pending);
        rx
    }

    pub fn wants_reply(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Take the reply slot out of the message.
    pub fn take_pending_reply(&self) -> Option<PendingReply> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Build an empty reply scoped to this message.
    ///
    /// The reply slot moves into the envelope, so the sender is resolved
    /// when the envelope is delivered (or failed when it is dropped).
    pub fn reply_envelope(&self) -> Message {
        Message {
            id: MessageId::next(),
            reply_to: Some(self.id),
            body: Object::dictionary(),
            pending: Mutex::new(self.take_pending_reply()),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("reply_to", &self.reply_to)
            .field("body", &self.body)
            .finish()
    }
}
