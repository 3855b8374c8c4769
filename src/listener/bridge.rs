//! Delivery bridge between transport threads and a listener's dispatch loop.
//!
//! Each live listener owns a hand-off channel. The sending half lives in a
//! process-wide [`HandleTable`] and the transport only ever sees its token.
//! Retiring the token drops the sender, which closes the channel once the
//! messages already handed off have been drained.

use std::fmt;
use std::sync::LazyLock;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::RichError;
use crate::transport::{HandleTable, Message, PeerId};

static BRIDGES: LazyLock<HandleTable<UnboundedSender<Delivery>>> = LazyLock::new(HandleTable::new);

/// Opaque token a transport uses to reach one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeToken(u64);

impl BridgeToken {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BridgeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bridge-{}", self.0)
    }
}

/// An inbound message together with the identity of its sender.
#[derive(Debug)]
pub struct Delivery {
    pub peer: PeerId,
    pub message: Message,
}

/// Open a hand-off channel and register its sending half.
pub(crate) fn open() -> (BridgeToken, UnboundedReceiver<Delivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BridgeToken(BRIDGES.insert(tx)), rx)
}

/// Retire a token. Returns `false` if it was already retired.
pub(crate) fn retire(token: BridgeToken) -> bool {
    BRIDGES.remove(token.0).is_some()
}

#[cfg(test)]
pub(crate) fn is_open(token: BridgeToken) -> bool {
    BRIDGES.contains(token.0)
}

/// Hand an inbound message to the listener registered under `token`.
///
/// Called by transports on whatever thread they deliver on. Messages for one
/// token reach the dispatch loop in the order of the calls. Delivery to a
/// retired token is refused.
pub fn deliver(token: BridgeToken, peer: PeerId, message: Message) -> Result<(), RichError> {
    let sent = BRIDGES.with(token.0, move |tx| tx.send(Delivery { peer, message }).is_ok());
    match sent {
        Some(true) => Ok(()),
        Some(false) => Err(RichError::new(format!("listener behind {token} stopped receiving"), true)),
        None => Err(RichError::new(format!("{token} is not registered"), false)),
    }
}
