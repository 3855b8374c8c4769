//! Session - the client side of one outbound connection.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::open(transport, "com.example.add")?;
//! let reply: AddResponse = session
//!     .send_and_wait(&AddRequest { first: 1, second: 2 })
//!     .await?;
//! session.close()?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::DynamicCodec;
use crate::error::{Result, XpcError};
use crate::transport::{Connection, Handle, Message, Transport};

/// A connection to a named endpoint.
///
/// Sends may be issued sequentially or concurrently. [`close`](Self::close)
/// consumes the session; dropping an unclosed session closes it.
pub struct Session {
    endpoint: String,
    transport: Arc<dyn Transport>,
    connection: Connection,
    closed: bool,
}

impl Session {
    /// Connect to `endpoint`.
    ///
    /// # Errors
    ///
    /// [`XpcError::Transport`] if the transport cannot connect.
    pub fn open(transport: Arc<dyn Transport>, endpoint: &str) -> Result<Self> {
        let connection = transport.connect(endpoint)?;
        debug!(endpoint, conn = %connection.id, "session opened");
        Ok(Self {
            endpoint: endpoint.to_string(),
            transport,
            connection,
            closed: false,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a message without waiting for a reply.
    ///
    /// # Errors
    ///
    /// - [`XpcError::PayloadMustBeStruct`] if `value` is not a struct; nothing is sent
    /// - [`XpcError::Transport`] if the transport refuses the message
    pub fn send<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let body = DynamicCodec::encode_payload(value)?;
        self.transport
            .send(self.connection.id, Message::new(body))?;
        Ok(())
    }

    /// Send a message and wait for the reply, decoded as `Out`.
    ///
    /// The blocking transport call runs on tokio's blocking pool. There is
    /// no timeout here; wrap the call in `tokio::time::timeout` if needed.
    ///
    /// # Errors
    ///
    /// - [`XpcError::PayloadMustBeStruct`] if `value` is not a struct; nothing is sent
    /// - [`XpcError::Transport`] if sending fails or the peer never replies
    /// - any decode error for `Out`
    pub async fn send_and_wait<In, Out>(&self, value: &In) -> Result<Out>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned,
    {
        let body = DynamicCodec::encode_payload(value)?;
        let transport = self.transport.clone();
        let conn = self.connection.id;

        let reply = match tokio::task::spawn_blocking(move || {
            transport.send_with_reply_sync(conn, Message::new(body))
        })
        .await
        {
            Ok(reply) => reply?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                return Err(XpcError::Transport(crate::error::RichError::new(
                    format!("send to {} was cancelled: {e}", self.endpoint),
                    true,
                )))
            }
        };

        DynamicCodec::decode(reply.body())
    }

    /// Cancel the connection and release its handles.
    ///
    /// # Errors
    ///
    /// [`XpcError::Transport`] if cancellation fails; handles are released
    /// regardless.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let cancelled = self.transport.cancel_connection(self.connection.id);
        self.transport
            .release(Handle::Connection(self.connection.id));
        if let Some(queue) = self.connection.queue {
            self.transport.release(Handle::Queue(queue));
        }
        debug!(endpoint = %self.endpoint, "session closed");
        cancelled.map_err(XpcError::from)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(endpoint = %self.endpoint, error = %e, "failed to close session on drop");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("connection", &self.connection)
            .finish()
    }
}
