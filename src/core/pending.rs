//! Single-shot wait primitive for request/response correlation

use std::time::Duration;
use tokio::sync::oneshot;

use crate::core::frame::ServerFrame;
use crate::error::{CompanionError, Result};

/// Resolver half of an in-flight request, stored in the transport's
/// in-flight map keyed by sequence number. Exactly one resolution is ever
/// written; dropping it unresolved wakes the waiter with a closed-connection
/// error.
pub struct PendingCall {
    tx: oneshot::Sender<ServerFrame>,
}

/// Waiter half, held by the caller that issued the request.
pub struct PendingReply {
    rx: oneshot::Receiver<ServerFrame>,
}

/// Create a linked resolver/waiter pair.
pub fn pending_call() -> (PendingCall, PendingReply) {
    let (tx, rx) = oneshot::channel();
    (PendingCall { tx }, PendingReply { rx })
}

impl PendingCall {
    /// Resolve the waiter with `frame`. A waiter that already gave up (timed
    /// out) is not an error.
    pub fn resolve(self, frame: ServerFrame) {
        let _ = self.tx.send(frame);
    }
}

impl PendingReply {
    /// Wait for the resolution, failing with `ResponseTimeout` after
    /// `timeout` or `ConnectionClosed` if the resolver was dropped.
    pub async fn wait(self, timeout: Duration) -> Result<ServerFrame> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(CompanionError::ConnectionClosed),
            Err(_) => Err(CompanionError::ResponseTimeout),
        }
    }
}
