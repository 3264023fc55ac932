//! Progress reporting between an operation and its caller
//!
//! Each operation gets a fresh channel. The background task owns the
//! [`ProgressSender`] and writes human-readable messages while it works, then
//! calls [`ProgressSender::finish`] with the outcome. Finishing consumes the
//! sender, so the outcome is written once and no message can follow it.
//!
//! The caller holds the [`ProgressSession`]: it reads messages until the queue
//! closes, then receives the outcome.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{PackageError, Result};

/// Messages buffered before the producer waits for the consumer
pub const CHANNEL_CAPACITY: usize = 10;

/// Create a connected sender and session
pub fn channel() -> (ProgressSender, ProgressSession) {
    let (messages_tx, messages_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let token = CancellationToken::new();

    let sender = ProgressSender {
        messages: messages_tx,
        outcome: outcome_tx,
    };
    let session = ProgressSession {
        messages: messages_rx,
        outcome: outcome_rx,
        token,
    };
    (sender, session)
}

/// Producer half, owned by the operation task
#[derive(Debug)]
pub struct ProgressSender {
    messages: mpsc::Sender<String>,
    outcome: oneshot::Sender<Result<()>>,
}

impl ProgressSender {
    /// Report a progress message
    ///
    /// Waits while the queue is full. Messages are dropped once the session
    /// is gone; the operation itself carries on.
    pub async fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "progress");
        let _ = self.messages.send(message).await;
    }

    /// Write the terminal outcome and close the queue
    pub fn finish(self, result: Result<()>) {
        match &result {
            Ok(()) => tracing::info!("operation succeeded"),
            Err(e) if e.is_non_critical() => tracing::warn!(reason = %e, "operation finished"),
            Err(e) => tracing::info!(error = %e, "operation failed"),
        }
        let ProgressSender { messages, outcome } = self;
        let _ = outcome.send(result);
        drop(messages);
    }
}

/// Consumer half, returned to the caller of an operation
#[derive(Debug)]
pub struct ProgressSession {
    messages: mpsc::Receiver<String>,
    outcome: oneshot::Receiver<Result<()>>,
    token: CancellationToken,
}

impl ProgressSession {
    /// Next progress message, or `None` once the operation has finished
    pub async fn next_message(&mut self) -> Option<String> {
        self.messages.recv().await
    }

    /// Drain the remaining messages, then return the outcome
    pub async fn wait(self) -> Result<()> {
        self.wait_with(|_| {}).await
    }

    /// Like [`wait`](Self::wait), passing every message to `on_message`
    pub async fn wait_with(mut self, mut on_message: impl FnMut(&str)) -> Result<()> {
        while let Some(message) = self.messages.recv().await {
            on_message(&message);
        }
        match self.outcome.await {
            Ok(result) => result,
            Err(_) => Err(PackageError::Internal(
                "operation ended without reporting an outcome".to_string(),
            )),
        }
    }

    /// Ask the operation to stop at its next store call or poll tick
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token observed by the operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}
