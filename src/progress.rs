//! Upload progress notifications
//!
//! Progress travels on its own ordered channel, separate from the final
//! result. The channel is unbounded so emitting never blocks a pipeline
//! step, and events queue up until the consumer reads them.

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressPhase {
    SignatureRequested,
    TransferInProgress,
    LinkingInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub message: String,
    /// Only set for file transfers once bytes have been sent.
    pub percent_complete: Option<u8>,
}

impl ProgressEvent {
    pub fn signature_requested() -> Self {
        Self {
            phase: ProgressPhase::SignatureRequested,
            message: "Requesting upload signature".to_string(),
            percent_complete: None,
        }
    }

    pub fn transfer(percent_complete: Option<u8>) -> Self {
        let message = match percent_complete {
            Some(percent) => format!("Uploading image ({}%)", percent),
            None => "Uploading image".to_string(),
        };
        Self {
            phase: ProgressPhase::TransferInProgress,
            message,
            percent_complete,
        }
    }

    pub fn linking() -> Self {
        Self {
            phase: ProgressPhase::LinkingInProgress,
            message: "Saving image details".to_string(),
            percent_complete: None,
        }
    }

    pub fn is_determinate(&self) -> bool {
        self.percent_complete.is_some()
    }
}

/// `round(100 * sent / total)`, clamped to 100. An empty payload counts as done.
pub fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (sent as f64 * 100.0 / total as f64).round();
    percent.min(100.0) as u8
}

/// Sending half of a progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// A sender whose events go nowhere.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn emit(&self, event: ProgressEvent) {
        tracing::debug!(
            phase = ?event.phase,
            percent = ?event.percent_complete,
            "{}",
            event.message
        );
        // A consumer that dropped its stream has abandoned the upload's progress.
        let _ = self.tx.send(event);
    }

    /// A sender that does not keep the channel open on its own.
    pub fn downgrade(&self) -> WeakProgressSender {
        WeakProgressSender {
            tx: self.tx.downgrade(),
        }
    }
}

/// Emits only while some [`ProgressSender`] for the channel is still alive.
#[derive(Debug, Clone)]
pub struct WeakProgressSender {
    tx: mpsc::WeakUnboundedSender<ProgressEvent>,
}

impl WeakProgressSender {
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = self.tx.upgrade() {
            ProgressSender { tx }.emit(event);
        }
    }
}

/// Receiving half of a progress channel. Ends once the upload settles.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressStream {
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Drains every event already queued without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Waits for the sender side to close and returns everything emitted.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

pub fn channel() -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx }, ProgressStream { rx })
}
