//! Observable progress of a transfer attempt and of the story follow-up.

use std::fmt;

use solana_sdk::signature::Signature;
use tokio::sync::mpsc;

/// Stage of one transfer attempt.
///
/// Attempts move strictly forward:
/// `Idle → Preparing → CreatingRecipientAccount? → AwaitingSignature →
/// Submitted → Confirming → Confirmed | Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Idle,
    Preparing,
    CreatingRecipientAccount,
    AwaitingSignature,
    Submitted(Signature),
    Confirming,
    Confirmed(Signature),
    Failed(String),
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Confirmed(_) | SubmissionStatus::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Idle => "idle",
            SubmissionStatus::Preparing => "preparing",
            SubmissionStatus::CreatingRecipientAccount => "creating-recipient-account",
            SubmissionStatus::AwaitingSignature => "awaiting-signature",
            SubmissionStatus::Submitted(_) => "submitted",
            SubmissionStatus::Confirming => "confirming",
            SubmissionStatus::Confirmed(_) => "confirmed",
            SubmissionStatus::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Idle => write!(f, "Not started."),
            SubmissionStatus::Preparing => write!(f, "Preparing token transfer..."),
            SubmissionStatus::CreatingRecipientAccount => {
                write!(f, "Creating recipient token account...")
            }
            SubmissionStatus::AwaitingSignature => write!(f, "Requesting signature..."),
            SubmissionStatus::Submitted(sig) => write!(f, "Transaction sent! Signature: {}", sig),
            SubmissionStatus::Confirming => write!(f, "Confirming transaction..."),
            SubmissionStatus::Confirmed(sig) => write!(f, "Transfer confirmed: {}", sig),
            SubmissionStatus::Failed(reason) => write!(f, "Transaction failed: {}", reason),
        }
    }
}

/// Progress of the story-service call that follows a confirmed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryStatus {
    Creating,
    PanelRequested,
    /// Storing the characters failed.
    Failed(String),
    /// Characters were stored but the panel request was refused.
    PanelRequestFailed(String),
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoryStatus::Creating => write!(f, "Creating story..."),
            StoryStatus::PanelRequested => write!(
                f,
                "Image will be generated, view it once the panel is ready."
            ),
            StoryStatus::Failed(reason) => write!(f, "Error creating story: {}", reason),
            StoryStatus::PanelRequestFailed(reason) => {
                write!(f, "Error updating panel status: {}", reason)
            }
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn transfer(&self, status: &SubmissionStatus);

    fn story(&self, _status: &StoryStatus) {}
}

/// Discards every update.
pub struct NullSink;

impl StatusSink for NullSink {
    fn transfer(&self, _status: &SubmissionStatus) {}
}

/// Forwards updates to the `log` facade.
pub struct LogSink;

impl StatusSink for LogSink {
    fn transfer(&self, status: &SubmissionStatus) {
        match status {
            SubmissionStatus::Failed(_) => log::warn!("[{}] {}", status.label(), status),
            _ => log::info!("[{}] {}", status.label(), status),
        }
    }

    fn story(&self, status: &StoryStatus) {
        match status {
            StoryStatus::Failed(_) | StoryStatus::PanelRequestFailed(_) => {
                log::warn!("[story] {}", status)
            }
            _ => log::info!("[story] {}", status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Transfer(SubmissionStatus),
    Story(StoryStatus),
}

/// Publishes updates on an unbounded channel, for callers that consume
/// progress from another task.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn transfer(&self, status: &SubmissionStatus) {
        // A dropped receiver only means nobody is watching.
        let _ = self.tx.send(StatusUpdate::Transfer(status.clone()));
    }

    fn story(&self, status: &StoryStatus) {
        let _ = self.tx.send(StatusUpdate::Story(status.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_confirmed_and_failed_are_terminal() {
        let sig = Signature::default();
        assert!(SubmissionStatus::Confirmed(sig).is_terminal());
        assert!(SubmissionStatus::Failed("x".into()).is_terminal());
        assert!(!SubmissionStatus::Idle.is_terminal());
        assert!(!SubmissionStatus::Confirming.is_terminal());
        assert!(!SubmissionStatus::Submitted(sig).is_terminal());
    }

    #[test]
    fn labels_match_stage_names() {
        assert_eq!(
            SubmissionStatus::CreatingRecipientAccount.label(),
            "creating-recipient-account"
        );
        assert_eq!(SubmissionStatus::AwaitingSignature.label(), "awaiting-signature");
    }

    #[test]
    fn story_failures_name_the_failing_call() {
        assert_eq!(
            StoryStatus::Failed("boom".into()).to_string(),
            "Error creating story: boom"
        );
        assert_eq!(
            StoryStatus::PanelRequestFailed("boom".into()).to_string(),
            "Error updating panel status: boom"
        );
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.transfer(&SubmissionStatus::Preparing);
        sink.story(&StoryStatus::Creating);

        assert_eq!(
            rx.recv().await,
            Some(StatusUpdate::Transfer(SubmissionStatus::Preparing))
        );
        assert_eq!(rx.recv().await, Some(StatusUpdate::Story(StoryStatus::Creating)));
    }

    #[test]
    fn channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.transfer(&SubmissionStatus::Confirming);
    }
}
