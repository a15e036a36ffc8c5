use log::debug;
use tokio::sync::mpsc;

/// Name of the channel status lines are published on.
pub const STATUS_CHANNEL: &str = "status_message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Human-readable status line, displayed verbatim.
    Message(String),
    /// The launcher's own surface should close.
    CloseRequested,
}

/// Outbound status channel towards whatever renders the launcher UI.
///
/// Sending never blocks and never fails; if the receiving side is gone the
/// event is dropped.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusReporter {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("[{STATUS_CHANNEL}] {message}");
        let _ = self.tx.send(StatusEvent::Message(message));
    }

    pub fn request_close(&self) {
        let _ = self.tx.send(StatusEvent::CloseRequested);
    }
}

#[cfg(test)]
mod tests {
    use super::{StatusEvent, StatusReporter};

    #[test]
    fn messages_arrive_in_order() {
        let (status, mut rx) = StatusReporter::channel();
        status.send("first");
        status.send(String::from("second"));
        status.request_close();

        assert_eq!(rx.try_recv().ok(), Some(StatusEvent::Message("first".into())));
        assert_eq!(rx.try_recv().ok(), Some(StatusEvent::Message("second".into())));
        assert_eq!(rx.try_recv().ok(), Some(StatusEvent::CloseRequested));
    }

    #[test]
    fn send_after_receiver_dropped_is_silent() {
        let (status, rx) = StatusReporter::channel();
        drop(rx);
        status.send("nobody listening");
        status.request_close();
    }
}
