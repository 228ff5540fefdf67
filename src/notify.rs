//! User-visible one-shot notices ("toasts").
//!
//! Producers (dispatcher, lobby, push listener) never block on the view; a
//! notice sent after the view went away is dropped.

#[cfg(test)]
#[path = "notify_test.rs"]
mod notify_test;

use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self.level {
            NoticeLevel::Success => "[ok]",
            NoticeLevel::Info => "[info]",
            NoticeLevel::Error => "[error]",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice { level, message: message.into() };
        if let Err(e) = self.tx.send(notice) {
            tracing::debug!(message = %e.0.message, "notice dropped; no view attached");
        }
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Success, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Info, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Error, message);
    }
}
