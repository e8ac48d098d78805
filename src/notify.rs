//! Transient user-facing notices (toasts) raised by actions.
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
    /// Session is missing or expired; the front end should go back to login.
    LoginRequired,
}

pub trait Notifier: Send + Sync {
    fn push(&self, notice: Notice);

    fn success(&self, message: &str) {
        self.push(Notice::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(Notice::Error(message.to_string()));
    }
}

/// Writes notices to the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn push(&self, notice: Notice) {
        match notice {
            Notice::Success(msg) => info!("{}", msg),
            Notice::Error(msg) => warn!("{}", msg),
            Notice::LoginRequired => warn!("Session expired, please log in again"),
        }
    }
}

/// Keeps notices until the front end drains them.
#[derive(Debug, Default)]
pub struct NoticeQueue {
    notices: Mutex<Vec<Notice>>,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

impl Notifier for NoticeQueue {
    fn push(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notice);
    }
}
