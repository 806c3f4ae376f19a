//! User-visible notifications
//!
//! Controllers report failures and confirmed mutations through a [`Notifier`].
//! They never own its lifecycle; the front end decides how notices are shown.

use std::cell::RefCell;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub trait Notifier {
    fn notify(&self, notice: Notice);
}

/// Notifier that logs every notice and keeps it until drained
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: RefCell<Vec<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every notice recorded so far
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.borrow_mut())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    pub fn errors(&self) -> Vec<Notice> {
        self.notices
            .borrow()
            .iter()
            .filter(|n| n.is_error())
            .cloned()
            .collect()
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => warn!(target: "notice", "{}", notice.message),
            NoticeLevel::Success | NoticeLevel::Info => {
                info!(target: "notice", "{}", notice.message)
            }
        }
        self.notices.borrow_mut().push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_log_drains() {
        let log = NoticeLog::new();
        log.notify(Notice::success("Table renamed"));
        log.notify(Notice::error("Delete error: Table not found"));

        assert_eq!(log.errors().len(), 1);
        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].level, NoticeLevel::Success);
        assert!(log.notices().is_empty());
    }
}
