use std::cell::Cell;
use std::fmt;

/// Identifies one request issued on a [`RequestChannel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Supersession bookkeeping for one line of request/response traffic.
///
/// Every request takes a token from `issue`; when its response arrives it may
/// only be applied if `is_current` still holds. Tokens increase monotonically
/// with issue order, so arrival order never matters.
#[derive(Debug)]
pub struct RequestChannel {
    name: &'static str,
    latest: Cell<u64>,
}

impl RequestChannel {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            latest: Cell::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn issue(&self) -> RequestToken {
        let next = self.latest.get() + 1;
        self.latest.set(next);
        RequestToken(next)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest.get() == token.0
    }

    /// Supersede whatever is in flight without issuing a request
    pub fn invalidate(&self) {
        self.issue();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_token_is_current() {
        let channel = RequestChannel::new("search");
        let first = channel.issue();
        let second = channel.issue();

        assert!(first < second);
        assert!(!channel.is_current(first));
        assert!(channel.is_current(second));
    }

    #[test]
    fn test_invalidate_supersedes_in_flight() {
        let channel = RequestChannel::new("filter");
        let token = channel.issue();
        channel.invalidate();
        assert!(!channel.is_current(token));
    }
}
