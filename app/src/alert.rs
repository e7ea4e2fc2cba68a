use std::fmt;
use std::time::{Duration, Instant};

/// How long a notice stays up unless dismissed.
pub const ALERT_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Success,
    Error,
}

/// A transient notice shown above the current view.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub message: String,
    pub kind: AlertKind,
    raised_at: Instant,
}

impl Alert {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Alert::raised_at(message, AlertKind::Success, Instant::now())
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Alert::raised_at(message, AlertKind::Error, Instant::now())
    }

    pub fn raised_at<S: Into<String>>(message: S, kind: AlertKind, at: Instant) -> Self {
        Alert {
            message: message.into(),
            kind,
            raised_at: at,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.raised_at) >= ALERT_TTL
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let marker = match self.kind {
            AlertKind::Success => "✔",
            AlertKind::Error => "✖",
        };
        write!(fmt, "{} {}", marker, self.message)
    }
}
