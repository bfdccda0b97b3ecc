//! Status codes reported for an endpoint and persisted in the store.
//!
//! The integer values are stored on disk. Never renumber an existing code.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Reset marker written for every endpoint when the daemon stops.
    Invalid,
    /// Connected and authenticated.
    Ok,
    /// Newly discovered, no attempt made yet.
    Pending,
    /// First failed attempt after being healthy. Not worth alerting on.
    Reconnecting,
    NoConnection,
    Timeout,
    Refused,
    AuthFailed,
    LoggedOff,
    ServiceUnavailable,
}

impl StatusCode {
    pub const ALL: [StatusCode; 10] = [
        Self::Invalid,
        Self::Ok,
        Self::Pending,
        Self::Reconnecting,
        Self::NoConnection,
        Self::Timeout,
        Self::Refused,
        Self::AuthFailed,
        Self::LoggedOff,
        Self::ServiceUnavailable,
    ];

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Invalid => 0,
            Self::Ok => 1,
            Self::Pending => 2,
            Self::Reconnecting => 3,
            Self::NoConnection => 4,
            Self::Timeout => 5,
            Self::Refused => 6,
            Self::AuthFailed => 7,
            Self::LoggedOff => 8,
            Self::ServiceUnavailable => 9,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_i64() == v)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Ok => "ok",
            Self::Pending => "pending",
            Self::Reconnecting => "reconnecting",
            Self::NoConnection => "no_connection",
            Self::Timeout => "timeout",
            Self::Refused => "refused",
            Self::AuthFailed => "auth_failed",
            Self::LoggedOff => "logged_off",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Whether this status should count as the endpoint being down.
    pub fn is_alerting(self) -> bool {
        !matches!(
            self,
            Self::Ok | Self::Pending | Self::Reconnecting | Self::Invalid
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
