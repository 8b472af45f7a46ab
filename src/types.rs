//! Basic type definitions for the relay
//!
//! Provides the `ConnId` newtype used as the registry key for every
//! accepted connection.

use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Two accepted connections may share a remote address over time, so the
/// registry keys on a UUID v4 assigned at accept time instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub Uuid);

impl ConnId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
