//! Current-actor boundary.
//!
//! Operations never look up "who is acting" themselves; the caller that
//! constructs the context (request handler, scheduler, test) decides, and
//! unattended callers use [`ActorContext::system`].

/// User id recorded on audit fields for automated operations.
pub const SYSTEM_USER_ID: i64 = 1;

/// Username recorded on audit fields for automated operations.
pub const SYSTEM_USERNAME: &str = "System";

/// Identity attached to every stock operation for audit purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: i64,
    pub username: String,
}

impl ActorContext {
    /// An authenticated user.
    pub fn user(user_id: i64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    /// The well-known system actor, used by scheduled jobs and other
    /// contexts without an authenticated user.
    pub fn system() -> Self {
        Self {
            user_id: SYSTEM_USER_ID,
            username: SYSTEM_USERNAME.to_string(),
        }
    }
}

impl Default for ActorContext {
    fn default() -> Self {
        Self::system()
    }
}
