//! Logon session enumeration
//!
//! The `IsUserLoggedIn` request reports which users have a live interactive
//! session. Enumeration itself is platform work; this module defines the
//! contract and the filtering that decides what counts as "logged in".

use anyhow::Result;

/// How a logon session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Local console session
    Interactive,
    /// Remote desktop session
    RemoteInteractive,
    /// Remote desktop session backed by cached credentials
    CachedRemoteInteractive,
    /// Service, batch, network, or other non-interactive session
    Other,
}

impl SessionKind {
    /// Whether this kind can represent a user at a desktop.
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            SessionKind::Interactive
                | SessionKind::RemoteInteractive
                | SessionKind::CachedRemoteInteractive
        )
    }
}

/// One enumerated logon session.
#[derive(Debug, Clone)]
pub struct LogonSession {
    /// Numeric session identifier; 0 is the non-user system session
    pub session_id: u32,
    /// Account name of the session owner
    pub user_name: String,
    /// How the session was established
    pub kind: SessionKind,
}

/// Source of logon session data.
pub trait SessionTracker: Send + Sync {
    /// Enumerate current logon sessions.
    fn logon_sessions(&self) -> Result<Vec<LogonSession>>;

    /// Session ids that currently have a desktop shell attached.
    ///
    /// A session can linger in the enumeration after logoff; requiring a
    /// shell filters those out.
    fn shell_session_ids(&self) -> Result<Vec<u32>>;
}

/// Distinct users considered logged in: interactive kind, a real session
/// id, and a shell attached. Order of first appearance is preserved.
pub fn interactive_users(tracker: &dyn SessionTracker) -> Result<Vec<String>> {
    let shell_ids = tracker.shell_session_ids()?;
    let mut users = Vec::new();
    for session in tracker.logon_sessions()? {
        if !session.kind.is_interactive()
            || session.session_id == 0
            || !shell_ids.contains(&session.session_id)
        {
            continue;
        }
        if !users.contains(&session.user_name) {
            users.push(session.user_name);
        }
    }
    Ok(users)
}

/// Fixed session data, for wiring without a platform enumerator and for
/// tests.
pub struct StaticSessionTracker {
    sessions: Vec<LogonSession>,
    shell_ids: Vec<u32>,
}

impl StaticSessionTracker {
    /// Create a tracker over fixed data.
    pub fn new(sessions: Vec<LogonSession>, shell_ids: Vec<u32>) -> Self {
        Self { sessions, shell_ids }
    }

    /// Tracker reporting no sessions at all.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl SessionTracker for StaticSessionTracker {
    fn logon_sessions(&self) -> Result<Vec<LogonSession>> {
        Ok(self.sessions.clone())
    }

    fn shell_session_ids(&self) -> Result<Vec<u32>> {
        Ok(self.shell_ids.clone())
    }
}
