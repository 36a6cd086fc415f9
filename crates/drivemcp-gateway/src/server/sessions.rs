//! Live MCP session tracking.
//!
//! Sessions are minted server-side as UUIDs and bound to the transport
//! that created them, so a streamable-HTTP client cannot post into an
//! SSE session or vice versa. Each session remembers the identity it
//! was opened under and, optionally, a push channel for server-to-client
//! messages.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthContext;

/// Which wire protocol a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFamily {
    Sse,
    StreamableHttp,
}

impl std::fmt::Display for TransportFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sse => write!(f, "SSE"),
            Self::StreamableHttp => write!(f, "streamable-HTTP"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown session: {0}")]
    NotFound(String),

    #[error("session {id} belongs to the {actual} transport")]
    WrongFamily { id: String, actual: TransportFamily },
}

/// A single client session.
#[derive(Debug, Clone)]
pub struct Session {
    pub family: TransportFamily,
    pub created_at: DateTime<Utc>,
    /// Identity captured when the session was opened.
    pub auth: Option<AuthContext>,
    /// Sender for the client's push stream, when one is attached.
    pub push: Option<mpsc::Sender<Value>>,
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.family == other.family
            && self.created_at == other.created_at
            && self.auth == other.auth
            && match (&self.push, &other.push) {
                (Some(a), Some(b)) => a.same_channel(b),
                (None, None) => true,
                _ => false,
            }
    }
}

/// Concurrent map of session ID to session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    /// Open a session and return its ID.
    pub fn create(&self, family: TransportFamily, auth: Option<AuthContext>) -> String {
        let id = Uuid::new_v4().to_string();
        info!("[Session] Opened {} session: {}", family, id);
        self.sessions.insert(
            id.clone(),
            Session {
                family,
                created_at: Utc::now(),
                auth,
                push: None,
            },
        );
        id
    }

    /// Look up a session, checking it belongs to the expected transport.
    pub fn get(&self, id: &str, family: TransportFamily) -> Result<Session, SessionError> {
        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if session.family != family {
            return Err(SessionError::WrongFamily {
                id: id.to_string(),
                actual: session.family,
            });
        }
        Ok(session.clone())
    }

    /// Attach a push channel so the server can stream messages out.
    pub fn attach_push(
        &self,
        id: &str,
        family: TransportFamily,
        sender: mpsc::Sender<Value>,
    ) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if session.family != family {
            return Err(SessionError::WrongFamily {
                id: id.to_string(),
                actual: session.family,
            });
        }
        session.push = Some(sender);
        Ok(())
    }

    /// Drop a session's push channel, keeping the session alive.
    pub fn detach_push(&self, id: &str) {
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.push = None;
        }
    }

    /// Close a session.
    pub fn remove(&self, id: &str) -> Option<Session> {
        let (_, session) = self.sessions.remove(id)?;
        info!(
            "[Session] Closed {} session: {} (duration: {}s)",
            session.family,
            id,
            (Utc::now() - session.created_at).num_seconds()
        );
        Some(session)
    }

    /// Close every session. Dropping the stored push senders ends the
    /// corresponding client streams.
    pub fn close_all(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        if count > 0 {
            info!("[Session] Closed {} session(s) on shutdown", count);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }
}
