//! Sessions and the session registry.
//!
//! A session is the server-side state of one connection: its registration
//! flags, nickname, profile and inbound byte accumulator.

use bytes::BytesMut;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Stable identity of a connection.
///
/// Ids are allocated monotonically and never reused, so an id held after its
/// session is gone is a lookup miss rather than a reference to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Get the raw id.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess_{}", self.0)
    }
}

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// No live session with this id.
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// Another live session owns the nickname.
    #[error("Nickname already in use: {0}")]
    NicknameInUse(String),
}

/// Profile fields supplied by `USER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub username: String,
    pub hostname: String,
    pub servername: String,
    pub realname: String,
}

/// Server-side state for one connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    /// Address the connection came from, used in user masks.
    host: String,
    password_accepted: bool,
    nickname: Option<String>,
    profile: Option<Profile>,
    registered: bool,
    inbound: BytesMut,
}

impl Session {
    fn new(id: SessionId, host: String) -> Self {
        Self {
            id,
            host,
            password_accepted: false,
            nickname: None,
            profile: None,
            registered: false,
            inbound: BytesMut::new(),
        }
    }

    /// Get the session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Get the peer host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether `PASS` succeeded.
    #[must_use]
    pub fn password_accepted(&self) -> bool {
        self.password_accepted
    }

    /// Mark the password as accepted.
    pub fn accept_password(&mut self) {
        self.password_accepted = true;
    }

    /// Get the nickname, if set.
    #[must_use]
    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// The nickname, or `*` before one is set.
    #[must_use]
    pub fn nick_or_star(&self) -> &str {
        self.nickname.as_deref().unwrap_or("*")
    }

    /// Get the profile, if set.
    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Store the profile. Profiles are write-once.
    ///
    /// Returns `false` (and changes nothing) if a profile is already set.
    pub fn set_profile(&mut self, profile: Profile) -> bool {
        if self.profile.is_some() {
            return false;
        }
        self.profile = Some(profile);
        true
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Complete registration if all three handshake steps are done.
    ///
    /// Returns `true` only on the call that flips the session to
    /// registered; registration is never undone.
    pub fn try_register(&mut self) -> bool {
        if self.registered
            || !self.password_accepted
            || self.nickname.is_none()
            || self.profile.is_none()
        {
            return false;
        }
        self.registered = true;
        true
    }

    /// The `nick!user@host` mask used as the source of relayed lines.
    #[must_use]
    pub fn mask(&self) -> String {
        let user = self
            .profile
            .as_ref()
            .map_or("*", |profile| profile.username.as_str());
        format!("{}!{}@{}", self.nick_or_star(), user, self.host)
    }

    /// The inbound byte accumulator.
    pub fn inbound_mut(&mut self) -> &mut BytesMut {
        &mut self.inbound
    }

    /// Bytes buffered but not yet framed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }
}

/// All live sessions, keyed by id, with a nickname index.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    nicknames: HashMap<String, SessionId>,
    next_id: u64,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for a new connection.
    pub fn create(&mut self, host: impl Into<String>) -> SessionId {
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.sessions.insert(id, Session::new(id, host.into()));
        debug!(session = %id, "Session created");
        id
    }

    /// Remove a session, releasing its nickname.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        if let Some(nick) = session.nickname() {
            self.nicknames.remove(nick);
        }
        debug!(session = %id, "Session removed");
        Some(session)
    }

    /// Get a session.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Get a session mutably.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Check if a session is live.
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Resolve a nickname (exact, case-sensitive) to a live session.
    #[must_use]
    pub fn find_by_nick(&self, nick: &str) -> Option<SessionId> {
        self.nicknames.get(nick).copied()
    }

    /// Give a session a nickname, keeping the nickname index consistent.
    ///
    /// Returns the previous nickname, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or another session holds
    /// the nickname. Nothing changes on error.
    pub fn set_nickname(
        &mut self,
        id: SessionId,
        nick: &str,
    ) -> Result<Option<String>, SessionError> {
        if let Some(owner) = self.nicknames.get(nick) {
            if *owner != id {
                return Err(SessionError::NicknameInUse(nick.to_string()));
            }
        }
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;

        let previous = session.nickname.replace(nick.to_string());
        if let Some(old) = &previous {
            self.nicknames.remove(old);
        }
        self.nicknames.insert(nick.to_string(), id);
        Ok(previous)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_registered()).count()
    }

    /// Ids of all live sessions.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(user: &str) -> Profile {
        Profile {
            username: user.to_string(),
            hostname: "host".to_string(),
            servername: "srv".to_string(),
            realname: "Real Name".to_string(),
        }
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut registry = SessionRegistry::new();
        let a = registry.create("127.0.0.1");
        registry.remove(a);
        let b = registry.create("127.0.0.1");
        assert_ne!(a, b);
        assert!(registry.get(a).is_none());
    }

    #[test]
    fn test_registration_requires_all_three_steps() {
        let mut registry = SessionRegistry::new();
        let id = registry.create("127.0.0.1");

        registry.set_nickname(id, "bob").unwrap();
        let session = registry.get_mut(id).unwrap();
        assert!(!session.try_register());

        assert!(session.set_profile(profile("bob")));
        assert!(!session.try_register());

        session.accept_password();
        assert!(session.try_register());
        assert!(session.is_registered());

        // Only the completing call reports the transition.
        assert!(!session.try_register());
        assert!(session.is_registered());
    }

    #[test]
    fn test_profile_is_write_once() {
        let mut registry = SessionRegistry::new();
        let id = registry.create("127.0.0.1");
        let session = registry.get_mut(id).unwrap();

        assert!(session.set_profile(profile("first")));
        assert!(!session.set_profile(profile("second")));
        assert_eq!(session.profile().unwrap().username, "first");
    }

    #[test]
    fn test_nickname_uniqueness() {
        let mut registry = SessionRegistry::new();
        let a = registry.create("127.0.0.1");
        let b = registry.create("127.0.0.1");

        assert_eq!(registry.set_nickname(a, "bob"), Ok(None));
        assert_eq!(
            registry.set_nickname(b, "bob"),
            Err(SessionError::NicknameInUse("bob".to_string()))
        );
        assert!(registry.get(b).unwrap().nickname().is_none());

        // Case-sensitive: "Bob" is a different nickname.
        assert!(registry.set_nickname(b, "Bob").is_ok());
    }

    #[test]
    fn test_rename_releases_old_nickname() {
        let mut registry = SessionRegistry::new();
        let a = registry.create("127.0.0.1");
        let b = registry.create("127.0.0.1");

        registry.set_nickname(a, "bob").unwrap();
        assert_eq!(
            registry.set_nickname(a, "robert"),
            Ok(Some("bob".to_string()))
        );
        assert_eq!(registry.find_by_nick("bob"), None);
        assert_eq!(registry.find_by_nick("robert"), Some(a));

        assert!(registry.set_nickname(b, "bob").is_ok());
    }

    #[test]
    fn test_remove_releases_nickname() {
        let mut registry = SessionRegistry::new();
        let a = registry.create("127.0.0.1");
        registry.set_nickname(a, "bob").unwrap();
        registry.remove(a);
        assert_eq!(registry.find_by_nick("bob"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_mask() {
        let mut registry = SessionRegistry::new();
        let id = registry.create("10.0.0.7");
        assert_eq!(registry.get(id).unwrap().mask(), "*!*@10.0.0.7");

        registry.set_nickname(id, "bob").unwrap();
        let session = registry.get_mut(id).unwrap();
        session.set_profile(profile("bobby"));
        assert_eq!(session.mask(), "bob!bobby@10.0.0.7");
    }
}
