//! Channel abstraction for Parley.
//!
//! A channel is a named group with an ordered membership list, per-member
//! operator status and access controls (key, user limit, invite-only).
//! Members are held by [`SessionId`]; a channel never owns a session.

use crate::session::SessionId;
use std::collections::HashSet;
use tracing::debug;

/// A channel identifier.
pub type ChannelName = String;

/// One membership entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// The member's session.
    pub session: SessionId,
    /// Cached nickname, kept in step with nickname changes.
    pub nickname: String,
    /// Channel operator status.
    pub operator: bool,
}

/// Why a join attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    AlreadyMember,
    BadKey,
    Full,
    InviteOnly,
}

/// A mode change that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    /// The mode needs an argument that was not supplied (or did not parse).
    MissingArgument(char),
    /// The mode letter is not supported.
    UnknownMode(char),
    /// `+o`/`-o` named someone who is not a member.
    NotOnChannel(String),
}

/// The outcome of applying a mode string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeChange {
    /// Applied changes in wire form, e.g. `+ik-l`.
    pub applied: String,
    /// Arguments of the applied changes, in order.
    pub args: Vec<String>,
    /// Changes that were refused.
    pub errors: Vec<ModeError>,
}

impl ModeChange {
    fn push(&mut self, adding: bool, mode: char, arg: Option<String>) {
        let sign = if adding { '+' } else { '-' };
        let last_sign = self.applied.chars().rev().find(|c| matches!(c, '+' | '-'));
        if last_sign != Some(sign) {
            self.applied.push(sign);
        }
        self.applied.push(mode);
        self.args.extend(arg);
    }

    /// Whether anything changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// A chat channel.
#[derive(Debug)]
pub struct Channel {
    /// Channel name.
    name: ChannelName,
    /// Current topic.
    topic: Option<String>,
    /// Shared secret required to join.
    key: Option<String>,
    /// Only whitelisted sessions may join.
    invite_only: bool,
    /// Only operators may change the topic.
    topic_locked: bool,
    /// Maximum members; 0 means unlimited.
    user_limit: usize,
    /// Members in join order.
    members: Vec<Member>,
    /// Sessions exempt from invite-only.
    invited: HashSet<SessionId>,
}

impl Channel {
    /// Create a new, empty channel.
    #[must_use]
    pub fn new(name: impl Into<ChannelName>) -> Self {
        Self {
            name: name.into(),
            topic: None,
            key: None,
            invite_only: false,
            topic_locked: false,
            user_limit: 0,
            members: Vec::new(),
            invited: HashSet::new(),
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the topic.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Set or clear the topic. An empty topic clears it.
    pub fn set_topic(&mut self, topic: Option<&str>) {
        self.topic = topic.filter(|t| !t.is_empty()).map(str::to_string);
    }

    /// Get the channel key.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Set or clear the channel key. An empty key clears it.
    pub fn set_key(&mut self, key: Option<&str>) {
        self.key = key.filter(|k| !k.is_empty()).map(str::to_string);
    }

    /// Whether the channel is invite-only.
    #[must_use]
    pub fn is_invite_only(&self) -> bool {
        self.invite_only
    }

    /// Set the invite-only flag.
    pub fn set_invite_only(&mut self, invite_only: bool) {
        self.invite_only = invite_only;
    }

    /// Whether topic changes are restricted to operators.
    #[must_use]
    pub fn is_topic_locked(&self) -> bool {
        self.topic_locked
    }

    /// Set the topic lock.
    pub fn set_topic_locked(&mut self, locked: bool) {
        self.topic_locked = locked;
    }

    /// Get the user limit (0 = unlimited).
    #[must_use]
    pub fn user_limit(&self) -> usize {
        self.user_limit
    }

    /// Set the user limit (0 = unlimited).
    pub fn set_user_limit(&mut self, limit: usize) {
        self.user_limit = limit;
    }

    /// Get the number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if the channel has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Get all members in join order.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Get all member session ids in join order.
    #[must_use]
    pub fn member_ids(&self) -> Vec<SessionId> {
        self.members.iter().map(|m| m.session).collect()
    }

    /// Get the membership entry for a session.
    #[must_use]
    pub fn member(&self, session: SessionId) -> Option<&Member> {
        self.members.iter().find(|m| m.session == session)
    }

    /// Get the membership entry for a cached nickname.
    #[must_use]
    pub fn member_by_nick(&self, nickname: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.nickname == nickname)
    }

    /// Check if a session is a member.
    #[must_use]
    pub fn is_member(&self, session: SessionId) -> bool {
        self.member(session).is_some()
    }

    /// Check if a session is a member with operator status.
    #[must_use]
    pub fn is_operator(&self, session: SessionId) -> bool {
        self.member(session).is_some_and(|m| m.operator)
    }

    /// Check whether a session may join with the given key.
    ///
    /// # Errors
    ///
    /// Returns the first failing admission rule, checked in order:
    /// membership, key, user limit, invite-only.
    pub fn check_admission(&self, session: SessionId, key: Option<&str>) -> Result<(), Admission> {
        if self.is_member(session) {
            return Err(Admission::AlreadyMember);
        }
        if let Some(expected) = self.key() {
            if key != Some(expected) {
                return Err(Admission::BadKey);
            }
        }
        if self.user_limit > 0 && self.members.len() >= self.user_limit {
            return Err(Admission::Full);
        }
        if self.invite_only && !self.invited.contains(&session) {
            return Err(Admission::InviteOnly);
        }
        Ok(())
    }

    /// Add a member. The first member of an empty channel becomes operator.
    ///
    /// Returns whether the new member is an operator. Adding an existing
    /// member changes nothing.
    pub fn add_member(&mut self, session: SessionId, nickname: impl Into<String>) -> bool {
        if let Some(existing) = self.member(session) {
            return existing.operator;
        }
        let operator = self.members.is_empty();
        let nickname = nickname.into();
        debug!(channel = %self.name, session = %session, nickname = %nickname, operator, "Member added");
        self.members.push(Member {
            session,
            nickname,
            operator,
        });
        operator
    }

    /// Remove a member.
    pub fn remove_member(&mut self, session: SessionId) -> Option<Member> {
        let index = self.members.iter().position(|m| m.session == session)?;
        let member = self.members.remove(index);
        debug!(channel = %self.name, session = %session, "Member removed");
        Some(member)
    }

    /// Grant or revoke operator status.
    ///
    /// Returns `false` if the session is not a member.
    pub fn set_operator(&mut self, session: SessionId, operator: bool) -> bool {
        match self.members.iter_mut().find(|m| m.session == session) {
            Some(member) => {
                member.operator = operator;
                true
            }
            None => false,
        }
    }

    /// Update a member's cached nickname.
    ///
    /// Returns `false` if the session is not a member.
    pub fn rename_member(&mut self, session: SessionId, nickname: &str) -> bool {
        match self.members.iter_mut().find(|m| m.session == session) {
            Some(member) => {
                member.nickname = nickname.to_string();
                true
            }
            None => false,
        }
    }

    /// Check if a session is on the invite whitelist.
    #[must_use]
    pub fn is_invited(&self, session: SessionId) -> bool {
        self.invited.contains(&session)
    }

    /// Add a session to the invite whitelist.
    ///
    /// Returns `false` if it was already there.
    pub fn invite(&mut self, session: SessionId) -> bool {
        self.invited.insert(session)
    }

    /// Drop a session from the invite whitelist.
    pub fn forget_invite(&mut self, session: SessionId) -> bool {
        self.invited.remove(&session)
    }

    /// Current modes in wire form, with the key and limit as arguments.
    #[must_use]
    pub fn mode_string(&self) -> (String, Vec<String>) {
        let mut modes = String::from("+");
        let mut args = Vec::new();
        if self.invite_only {
            modes.push('i');
        }
        if self.topic_locked {
            modes.push('t');
        }
        if let Some(key) = &self.key {
            modes.push('k');
            args.push(key.clone());
        }
        if self.user_limit > 0 {
            modes.push('l');
            args.push(self.user_limit.to_string());
        }
        (modes, args)
    }

    /// Nicknames for a names listing, operators prefixed with `@`.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.members
            .iter()
            .map(|m| {
                if m.operator {
                    format!("@{}", m.nickname)
                } else {
                    m.nickname.clone()
                }
            })
            .collect()
    }

    /// Apply a mode string such as `+kl-i`, drawing arguments from `args`.
    ///
    /// Supported modes: `i` (invite-only), `t` (topic lock), `k <key>`
    /// (key; no argument when removing), `l <limit>` (user limit; no
    /// argument when removing), `o <nick>` (operator status). Each letter is
    /// applied independently; refused letters are reported in
    /// [`ModeChange::errors`] and change nothing.
    pub fn apply_modes<'a, I>(&mut self, modes: &str, args: &mut I) -> ModeChange
    where
        I: Iterator<Item = &'a str>,
    {
        let mut change = ModeChange::default();
        let mut adding = true;

        for mode in modes.chars() {
            match mode {
                '+' => adding = true,
                '-' => adding = false,
                'i' => {
                    self.invite_only = adding;
                    change.push(adding, mode, None);
                }
                't' => {
                    self.topic_locked = adding;
                    change.push(adding, mode, None);
                }
                'k' if adding => match args.next().filter(|k| !k.is_empty()) {
                    Some(key) => {
                        self.key = Some(key.to_string());
                        change.push(adding, mode, Some(key.to_string()));
                    }
                    None => change.errors.push(ModeError::MissingArgument(mode)),
                },
                'k' => {
                    self.key = None;
                    change.push(adding, mode, None);
                }
                'l' if adding => match args.next().and_then(|n| n.parse::<usize>().ok()) {
                    Some(limit) if limit > 0 => {
                        self.user_limit = limit;
                        change.push(adding, mode, Some(limit.to_string()));
                    }
                    _ => change.errors.push(ModeError::MissingArgument(mode)),
                },
                'l' => {
                    self.user_limit = 0;
                    change.push(adding, mode, None);
                }
                'o' => {
                    let Some(nick) = args.next() else {
                        change.errors.push(ModeError::MissingArgument(mode));
                        continue;
                    };
                    let target = self.member_by_nick(nick).map(|m| m.session);
                    match target {
                        Some(session) => {
                            self.set_operator(session, adding);
                            change.push(adding, mode, Some(nick.to_string()));
                        }
                        None => change.errors.push(ModeError::NotOnChannel(nick.to_string())),
                    }
                }
                other => change.errors.push(ModeError::UnknownMode(other)),
            }
        }

        if !change.is_empty() {
            debug!(channel = %self.name, modes = %change.applied, "Modes changed");
        }
        change
    }
}
