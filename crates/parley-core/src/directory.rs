//! Channel directory for Parley.
//!
//! The directory owns every channel, creates them lazily on first join and
//! applies the membership rules. It holds no reference to sessions beyond
//! their ids.

use crate::channel::{Admission, Channel, ChannelName, Member};
use crate::session::SessionId;
use parley_protocol::validate_channel_name;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info};

/// Directory errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Invalid channel name.
    #[error("Invalid channel name {0}: {1}")]
    InvalidName(String, &'static str),

    /// Channel not found.
    #[error("No such channel: {0}")]
    NoSuchChannel(String),

    /// Already a member of the channel.
    #[error("Already on channel: {0}")]
    AlreadyMember(String),

    /// Channel key did not match.
    #[error("Bad channel key: {0}")]
    BadKey(String),

    /// Channel user limit reached.
    #[error("Channel is full: {0}")]
    Full(String),

    /// Channel is invite-only and the session was not invited.
    #[error("Channel is invite-only: {0}")]
    InviteOnly(String),

    /// Not a member of the channel.
    #[error("Not on channel: {0}")]
    NotMember(String),
}

impl ChannelError {
    fn refused(admission: Admission, name: &str) -> Self {
        let name = name.to_string();
        match admission {
            Admission::AlreadyMember => ChannelError::AlreadyMember(name),
            Admission::BadKey => ChannelError::BadKey(name),
            Admission::Full => ChannelError::Full(name),
            Admission::InviteOnly => ChannelError::InviteOnly(name),
        }
    }
}

/// Directory configuration.
#[derive(Debug, Clone, Default)]
pub struct DirectoryConfig {
    /// Whether to delete channels when their last member leaves.
    pub auto_delete_empty_channels: bool,
}

/// A successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    /// The channel was created by this join.
    pub created: bool,
    /// The joiner holds operator status.
    pub operator: bool,
}

/// A membership removed from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// The channel left.
    pub channel: ChannelName,
    /// The removed entry.
    pub member: Member,
    /// Members still in the channel, in join order.
    pub remaining: Vec<SessionId>,
}

/// All channels, keyed by name.
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    channels: HashMap<ChannelName, Channel>,
    config: DirectoryConfig,
}

impl ChannelDirectory {
    /// Create a directory with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DirectoryConfig::default())
    }

    /// Create a directory with custom configuration.
    #[must_use]
    pub fn with_config(config: DirectoryConfig) -> Self {
        info!("Creating channel directory with config: {:?}", config);
        Self {
            channels: HashMap::new(),
            config,
        }
    }

    /// Get directory statistics.
    #[must_use]
    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            channel_count: self.channels.len(),
            total_memberships: self.channels.values().map(Channel::member_count).sum(),
        }
    }

    /// Join a session to a channel, creating the channel on first use.
    ///
    /// A newly created channel adopts `key` as its access key.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an admission rule fails.
    /// A refused join changes no membership.
    pub fn join(
        &mut self,
        session: SessionId,
        nickname: &str,
        name: &str,
        key: Option<&str>,
    ) -> Result<Joined, ChannelError> {
        validate_channel_name(name).map_err(|e| ChannelError::InvalidName(name.to_string(), e))?;

        let created = !self.channels.contains_key(name);
        let channel = self.channels.entry(name.to_string()).or_insert_with(|| {
            debug!(channel = %name, "Creating new channel");
            let mut channel = Channel::new(name);
            channel.set_key(key);
            channel
        });

        channel
            .check_admission(session, key)
            .map_err(|admission| ChannelError::refused(admission, name))?;

        let operator = channel.add_member(session, nickname);
        debug!(
            channel = %name,
            session = %session,
            members = channel.member_count(),
            "Joined"
        );

        Ok(Joined { created, operator })
    }

    /// Remove a session from a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel does not exist or the session is not
    /// a member.
    pub fn leave(&mut self, session: SessionId, name: &str) -> Result<Departure, ChannelError> {
        let channel = self
            .channels
            .get_mut(name)
            .ok_or_else(|| ChannelError::NoSuchChannel(name.to_string()))?;
        let member = channel
            .remove_member(session)
            .ok_or_else(|| ChannelError::NotMember(name.to_string()))?;
        let remaining = channel.member_ids();

        if self.config.auto_delete_empty_channels && remaining.is_empty() {
            self.channels.remove(name);
            debug!(channel = %name, "Deleted empty channel");
        }

        Ok(Departure {
            channel: name.to_string(),
            member,
            remaining,
        })
    }

    /// Remove a session from every channel it belongs to.
    ///
    /// Also drops the session from every invite whitelist, since its id can
    /// never be seen again.
    pub fn leave_all(&mut self, session: SessionId) -> Vec<Departure> {
        let departures: Vec<Departure> = self
            .channels_of(session)
            .iter()
            .filter_map(|name| self.leave(session, name).ok())
            .collect();

        for channel in self.channels.values_mut() {
            channel.forget_invite(session);
        }

        debug!(session = %session, channels = departures.len(), "Left all channels");
        departures
    }

    /// Update a session's cached nickname in every channel it belongs to.
    ///
    /// Returns every session sharing at least one channel with it, itself
    /// included if it is in any channel.
    pub fn rename(&mut self, session: SessionId, nickname: &str) -> BTreeSet<SessionId> {
        let mut peers = BTreeSet::new();
        for channel in self.channels.values_mut() {
            if channel.rename_member(session, nickname) {
                peers.extend(channel.member_ids());
            }
        }
        peers
    }

    /// Get a channel.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Get a channel mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(name)
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Get the member count for a channel.
    #[must_use]
    pub fn member_count(&self, name: &str) -> usize {
        self.channels.get(name).map_or(0, Channel::member_count)
    }

    /// Get all channel names, sorted.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the channels a session belongs to, sorted.
    #[must_use]
    pub fn channels_of(&self, session: SessionId) -> Vec<String> {
        let mut names: Vec<String> = self
            .channels
            .values()
            .filter(|c| c.is_member(session))
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Number of channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if there are no channels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Directory statistics.
#[derive(Debug, Clone)]
pub struct DirectoryStats {
    /// Number of channels.
    pub channel_count: usize,
    /// Sum of all channel memberships.
    pub total_memberships: usize,
}
