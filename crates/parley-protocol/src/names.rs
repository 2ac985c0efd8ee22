//! Nickname and channel-name grammar.

/// Prefix every channel name must start with.
pub const CHANNEL_SIGIL: char = '#';

/// Maximum nickname length.
pub const MAX_NICK_LENGTH: usize = 30;

/// Maximum channel name length, sigil included.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 50;

/// Punctuation allowed in nicknames besides ASCII letters and digits.
pub const NICK_SPECIALS: &str = "[]\\`_^{|}-";

/// Validate a nickname.
///
/// # Errors
///
/// Returns an error message if the nickname is invalid.
pub fn validate_nickname(nick: &str) -> Result<(), &'static str> {
    let Some(first) = nick.chars().next() else {
        return Err("Nickname cannot be empty");
    };
    if first.is_ascii_digit() {
        return Err("Nickname cannot start with a digit");
    }
    if nick.len() > MAX_NICK_LENGTH {
        return Err("Nickname too long");
    }
    if !nick
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || NICK_SPECIALS.contains(c))
    {
        return Err("Nickname contains invalid characters");
    }
    Ok(())
}

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if !name.starts_with(CHANNEL_SIGIL) {
        return Err("Channel name must start with '#'");
    }
    if name.len() < 2 {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name
        .chars()
        .any(|c| c == ' ' || c == ',' || c == '\x07' || c.is_control())
    {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// Whether a message target names a channel.
#[must_use]
pub fn is_channel_target(target: &str) -> bool {
    target.starts_with(CHANNEL_SIGIL)
}
