//! Outgoing lines.
//!
//! Every line the server writes is a [`Reply`]: an optional source prefix,
//! a command or three-digit numeric, middle parameters and an optional
//! trailing parameter.

use std::fmt;

/// Numeric reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Numeric {
    Welcome = 1,
    ChannelModeIs = 324,
    NoTopic = 331,
    Topic = 332,
    Inviting = 341,
    NamReply = 353,
    EndOfNames = 366,
    NoSuchNick = 401,
    NoSuchChannel = 403,
    CannotSendToChan = 404,
    NoRecipient = 411,
    NoTextToSend = 412,
    UnknownCommand = 421,
    NoNicknameGiven = 431,
    ErroneousNickname = 432,
    NicknameInUse = 433,
    UserNotInChannel = 441,
    NotOnChannel = 442,
    UserOnChannel = 443,
    NotRegistered = 451,
    NeedMoreParams = 461,
    AlreadyRegistered = 462,
    PasswdMismatch = 464,
    ChannelIsFull = 471,
    UnknownMode = 472,
    InviteOnlyChan = 473,
    BadChannelKey = 475,
    ChanOpPrivsNeeded = 482,
}

impl Numeric {
    /// The numeric code.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The conventional trailing text, if the reply has one.
    #[must_use]
    pub fn default_text(self) -> Option<&'static str> {
        match self {
            Numeric::Welcome
            | Numeric::ChannelModeIs
            | Numeric::Topic
            | Numeric::Inviting
            | Numeric::NamReply => None,
            Numeric::NoTopic => Some("No topic is set"),
            Numeric::EndOfNames => Some("End of /NAMES list"),
            Numeric::NoSuchNick => Some("No such nick/channel"),
            Numeric::NoSuchChannel => Some("No such channel"),
            Numeric::CannotSendToChan => Some("Cannot send to channel"),
            Numeric::NoRecipient => Some("No recipient given"),
            Numeric::NoTextToSend => Some("No text to send"),
            Numeric::UnknownCommand => Some("Unknown command"),
            Numeric::NoNicknameGiven => Some("No nickname given"),
            Numeric::ErroneousNickname => Some("Erroneous nickname"),
            Numeric::NicknameInUse => Some("Nickname is already in use"),
            Numeric::UserNotInChannel => Some("They aren't on that channel"),
            Numeric::NotOnChannel => Some("You're not on that channel"),
            Numeric::UserOnChannel => Some("is already on channel"),
            Numeric::NotRegistered => Some("You have not registered"),
            Numeric::NeedMoreParams => Some("Not enough parameters"),
            Numeric::AlreadyRegistered => Some("You may not reregister"),
            Numeric::PasswdMismatch => Some("Password incorrect"),
            Numeric::ChannelIsFull => Some("Cannot join channel (+l)"),
            Numeric::UnknownMode => Some("is unknown mode char to me"),
            Numeric::InviteOnlyChan => Some("Cannot join channel (+i)"),
            Numeric::BadChannelKey => Some("Cannot join channel (+k)"),
            Numeric::ChanOpPrivsNeeded => Some("You're not channel operator"),
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.code())
    }
}

/// A single outgoing protocol line, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    prefix: Option<String>,
    command: String,
    params: Vec<String>,
    trailing: Option<String>,
}

impl Reply {
    /// Create a reply with no prefix, e.g. `ERROR`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params: Vec::new(),
            trailing: None,
        }
    }

    /// Create a numeric reply from the server to `target`.
    ///
    /// The numeric's conventional text is used as the trailing parameter
    /// unless overridden with [`Reply::trailing`].
    #[must_use]
    pub fn numeric(server: &str, numeric: Numeric, target: &str) -> Self {
        Self {
            prefix: Some(server.to_string()),
            command: numeric.to_string(),
            params: vec![target.to_string()],
            trailing: numeric.default_text().map(str::to_string),
        }
    }

    /// Create a server notice to `target`.
    #[must_use]
    pub fn notice(server: &str, target: &str, text: impl Into<String>) -> Self {
        Self::from_source(server, "NOTICE").param(target).trailing(text)
    }

    /// Create a line relayed on behalf of a user or the server.
    #[must_use]
    pub fn from_source(source: &str, command: impl Into<String>) -> Self {
        Self {
            prefix: Some(source.to_string()),
            ..Self::new(command)
        }
    }

    /// Append a middle parameter.
    #[must_use]
    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Set the trailing parameter.
    #[must_use]
    pub fn trailing(mut self, text: impl Into<String>) -> Self {
        self.trailing = Some(text.into());
        self
    }

    /// The command or numeric, as written on the wire.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        if let Some(trailing) = &self.trailing {
            write!(f, " :{trailing}")?;
        }
        Ok(())
    }
}
