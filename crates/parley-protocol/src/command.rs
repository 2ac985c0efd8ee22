//! Command lines.
//!
//! A line is a verb followed by whitespace-separated arguments. The verb is
//! matched exactly (case-sensitive) against the closed [`CommandKind`]
//! table; argument interpretation is left to each handler through [`Args`].

use thiserror::Error;

/// Command parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The verb is not in the command table.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Every command the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Pass,
    Nick,
    User,
    Quit,
    Help,
    Join,
    Part,
    Kick,
    Invite,
    Topic,
    Mode,
    Privmsg,
    Ping,
    Pong,
}

impl CommandKind {
    /// All command kinds, in help order.
    pub const ALL: [CommandKind; 14] = [
        CommandKind::Pass,
        CommandKind::Nick,
        CommandKind::User,
        CommandKind::Quit,
        CommandKind::Help,
        CommandKind::Join,
        CommandKind::Part,
        CommandKind::Kick,
        CommandKind::Invite,
        CommandKind::Topic,
        CommandKind::Mode,
        CommandKind::Privmsg,
        CommandKind::Ping,
        CommandKind::Pong,
    ];

    /// Look up a verb. Matching is exact and case-sensitive.
    #[must_use]
    pub fn from_verb(verb: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.verb() == verb)
    }

    /// The wire verb.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            CommandKind::Pass => "PASS",
            CommandKind::Nick => "NICK",
            CommandKind::User => "USER",
            CommandKind::Quit => "QUIT",
            CommandKind::Help => "HELP",
            CommandKind::Join => "JOIN",
            CommandKind::Part => "PART",
            CommandKind::Kick => "KICK",
            CommandKind::Invite => "INVITE",
            CommandKind::Topic => "TOPIC",
            CommandKind::Mode => "MODE",
            CommandKind::Privmsg => "PRIVMSG",
            CommandKind::Ping => "PING",
            CommandKind::Pong => "PONG",
        }
    }

    /// Whether the command is only accepted from registered sessions.
    ///
    /// The handshake commands, `QUIT`, `HELP` and keepalives are reachable
    /// at any time.
    #[must_use]
    pub fn requires_registration(self) -> bool {
        !matches!(
            self,
            CommandKind::Pass
                | CommandKind::Nick
                | CommandKind::User
                | CommandKind::Quit
                | CommandKind::Help
                | CommandKind::Ping
                | CommandKind::Pong
        )
    }

    /// One-line usage text.
    #[must_use]
    pub fn usage(self) -> &'static str {
        match self {
            CommandKind::Pass => "PASS <password> - authenticate with the server password",
            CommandKind::Nick => "NICK <nickname> - set or change your nickname",
            CommandKind::User => {
                "USER <username> <hostname> <servername> <realname> - set your profile"
            }
            CommandKind::Quit => "QUIT [:reason] - disconnect",
            CommandKind::Help => "HELP - show this list",
            CommandKind::Join => "JOIN <#channel>[,<#channel>] [<key>[,<key>]] - join channels",
            CommandKind::Part => "PART <#channel>[,<#channel>] [:reason] - leave channels",
            CommandKind::Kick => "KICK <#channel> <nickname> [reason] - remove a member",
            CommandKind::Invite => "INVITE <nickname> <#channel> - invite a user",
            CommandKind::Topic => "TOPIC <#channel> [:topic] - show or set the topic",
            CommandKind::Mode => "MODE <#channel> [+|-itklo [args]] - show or change modes",
            CommandKind::Privmsg => "PRIVMSG <nickname|#channel> :<text> - send a message",
            CommandKind::Ping => "PING <token> - keepalive",
            CommandKind::Pong => "PONG <token> - keepalive reply",
        }
    }
}

/// Cursor over a command's arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Args<'a> {
    rest: &'a str,
}

impl<'a> Args<'a> {
    /// Wrap the text following the verb.
    #[must_use]
    pub fn new(rest: &'a str) -> Self {
        Self { rest }
    }

    /// Take the next whitespace-delimited word.
    pub fn next_word(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start();
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let (word, rest) = trimmed.split_at(end);
        self.rest = rest;
        Some(word)
    }

    /// Take the next parameter: a word, or the trailing text if the next
    /// word starts with `:`.
    pub fn next_param(&mut self) -> Option<&'a str> {
        if self.rest.trim_start().starts_with(':') {
            self.trailing().filter(|p| !p.is_empty())
        } else {
            self.next_word()
        }
    }

    /// Take everything left, with leading whitespace and one leading `:`
    /// removed. Returns `None` if nothing is left; `Some("")` for a bare `:`.
    pub fn trailing(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start();
        self.rest = "";
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.strip_prefix(':').unwrap_or(trimmed))
        }
    }

    /// The unconsumed text, untouched.
    #[must_use]
    pub fn rest(&self) -> &'a str {
        self.rest
    }

    /// Whether only whitespace remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rest.trim().is_empty()
    }
}

/// A parsed command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLine<'a> {
    /// The command.
    pub kind: CommandKind,
    /// Its arguments.
    pub args: Args<'a>,
}

impl<'a> CommandLine<'a> {
    /// Parse a line (terminator already stripped).
    ///
    /// Returns `Ok(None)` for a blank line.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::UnknownCommand`] if the verb is not recognized.
    pub fn parse(line: &'a str) -> Result<Option<Self>, ParseError> {
        let mut args = Args::new(line);
        let Some(verb) = args.next_word() else {
            return Ok(None);
        };
        let kind = CommandKind::from_verb(verb)
            .ok_or_else(|| ParseError::UnknownCommand(verb.to_string()))?;
        Ok(Some(Self { kind, args }))
    }
}
