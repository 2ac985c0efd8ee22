//! The command hub.
//!
//! [`Hub`] owns the session registry and the channel directory and is the
//! only thing that mutates them. It is driven by three inputs (a new
//! connection, bytes from a connection, a closed connection) and answers each
//! with an [`Outbox`]. Every call runs to completion; there is no I/O here.

mod channel_ops;
mod messaging;
mod registration;

use crate::delivery::Outbox;
use crate::directory::{ChannelDirectory, ChannelError, DirectoryConfig};
use crate::session::{SessionId, SessionRegistry};
use parley_protocol::{
    Args, CommandKind, CommandLine, LineCodec, Numeric, ParseError, Reply,
    DEFAULT_MAX_LINE_LENGTH,
};
use tokio_util::codec::Decoder;
use tracing::{debug, info, trace, warn};

/// Number of notices sent to every new connection.
pub const GREETING_LINES: usize = 6;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Name used as the source of server replies.
    pub server_name: String,
    /// Connection password checked by `PASS`.
    pub password: String,
    /// Maximum bytes buffered for one unterminated line.
    pub max_line_length: usize,
    /// Channel directory settings.
    pub directory: DirectoryConfig,
}

impl HubConfig {
    /// Create a configuration with the given password and defaults.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            server_name: "parley".to_string(),
            password: password.into(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            directory: DirectoryConfig::default(),
        }
    }
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Live sessions.
    pub sessions: usize,
    /// Registered sessions.
    pub registered: usize,
    /// Channels.
    pub channels: usize,
    /// Sum of all channel memberships.
    pub memberships: usize,
}

/// Sessions, channels and the command handlers that act on them.
#[derive(Debug)]
pub struct Hub {
    config: HubConfig,
    sessions: SessionRegistry,
    channels: ChannelDirectory,
    codec: LineCodec,
}

impl Hub {
    /// Create a hub with empty registries.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        info!(server_name = %config.server_name, "Creating hub");
        Self {
            sessions: SessionRegistry::new(),
            channels: ChannelDirectory::with_config(config.directory.clone()),
            codec: LineCodec::with_max_length(config.max_line_length),
            config,
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Get the session registry.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Get the channel directory.
    #[must_use]
    pub fn channels(&self) -> &ChannelDirectory {
        &self.channels
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let directory = self.channels.stats();
        HubStats {
            sessions: self.sessions.len(),
            registered: self.sessions.registered_count(),
            channels: directory.channel_count,
            memberships: directory.total_memberships,
        }
    }

    /// Create a session for a new connection and greet it.
    pub fn connect(&mut self, host: &str) -> (SessionId, Outbox) {
        let id = self.sessions.create(host);
        let server = self.config.server_name.as_str();

        let mut out = Outbox::new();
        let greeting: [String; GREETING_LINES] = [
            format!("Welcome to {server}!"),
            "To register, use the following commands:".to_string(),
            "PASS <password>".to_string(),
            "NICK <nickname>".to_string(),
            "USER <username> <hostname> <servername> <realname>".to_string(),
            "After that, use HELP to see all the commands".to_string(),
        ];
        for text in greeting {
            out.send_reply(id, &Reply::notice(server, "*", text));
        }

        info!(session = %id, host = %host, "Session connected");
        (id, out)
    }

    /// Feed bytes received from a connection.
    ///
    /// Every complete line is handled in arrival order; an unterminated tail
    /// stays buffered. Overflowing the line limit disconnects the session.
    pub fn receive(&mut self, id: SessionId, data: &[u8]) -> Outbox {
        let mut out = Outbox::new();
        let Some(session) = self.sessions.get_mut(id) else {
            trace!(session = %id, "Data for unknown session dropped");
            return out;
        };
        session.inbound_mut().extend_from_slice(data);

        // A handler may remove the session (QUIT, wrong password), which
        // discards whatever is still buffered.
        while let Some(session) = self.sessions.get_mut(id) {
            match self.codec.decode(session.inbound_mut()) {
                Ok(Some(line)) => self.handle_line(id, &line, &mut out),
                Ok(None) => break,
                Err(e) => {
                    warn!(session = %id, error = %e, "Dropping session");
                    out.send_reply(id, &Reply::new("ERROR").trailing("Input line too long"));
                    self.disconnect_into(id, "Input line too long", &mut out);
                    break;
                }
            }
        }
        out
    }

    /// Remove a session and tell its channels it left.
    pub fn disconnect(&mut self, id: SessionId, reason: &str) -> Outbox {
        let mut out = Outbox::new();
        self.disconnect_into(id, reason, &mut out);
        out
    }

    /// Handle a single line (terminator already stripped).
    pub fn handle_line(&mut self, id: SessionId, line: &str, out: &mut Outbox) {
        let command = match CommandLine::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(ParseError::UnknownCommand(verb)) => {
                debug!(session = %id, verb = %verb, "Unknown command");
                out.send_reply(id, &self.numeric(id, Numeric::UnknownCommand).param(verb));
                return;
            }
        };

        let registered = self.sessions.get(id).is_some_and(|s| s.is_registered());
        if command.kind.requires_registration() && !registered {
            debug!(session = %id, command = command.kind.verb(), "Rejected before registration");
            out.send_reply(id, &self.numeric(id, Numeric::NotRegistered));
            return;
        }

        trace!(session = %id, command = command.kind.verb(), "Dispatching");
        self.dispatch(id, command.kind, command.args, out);
    }

    fn dispatch(&mut self, id: SessionId, kind: CommandKind, args: Args<'_>, out: &mut Outbox) {
        match kind {
            CommandKind::Pass => self.handle_pass(id, args, out),
            CommandKind::Nick => self.handle_nick(id, args, out),
            CommandKind::User => self.handle_user(id, args, out),
            CommandKind::Quit => self.handle_quit(id, args, out),
            CommandKind::Help => self.handle_help(id, out),
            CommandKind::Join => self.handle_join(id, args, out),
            CommandKind::Part => self.handle_part(id, args, out),
            CommandKind::Kick => self.handle_kick(id, args, out),
            CommandKind::Invite => self.handle_invite(id, args, out),
            CommandKind::Topic => self.handle_topic(id, args, out),
            CommandKind::Mode => self.handle_mode(id, args, out),
            CommandKind::Privmsg => self.handle_privmsg(id, args, out),
            CommandKind::Ping => self.handle_ping(id, args, out),
            CommandKind::Pong => {}
        }
    }

    /// Remove a session, appending departure notices to `out`.
    ///
    /// Membership is removed from every channel before the session itself,
    /// so no channel ever holds an id the registry no longer knows.
    pub fn disconnect_into(&mut self, id: SessionId, reason: &str, out: &mut Outbox) {
        let Some(session) = self.sessions.get(id) else {
            return;
        };
        let mask = session.mask();

        for departure in self.channels.leave_all(id) {
            let part = Reply::from_source(&mask, "PART")
                .param(&departure.channel)
                .trailing(reason);
            out.broadcast(departure.remaining, &part);
        }

        self.sessions.remove(id);
        out.close(id);
        info!(session = %id, reason = %reason, "Session disconnected");
    }

    /// A numeric reply from the server addressed to a session.
    fn numeric(&self, id: SessionId, numeric: Numeric) -> Reply {
        Reply::numeric(&self.config.server_name, numeric, self.nick_or_star(id))
    }

    /// A notice from the server addressed to a session.
    fn notice(&self, id: SessionId, text: impl Into<String>) -> Reply {
        Reply::notice(&self.config.server_name, self.nick_or_star(id), text)
    }

    fn nick_or_star(&self, id: SessionId) -> &str {
        self.sessions.get(id).map_or("*", |s| s.nick_or_star())
    }

    fn mask(&self, id: SessionId) -> String {
        self.sessions.get(id).map(|s| s.mask()).unwrap_or_default()
    }

    /// The reply for a refused channel operation.
    fn channel_error(&self, id: SessionId, error: &ChannelError) -> Reply {
        match error {
            ChannelError::InvalidName(name, _) | ChannelError::NoSuchChannel(name) => {
                self.numeric(id, Numeric::NoSuchChannel).param(name)
            }
            ChannelError::AlreadyMember(name) => self
                .numeric(id, Numeric::UserOnChannel)
                .param(self.nick_or_star(id))
                .param(name),
            ChannelError::BadKey(name) => self.numeric(id, Numeric::BadChannelKey).param(name),
            ChannelError::Full(name) => self.numeric(id, Numeric::ChannelIsFull).param(name),
            ChannelError::InviteOnly(name) => {
                self.numeric(id, Numeric::InviteOnlyChan).param(name)
            }
            ChannelError::NotMember(name) => self.numeric(id, Numeric::NotOnChannel).param(name),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub const PASSWORD: &str = "secret";

    pub fn hub() -> Hub {
        Hub::new(HubConfig::new(PASSWORD))
    }

    pub fn connect(hub: &mut Hub) -> SessionId {
        hub.connect("127.0.0.1").0
    }

    pub fn send(hub: &mut Hub, id: SessionId, line: &str) -> Outbox {
        hub.receive(id, format!("{line}\r\n").as_bytes())
    }

    /// Connect and complete the handshake.
    pub fn register(hub: &mut Hub, nick: &str) -> SessionId {
        let id = connect(hub);
        send(hub, id, &format!("PASS {PASSWORD}"));
        send(hub, id, &format!("NICK {nick}"));
        send(hub, id, &format!("USER {nick} host srv :{nick} Real"));
        assert!(hub.sessions().get(id).unwrap().is_registered());
        id
    }

    /// Lines for one session that carry the given command or numeric.
    pub fn lines_with<'a>(out: &'a Outbox, id: SessionId, command: &str) -> Vec<&'a str> {
        out.lines_for(id)
            .into_iter()
            .filter(|line| line.split(' ').nth(1) == Some(command) || line.starts_with(command))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_greeting_on_connect() {
        let mut hub = hub();
        let (id, out) = hub.connect("127.0.0.1");
        let lines = out.lines_for(id);
        assert_eq!(lines.len(), GREETING_LINES);
        assert_eq!(lines[0], ":parley NOTICE * :Welcome to parley!");
        assert!(out.closed().is_empty());
    }

    #[test]
    fn test_unknown_command_any_state() {
        let mut hub = hub();
        let a = connect(&mut hub);
        let out = send(&mut hub, a, "WHOIS bob");
        assert_eq!(out.lines_for(a), vec![":parley 421 * WHOIS :Unknown command"]);

        let b = register(&mut hub, "bob");
        let out = send(&mut hub, b, "join #a");
        assert_eq!(out.lines_for(b), vec![":parley 421 bob join :Unknown command"]);
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut hub = hub();
        let a = connect(&mut hub);
        let out = hub.receive(a, b"\r\n   \r\n");
        assert!(out.is_empty());
    }

    #[test]
    fn test_gate_rejects_before_registration() {
        let mut hub = hub();
        let a = connect(&mut hub);
        send(&mut hub, a, "PASS secret");

        for line in ["JOIN #a", "PRIVMSG bob :hi", "KICK #a bob", "INVITE bob #a", "MODE #a"] {
            let out = send(&mut hub, a, line);
            assert_eq!(out.lines_for(a), vec![":parley 451 * :You have not registered"]);
        }
        assert!(hub.channels().is_empty());
    }

    #[test]
    fn test_help_and_ping_before_registration() {
        let mut hub = hub();
        let a = connect(&mut hub);

        let out = send(&mut hub, a, "HELP");
        assert_eq!(out.lines_for(a).len(), CommandKind::ALL.len());

        let out = send(&mut hub, a, "PING abc");
        assert_eq!(out.lines_for(a), vec![":parley PONG parley :abc"]);

        assert!(send(&mut hub, a, "PONG abc").is_empty());
    }

    #[test]
    fn test_lines_handled_in_order_and_tail_buffered() {
        let mut hub = hub();
        let a = connect(&mut hub);

        let out = hub.receive(a, b"PASS secret\r\nNICK bob\r\nUSER bob h s :B");
        let lines = out.lines_for(a);
        assert_eq!(lines[0], ":parley NOTICE * :Password accepted");
        assert_eq!(lines[1], ":parley NOTICE bob :Nickname set to bob");
        assert_eq!(lines.len(), 2);
        assert_eq!(hub.sessions().get(a).unwrap().buffered(), "USER bob h s :B".len());

        let out = hub.receive(a, b"ob\r\n");
        assert_eq!(lines_with(&out, a, "001").len(), 1);
    }

    #[test]
    fn test_overlong_line_disconnects() {
        let mut config = HubConfig::new(PASSWORD);
        config.max_line_length = 16;
        let mut hub = Hub::new(config);
        let a = connect(&mut hub);

        let out = hub.receive(a, &[b'x'; 64]);
        assert_eq!(out.lines_for(a), vec!["ERROR :Input line too long"]);
        assert_eq!(out.closed(), &[a]);
        assert!(!hub.sessions().contains(a));
    }

    #[test]
    fn test_full_length_line_survives_split_terminator() {
        let mut config = HubConfig::new(PASSWORD);
        config.max_line_length = 8;
        let mut hub = Hub::new(config);
        let a = connect(&mut hub);

        let out = hub.receive(a, b"PING abc\r");
        assert!(out.is_empty());
        assert!(hub.sessions().contains(a));

        let out = hub.receive(a, b"\n");
        assert_eq!(out.lines_for(a), vec![":parley PONG parley :abc"]);
        assert!(out.closed().is_empty());
    }

    #[test]
    fn test_data_for_unknown_session() {
        let mut hub = hub();
        let a = connect(&mut hub);
        hub.disconnect(a, "gone");
        assert!(hub.receive(a, b"NICK bob\r\n").is_empty());
        assert!(hub.disconnect(a, "again").is_empty());
    }

    #[test]
    fn test_disconnect_parts_every_channel_once() {
        let mut hub = hub();
        let alice = register(&mut hub, "alice");
        let bob = register(&mut hub, "bob");
        let carol = register(&mut hub, "carol");
        send(&mut hub, alice, "JOIN #a,#b,#c");
        send(&mut hub, bob, "JOIN #a,#b");
        send(&mut hub, carol, "JOIN #b");

        let out = hub.disconnect(alice, "Connection reset");

        assert_eq!(
            out.lines_for(bob),
            vec![
                ":alice!alice@127.0.0.1 PART #a :Connection reset",
                ":alice!alice@127.0.0.1 PART #b :Connection reset",
            ]
        );
        assert_eq!(
            out.lines_for(carol),
            vec![":alice!alice@127.0.0.1 PART #b :Connection reset"]
        );
        assert!(out.lines_for(alice).is_empty());
        assert_eq!(out.closed(), &[alice]);

        assert!(!hub.sessions().contains(alice));
        assert!(hub.sessions().find_by_nick("alice").is_none());
        for name in ["#a", "#b", "#c"] {
            assert!(!hub.channels().get(name).unwrap().is_member(alice));
        }
        // Empty channels are kept by default.
        assert!(hub.channels().exists("#c"));
    }

    #[test]
    fn test_disconnect_with_auto_delete() {
        let mut config = HubConfig::new(PASSWORD);
        config.directory.auto_delete_empty_channels = true;
        let mut hub = Hub::new(config);
        let alice = register(&mut hub, "alice");
        send(&mut hub, alice, "JOIN #a");

        hub.disconnect(alice, "bye");
        assert!(hub.channels().is_empty());
    }

    #[test]
    fn test_stats() {
        let mut hub = hub();
        let alice = register(&mut hub, "alice");
        connect(&mut hub);
        send(&mut hub, alice, "JOIN #a,#b");

        let stats = hub.stats();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.channels, 2);
        assert_eq!(stats.memberships, 2);
    }
}
