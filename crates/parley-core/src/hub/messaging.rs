//! Messaging and session commands: `PRIVMSG`, `QUIT`, `HELP` and `PING`.

use super::Hub;
use crate::delivery::Outbox;
use crate::session::SessionId;
use parley_protocol::{is_channel_target, Args, CommandKind, Numeric, Reply};
use tracing::{debug, trace};

impl Hub {
    pub(super) fn handle_privmsg(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(target) = args.next_word() else {
            out.send_reply(id, &self.numeric(id, Numeric::NoRecipient));
            return;
        };
        let rest = args.rest().trim_start();
        if rest.is_empty() {
            out.send_reply(id, &self.numeric(id, Numeric::NoTextToSend));
            return;
        }
        let Some(text) = rest.strip_prefix(':') else {
            out.send_reply(
                id,
                &self
                    .numeric(id, Numeric::NeedMoreParams)
                    .param("PRIVMSG")
                    .trailing("Invalid syntax, use ':' before message"),
            );
            return;
        };
        if text.is_empty() {
            out.send_reply(id, &self.numeric(id, Numeric::NoTextToSend));
            return;
        }

        let line = Reply::from_source(&self.mask(id), "PRIVMSG")
            .param(target)
            .trailing(text);

        if is_channel_target(target) {
            let Some(channel) = self.channels.get(target) else {
                out.send_reply(id, &self.numeric(id, Numeric::NoSuchChannel).param(target));
                return;
            };
            if !channel.is_member(id) {
                out.send_reply(id, &self.numeric(id, Numeric::CannotSendToChan).param(target));
                return;
            }
            let recipients = channel.member_ids().into_iter().filter(|m| *m != id);
            out.broadcast(recipients, &line);
            trace!(session = %id, channel = %target, "Channel message");
        } else {
            let Some(recipient) = self.sessions.find_by_nick(target) else {
                out.send_reply(id, &self.numeric(id, Numeric::NoSuchNick).param(target));
                return;
            };
            out.send_reply(recipient, &line);
            trace!(session = %id, target = %recipient, "Direct message");
        }
    }

    pub(super) fn handle_quit(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let reason = match args.trailing().filter(|r| !r.is_empty()) {
            Some(text) => format!("Quit: {text}"),
            None => "Quit".to_string(),
        };
        let host = self
            .sessions
            .get(id)
            .map(|s| s.host().to_string())
            .unwrap_or_default();

        out.send_reply(
            id,
            &Reply::new("ERROR").trailing(format!("Closing link: {host} ({reason})")),
        );
        debug!(session = %id, reason = %reason, "Quit");
        self.disconnect_into(id, &reason, out);
    }

    pub(super) fn handle_help(&self, id: SessionId, out: &mut Outbox) {
        for kind in CommandKind::ALL {
            out.send_reply(id, &self.notice(id, kind.usage()));
        }
    }

    pub(super) fn handle_ping(&self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(token) = args.next_param() else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("PING"));
            return;
        };
        let server = &self.config.server_name;
        out.send_reply(
            id,
            &Reply::from_source(server, "PONG").param(server).trailing(token),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;

    #[test]
    fn test_direct_message() {
        let mut hub = hub();
        let alice = register(&mut hub, "alice");
        let bob = register(&mut hub, "bob");

        let out = send(&mut hub, alice, "PRIVMSG bob :hello there");
        assert_eq!(
            out.lines_for(bob),
            vec![":alice!alice@127.0.0.1 PRIVMSG bob :hello there"]
        );
        assert!(out.lines_for(alice).is_empty());
    }

    #[test]
    fn test_direct_message_reaches_unregistered_session() {
        let mut hub = hub();
        let alice = register(&mut hub, "alice");
        let pending = connect(&mut hub);
        send(&mut hub, pending, "NICK pending");

        let out = send(&mut hub, alice, "PRIVMSG pending :hi");
        assert_eq!(out.lines_for(pending).len(), 1);
    }

    #[test]
    fn test_channel_message_skips_sender() {
        let mut hub = hub();
        let alice = register(&mut hub, "alice");
        let bob = register(&mut hub, "bob");
        let carol = register(&mut hub, "carol");
        let outsider = register(&mut hub, "dave");
        send(&mut hub, alice, "JOIN #a");
        send(&mut hub, bob, "JOIN #a");
        send(&mut hub, carol, "JOIN #a");

        let out = send(&mut hub, bob, "PRIVMSG #a :hi all");
        let line = ":bob!bob@127.0.0.1 PRIVMSG #a :hi all";
        assert_eq!(out.lines_for(alice), vec![line]);
        assert_eq!(out.lines_for(carol), vec![line]);
        assert!(out.lines_for(bob).is_empty());
        assert!(out.lines_for(outsider).is_empty());
    }

    #[test]
    fn test_privmsg_errors() {
        let mut hub = hub();
        let alice = register(&mut hub, "alice");
        let bob = register(&mut hub, "bob");
        send(&mut hub, bob, "JOIN #b");

        let cases = [
            ("PRIVMSG", ":parley 411 alice :No recipient given"),
            ("PRIVMSG bob", ":parley 412 alice :No text to send"),
            ("PRIVMSG bob :", ":parley 412 alice :No text to send"),
            (
                "PRIVMSG bob hello",
                ":parley 461 alice PRIVMSG :Invalid syntax, use ':' before message",
            ),
            ("PRIVMSG ghost :hi", ":parley 401 alice ghost :No such nick/channel"),
            ("PRIVMSG #nope :hi", ":parley 403 alice #nope :No such channel"),
            ("PRIVMSG #b :hi", ":parley 404 alice #b :Cannot send to channel"),
        ];
        for (line, expected) in cases {
            let out = send(&mut hub, alice, line);
            assert_eq!(out.lines_for(alice), vec![expected], "{line}");
            assert!(out.lines_for(bob).is_empty(), "{line}");
        }
    }

    #[test]
    fn test_quit() {
        let mut hub = hub();
        let alice = register(&mut hub, "alice");
        let bob = register(&mut hub, "bob");
        send(&mut hub, alice, "JOIN #a");
        send(&mut hub, bob, "JOIN #a");

        let out = send(&mut hub, alice, "QUIT :gone fishing");
        assert_eq!(
            out.lines_for(alice),
            vec!["ERROR :Closing link: 127.0.0.1 (Quit: gone fishing)"]
        );
        assert_eq!(
            out.lines_for(bob),
            vec![":alice!alice@127.0.0.1 PART #a :Quit: gone fishing"]
        );
        assert_eq!(out.closed(), &[alice]);
        assert!(!hub.sessions().contains(alice));
    }

    #[test]
    fn test_quit_before_registration() {
        let mut hub = hub();
        let a = connect(&mut hub);
        let out = send(&mut hub, a, "QUIT");
        assert_eq!(out.lines_for(a), vec!["ERROR :Closing link: 127.0.0.1 (Quit)"]);
        assert_eq!(out.closed(), &[a]);
    }

    #[test]
    fn test_ping_needs_token() {
        let mut hub = hub();
        let a = connect(&mut hub);
        let out = send(&mut hub, a, "PING");
        assert_eq!(out.lines_for(a), vec![":parley 461 * PING :Not enough parameters"]);
    }
}
