//! Handshake commands: `PASS`, `NICK` and `USER`.

use super::Hub;
use crate::delivery::Outbox;
use crate::session::{Profile, SessionId};
use parley_protocol::{validate_nickname, Args, Numeric, Reply};
use tracing::{debug, info, warn};

impl Hub {
    pub(super) fn handle_pass(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(session) = self.sessions.get(id) else {
            return;
        };
        if session.is_registered() || session.password_accepted() {
            out.send_reply(id, &self.numeric(id, Numeric::AlreadyRegistered));
            return;
        }
        let Some(secret) = args.next_param() else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("PASS"));
            return;
        };

        if secret != self.config.password {
            warn!(session = %id, "Password mismatch");
            out.send_reply(id, &self.numeric(id, Numeric::PasswdMismatch));
            self.disconnect_into(id, "Password incorrect", out);
            return;
        }

        if let Some(session) = self.sessions.get_mut(id) {
            session.accept_password();
        }
        out.send_reply(id, &self.notice(id, "Password accepted"));
        self.complete_registration(id, out);
    }

    pub(super) fn handle_nick(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(nick) = args.next_param() else {
            out.send_reply(id, &self.numeric(id, Numeric::NoNicknameGiven));
            return;
        };

        match self.sessions.find_by_nick(nick) {
            Some(owner) if owner == id => return,
            Some(_) => {
                out.send_reply(id, &self.numeric(id, Numeric::NicknameInUse).param(nick));
                return;
            }
            None => {}
        }
        if let Err(reason) = validate_nickname(nick) {
            debug!(session = %id, nick = %nick, reason, "Rejected nickname");
            out.send_reply(id, &self.numeric(id, Numeric::ErroneousNickname).param(nick));
            return;
        }

        let Some(session) = self.sessions.get(id) else {
            return;
        };
        let registered = session.is_registered();
        let old_mask = session.mask();

        if let Err(e) = self.sessions.set_nickname(id, nick) {
            warn!(session = %id, error = %e, "Nickname change failed");
            return;
        }

        if registered {
            let mut audience = self.channels.rename(id, nick);
            audience.insert(id);
            out.broadcast(audience, &Reply::from_source(&old_mask, "NICK").trailing(nick));
            info!(session = %id, from = %old_mask, to = %nick, "Nickname changed");
        } else {
            out.send_reply(id, &self.notice(id, format!("Nickname set to {nick}")));
            self.complete_registration(id, out);
        }
    }

    pub(super) fn handle_user(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(session) = self.sessions.get(id) else {
            return;
        };
        if session.is_registered() || session.profile().is_some() {
            out.send_reply(id, &self.numeric(id, Numeric::AlreadyRegistered));
            return;
        }

        let username = args.next_word();
        let hostname = args.next_word();
        let servername = args.next_word();
        let realname = args.trailing().filter(|r| !r.is_empty());
        let (Some(username), Some(hostname), Some(servername), Some(realname)) =
            (username, hostname, servername, realname)
        else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("USER"));
            return;
        };

        let profile = Profile {
            username: username.to_string(),
            hostname: hostname.to_string(),
            servername: servername.to_string(),
            realname: realname.to_string(),
        };
        if let Some(session) = self.sessions.get_mut(id) {
            session.set_profile(profile);
        }
        out.send_reply(id, &self.notice(id, format!("Username set to {username}")));
        self.complete_registration(id, out);
    }

    /// Flip the session to registered once every handshake step is done,
    /// sending the welcome exactly once.
    fn complete_registration(&mut self, id: SessionId, out: &mut Outbox) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        if !session.try_register() {
            return;
        }

        let mask = session.mask();
        let server = &self.config.server_name;
        let welcome = Reply::numeric(server, Numeric::Welcome, session.nick_or_star())
            .trailing(format!("Welcome to {server}, {mask}"));
        out.send_reply(id, &welcome);
        info!(session = %id, mask = %mask, "Registered");
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;

    fn welcomes(out: &crate::Outbox, id: crate::SessionId) -> usize {
        lines_with(out, id, "001").len()
    }

    #[test]
    fn test_registration_scenario() {
        let mut hub = hub();
        let a = connect(&mut hub);

        let out = send(&mut hub, a, "PASS secret");
        assert_eq!(out.lines_for(a), vec![":parley NOTICE * :Password accepted"]);

        let out = send(&mut hub, a, "NICK bob");
        assert_eq!(out.lines_for(a), vec![":parley NOTICE bob :Nickname set to bob"]);

        let out = send(&mut hub, a, "USER bob host srv :Bob Real");
        assert_eq!(
            out.lines_for(a),
            vec![
                ":parley NOTICE bob :Username set to bob",
                ":parley 001 bob :Welcome to parley, bob!bob@127.0.0.1",
            ]
        );

        let session = hub.sessions().get(a).unwrap();
        assert!(session.is_registered());
        assert_eq!(session.profile().unwrap().realname, "Bob Real");
    }

    #[test]
    fn test_any_order_registers_once() {
        let orders: [[&str; 3]; 6] = [
            ["PASS secret", "NICK bob", "USER bob h s :B"],
            ["PASS secret", "USER bob h s :B", "NICK bob"],
            ["NICK bob", "PASS secret", "USER bob h s :B"],
            ["NICK bob", "USER bob h s :B", "PASS secret"],
            ["USER bob h s :B", "PASS secret", "NICK bob"],
            ["USER bob h s :B", "NICK bob", "PASS secret"],
        ];

        for order in orders {
            let mut hub = hub();
            let a = connect(&mut hub);
            let mut total = 0;
            for (step, line) in order.iter().enumerate() {
                let out = send(&mut hub, a, line);
                total += welcomes(&out, a);
                assert_eq!(hub.sessions().get(a).unwrap().is_registered(), step == 2);
            }
            assert_eq!(total, 1, "order {order:?}");

            // Further handshake attempts never re-welcome.
            for line in ["PASS secret", "USER bob h s :B", "NICK bob"] {
                assert_eq!(welcomes(&send(&mut hub, a, line), a), 0);
            }
        }
    }

    #[test]
    fn test_reregistration_rejected() {
        let mut hub = hub();
        let a = register(&mut hub, "bob");

        let out = send(&mut hub, a, "PASS secret");
        assert_eq!(out.lines_for(a), vec![":parley 462 bob :You may not reregister"]);

        let out = send(&mut hub, a, "USER other h s :Other");
        assert_eq!(out.lines_for(a), vec![":parley 462 bob :You may not reregister"]);
        assert_eq!(hub.sessions().get(a).unwrap().profile().unwrap().username, "bob");
    }

    #[test]
    fn test_pass_twice_before_registration() {
        let mut hub = hub();
        let a = connect(&mut hub);
        send(&mut hub, a, "PASS secret");
        let out = send(&mut hub, a, "PASS secret");
        assert_eq!(lines_with(&out, a, "462").len(), 1);
    }

    #[test]
    fn test_pass_missing_argument() {
        let mut hub = hub();
        let a = connect(&mut hub);
        let out = send(&mut hub, a, "PASS");
        assert_eq!(out.lines_for(a), vec![":parley 461 * PASS :Not enough parameters"]);
        assert!(!hub.sessions().get(a).unwrap().password_accepted());
    }

    #[test]
    fn test_wrong_password_disconnects() {
        let mut hub = hub();
        let a = connect(&mut hub);
        let out = hub.receive(a, b"PASS nope\r\nNICK bob\r\n");

        assert_eq!(out.lines_for(a), vec![":parley 464 * :Password incorrect"]);
        assert_eq!(out.closed(), &[a]);
        assert!(!hub.sessions().contains(a));
        assert!(hub.sessions().find_by_nick("bob").is_none());
    }

    #[test]
    fn test_nick_errors() {
        let mut hub = hub();
        let a = connect(&mut hub);

        let out = send(&mut hub, a, "NICK");
        assert_eq!(out.lines_for(a), vec![":parley 431 * :No nickname given"]);

        let out = send(&mut hub, a, "NICK 9lives");
        assert_eq!(out.lines_for(a), vec![":parley 432 * 9lives :Erroneous nickname"]);

        let out = send(&mut hub, a, "NICK bad.name");
        assert_eq!(lines_with(&out, a, "432").len(), 1);
        assert!(hub.sessions().get(a).unwrap().nickname().is_none());
    }

    #[test]
    fn test_nickname_in_use() {
        let mut hub = hub();
        let bob = register(&mut hub, "bob");
        let other = connect(&mut hub);

        let out = send(&mut hub, other, "NICK bob");
        assert_eq!(
            out.lines_for(other),
            vec![":parley 433 * bob :Nickname is already in use"]
        );
        assert!(hub.sessions().get(other).unwrap().nickname().is_none());
        assert_eq!(hub.sessions().find_by_nick("bob"), Some(bob));
    }

    #[test]
    fn test_own_nickname_is_noop() {
        let mut hub = hub();
        let a = register(&mut hub, "bob");
        assert!(send(&mut hub, a, "NICK bob").is_empty());
    }

    #[test]
    fn test_nick_with_colon_prefix() {
        let mut hub = hub();
        let a = connect(&mut hub);
        send(&mut hub, a, "NICK :bob");
        assert_eq!(hub.sessions().get(a).unwrap().nickname(), Some("bob"));
    }

    #[test]
    fn test_user_missing_fields() {
        let mut hub = hub();
        let a = connect(&mut hub);

        for line in ["USER", "USER bob", "USER bob host srv", "USER bob host srv :"] {
            let out = send(&mut hub, a, line);
            assert_eq!(out.lines_for(a), vec![":parley 461 * USER :Not enough parameters"]);
        }
        assert!(hub.sessions().get(a).unwrap().profile().is_none());
    }

    #[test]
    fn test_nick_change_after_registration() {
        let mut hub = hub();
        let bob = register(&mut hub, "bob");
        let alice = register(&mut hub, "alice");
        let carol = register(&mut hub, "carol");
        send(&mut hub, bob, "JOIN #a,#b");
        send(&mut hub, alice, "JOIN #a,#b");
        send(&mut hub, carol, "JOIN #c");

        let out = send(&mut hub, bob, "NICK robert");
        let expected = vec![":bob!bob@127.0.0.1 NICK :robert"];
        assert_eq!(out.lines_for(bob), expected);
        assert_eq!(out.lines_for(alice), expected);
        assert!(out.lines_for(carol).is_empty());

        assert_eq!(hub.sessions().find_by_nick("robert"), Some(bob));
        assert!(hub.sessions().find_by_nick("bob").is_none());
        let channel = hub.channels().get("#a").unwrap();
        assert_eq!(channel.member_by_nick("robert").unwrap().session, bob);

        // The old nickname is free again.
        let dave = connect(&mut hub);
        send(&mut hub, dave, "NICK bob");
        assert_eq!(hub.sessions().find_by_nick("bob"), Some(dave));
    }

    #[test]
    fn test_nick_change_outside_channels_echoes_to_self() {
        let mut hub = hub();
        let bob = register(&mut hub, "bob");
        let out = send(&mut hub, bob, "NICK robert");
        assert_eq!(out.lines_for(bob), vec![":bob!bob@127.0.0.1 NICK :robert"]);
    }
}
