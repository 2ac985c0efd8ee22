//! Channel commands: `JOIN`, `PART`, `KICK`, `INVITE`, `TOPIC` and `MODE`.
//!
//! Each handler validates completely before touching the directory, so a
//! refused command leaves every channel as it was.

use super::Hub;
use crate::channel::ModeError;
use crate::delivery::Outbox;
use crate::directory::Joined;
use crate::session::SessionId;
use parley_protocol::{Args, Numeric, Reply};
use tracing::{debug, info, warn};

impl Hub {
    pub(super) fn handle_join(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(list) = args.next_word() else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("JOIN"));
            return;
        };
        let keys: Vec<&str> = args
            .next_word()
            .map(|keys| keys.split(',').collect())
            .unwrap_or_default();
        let nick = self.nick_or_star(id).to_string();

        for (index, name) in list.split(',').enumerate() {
            let key = keys.get(index).copied().filter(|k| !k.is_empty());
            match self.channels.join(id, &nick, name, key) {
                Ok(joined) => self.announce_join(id, name, joined, out),
                Err(e) => {
                    debug!(session = %id, error = %e, "Join refused");
                    out.send_reply(id, &self.channel_error(id, &e));
                }
            }
        }
    }

    fn announce_join(&self, id: SessionId, name: &str, joined: Joined, out: &mut Outbox) {
        let Some(channel) = self.channels.get(name) else {
            return;
        };

        out.broadcast(
            channel.member_ids(),
            &Reply::from_source(&self.mask(id), "JOIN").param(name),
        );
        out.send_reply(id, &self.topic_reply(id, name, channel.topic()));
        out.send_reply(
            id,
            &self
                .numeric(id, Numeric::NamReply)
                .param("=")
                .param(name)
                .trailing(channel.names().join(" ")),
        );
        out.send_reply(id, &self.numeric(id, Numeric::EndOfNames).param(name));

        let limit = match channel.user_limit() {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        };
        out.send_reply(
            id,
            &self.notice(id, format!("Users: {}/{}", channel.member_count(), limit)),
        );
        if joined.operator {
            out.send_reply(id, &self.notice(id, "You have channel operator privileges"));
        }

        info!(
            session = %id,
            channel = %name,
            created = joined.created,
            operator = joined.operator,
            "Joined channel"
        );
    }

    fn topic_reply(&self, id: SessionId, name: &str, topic: Option<&str>) -> Reply {
        match topic {
            Some(topic) => self.numeric(id, Numeric::Topic).param(name).trailing(topic),
            None => self.numeric(id, Numeric::NoTopic).param(name),
        }
    }

    pub(super) fn handle_part(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(list) = args.next_word() else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("PART"));
            return;
        };
        let reason = args.trailing().filter(|r| !r.is_empty());
        let mask = self.mask(id);

        for name in list.split(',') {
            let Some(channel) = self.channels.get(name) else {
                out.send_reply(id, &self.numeric(id, Numeric::NoSuchChannel).param(name));
                continue;
            };
            if !channel.is_member(id) {
                out.send_reply(id, &self.numeric(id, Numeric::NotOnChannel).param(name));
                continue;
            }

            let mut part = Reply::from_source(&mask, "PART").param(name);
            if let Some(reason) = reason {
                part = part.trailing(reason);
            }
            out.broadcast(channel.member_ids(), &part);

            if let Err(e) = self.channels.leave(id, name) {
                warn!(session = %id, error = %e, "Part failed");
            }
        }
    }

    pub(super) fn handle_kick(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let (Some(name), Some(target_nick)) = (args.next_word(), args.next_word()) else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("KICK"));
            return;
        };
        let reason = args.trailing().filter(|r| !r.is_empty());

        let Some(channel) = self.channels.get(name) else {
            out.send_reply(id, &self.numeric(id, Numeric::NoSuchChannel).param(name));
            return;
        };
        let Some(target) = channel.member_by_nick(target_nick).map(|m| m.session) else {
            out.send_reply(
                id,
                &self
                    .numeric(id, Numeric::UserNotInChannel)
                    .param(target_nick)
                    .param(name),
            );
            return;
        };
        if !self.sessions.contains(target) {
            out.send_reply(id, &self.numeric(id, Numeric::NoSuchNick).param(target_nick));
            return;
        }
        if !channel.is_operator(id) {
            out.send_reply(id, &self.numeric(id, Numeric::ChanOpPrivsNeeded).param(name));
            return;
        }

        let mut kick = Reply::from_source(&self.mask(id), "KICK")
            .param(name)
            .param(target_nick);
        if let Some(reason) = reason {
            kick = kick.trailing(reason);
        }

        match self.channels.leave(target, name) {
            Ok(departure) => {
                out.broadcast(departure.remaining, &kick);
                out.send_reply(target, &kick);
                info!(session = %id, target = %target, channel = %name, "Kicked");
            }
            Err(e) => warn!(session = %id, error = %e, "Kick failed"),
        }
    }

    pub(super) fn handle_invite(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let (Some(target_nick), Some(name)) = (args.next_word(), args.next_word()) else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("INVITE"));
            return;
        };

        let Some(channel) = self.channels.get(name) else {
            out.send_reply(id, &self.numeric(id, Numeric::NoSuchChannel).param(name));
            return;
        };
        if !channel.is_operator(id) {
            out.send_reply(id, &self.numeric(id, Numeric::ChanOpPrivsNeeded).param(name));
            return;
        }
        let Some(target) = self.sessions.find_by_nick(target_nick) else {
            out.send_reply(id, &self.numeric(id, Numeric::NoSuchNick).param(target_nick));
            return;
        };
        let on_channel = self
            .numeric(id, Numeric::UserOnChannel)
            .param(target_nick)
            .param(name);
        if channel.is_member(target) {
            out.send_reply(id, &on_channel);
            return;
        }
        if channel.is_invited(target) {
            out.send_reply(id, &on_channel.trailing("is already invited"));
            return;
        }

        if let Some(channel) = self.channels.get_mut(name) {
            channel.invite(target);
        }
        out.send_reply(
            target,
            &Reply::from_source(&self.mask(id), "INVITE")
                .param(target_nick)
                .trailing(name),
        );
        out.send_reply(
            id,
            &self
                .numeric(id, Numeric::Inviting)
                .param(target_nick)
                .param(name),
        );
        info!(session = %id, target = %target, channel = %name, "Invited");
    }

    pub(super) fn handle_topic(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(name) = args.next_word() else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("TOPIC"));
            return;
        };
        let Some(channel) = self.channels.get(name) else {
            out.send_reply(id, &self.numeric(id, Numeric::NoSuchChannel).param(name));
            return;
        };
        if !channel.is_member(id) {
            out.send_reply(id, &self.numeric(id, Numeric::NotOnChannel).param(name));
            return;
        }

        let Some(topic) = args.trailing() else {
            out.send_reply(id, &self.topic_reply(id, name, channel.topic()));
            return;
        };
        if channel.is_topic_locked() && !channel.is_operator(id) {
            out.send_reply(id, &self.numeric(id, Numeric::ChanOpPrivsNeeded).param(name));
            return;
        }

        let line = Reply::from_source(&self.mask(id), "TOPIC")
            .param(name)
            .trailing(topic);
        out.broadcast(channel.member_ids(), &line);
        if let Some(channel) = self.channels.get_mut(name) {
            channel.set_topic(Some(topic));
        }
        debug!(session = %id, channel = %name, "Topic changed");
    }

    pub(super) fn handle_mode(&mut self, id: SessionId, mut args: Args<'_>, out: &mut Outbox) {
        let Some(name) = args.next_word() else {
            out.send_reply(id, &self.numeric(id, Numeric::NeedMoreParams).param("MODE"));
            return;
        };
        let Some(channel) = self.channels.get(name) else {
            out.send_reply(id, &self.numeric(id, Numeric::NoSuchChannel).param(name));
            return;
        };
        if !channel.is_member(id) {
            out.send_reply(id, &self.numeric(id, Numeric::NotOnChannel).param(name));
            return;
        }

        let Some(modes) = args.next_word() else {
            let (modes, mode_args) = channel.mode_string();
            let reply = mode_args.into_iter().fold(
                self.numeric(id, Numeric::ChannelModeIs).param(name).param(modes),
                |reply, arg| reply.param(arg),
            );
            out.send_reply(id, &reply);
            return;
        };
        if !channel.is_operator(id) {
            out.send_reply(id, &self.numeric(id, Numeric::ChanOpPrivsNeeded).param(name));
            return;
        }

        let Some(channel) = self.channels.get_mut(name) else {
            return;
        };
        let mut mode_args = std::iter::from_fn(|| args.next_word());
        let change = channel.apply_modes(modes, &mut mode_args);
        let members = channel.member_ids();

        for error in &change.errors {
            let reply = match error {
                ModeError::MissingArgument(_) => {
                    self.numeric(id, Numeric::NeedMoreParams).param("MODE")
                }
                ModeError::UnknownMode(mode) => {
                    self.numeric(id, Numeric::UnknownMode).param(mode.to_string())
                }
                ModeError::NotOnChannel(nick) => self
                    .numeric(id, Numeric::UserNotInChannel)
                    .param(nick)
                    .param(name),
            };
            out.send_reply(id, &reply);
        }

        if !change.is_empty() {
            let line = change.args.iter().fold(
                Reply::from_source(&self.mask(id), "MODE")
                    .param(name)
                    .param(&change.applied),
                |reply, arg| reply.param(arg),
            );
            out.broadcast(members, &line);
        }
    }
}
