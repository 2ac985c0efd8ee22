//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat server.
//!
//! Parley speaks a small subset of the IRC line protocol. This crate owns
//! everything that is about bytes and text on the wire, and nothing about
//! server state:
//!
//! - `LineCodec` - CRLF line framing with a bounded accumulator
//! - `CommandLine` - Verb lookup against the closed `CommandKind` table
//! - `Reply` / `Numeric` - Outgoing line formatting
//! - `names` - Nickname and channel-name grammar
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use parley_protocol::{CommandKind, CommandLine, LineCodec};
//! use tokio_util::codec::Decoder;
//!
//! let mut codec = LineCodec::new();
//! let mut buf = BytesMut::from(&b"JOIN #rust\r\nPRIV"[..]);
//!
//! let line = codec.decode(&mut buf).unwrap().unwrap();
//! let command = CommandLine::parse(&line).unwrap().unwrap();
//! assert_eq!(command.kind, CommandKind::Join);
//!
//! // The unterminated tail stays buffered.
//! assert!(codec.decode(&mut buf).unwrap().is_none());
//! assert_eq!(&buf[..], b"PRIV");
//! ```

pub mod command;
pub mod line;
pub mod names;
pub mod reply;

pub use command::{Args, CommandKind, CommandLine, ParseError};
pub use line::{LineCodec, ProtocolError, DEFAULT_MAX_LINE_LENGTH};
pub use names::{is_channel_target, validate_channel_name, validate_nickname, CHANNEL_SIGIL};
pub use reply::{Numeric, Reply};
