//! # parley-core
//!
//! Sessions, channels and command handling for the Parley chat server.
//!
//! This crate provides the state layer, with no I/O of its own:
//!
//! - **Session** - Per-connection registration state and the nickname index
//! - **Channel** - Membership, operators and access controls
//! - **Directory** - Lazily created channels and the join/leave rules
//! - **Hub** - Command dispatch over both registries
//! - **Delivery** - Lines addressed to sessions, produced by the hub
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Event loop  │────▶│     Hub     │────▶│  Directory  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │
//!        │                   ▼                   ▼
//!        │            ┌─────────────┐     ┌─────────────┐
//!        └────────────│   Outbox    │     │   Channel   │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use parley_core::{Hub, HubConfig};
//!
//! let mut hub = Hub::new(HubConfig::new("secret"));
//! let (id, _greeting) = hub.connect("127.0.0.1");
//!
//! let out = hub.receive(id, b"PASS secret\r\nNICK bob\r\nUSER bob h s :Bob\r\n");
//! assert!(hub.sessions().get(id).unwrap().is_registered());
//! assert!(out.lines_for(id).iter().any(|l| l.contains(" 001 bob ")));
//! ```

pub mod channel;
pub mod delivery;
pub mod directory;
pub mod hub;
pub mod session;

pub use channel::{Channel, ChannelName, Member};
pub use delivery::{Delivery, Outbox};
pub use directory::{ChannelDirectory, ChannelError, DirectoryConfig};
pub use hub::{Hub, HubConfig, HubStats, GREETING_LINES};
pub use session::{Session, SessionError, SessionId, SessionRegistry};
