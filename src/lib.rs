//! # Portals Game Server
//!
//! Live multiplayer portals-and-ladders board game. Players roll a die,
//! walk a serpentine board, and jump through portals; every connected
//! viewer sees each change as it happens.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PORTALS SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs       - Environment configuration                 │
//! │                                                              │
//! │  core/           - Primitives                                │
//! │  └── rng.rs      - Seedable Xorshift128+, dice, cell colors  │
//! │                                                              │
//! │  game/           - Game rules (no I/O)                       │
//! │  ├── board.rs    - Numbered grid and portals                 │
//! │  ├── state.rs    - Player registry and movement              │
//! │  └── events.rs   - Ring buffer of recent events              │
//! │                                                              │
//! │  network/        - Live views and front-end                  │
//! │  ├── protocol.rs - Push frame encoding, client messages      │
//! │  ├── broker.rs   - Non-blocking fan-out to viewers           │
//! │  ├── render.rs   - View fragments                            │
//! │  ├── hub.rs      - Command sequencing                        │
//! │  ├── viewer.rs   - Per-viewer stream pump                    │
//! │  └── server.rs   - WebSocket server                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//!
//! Game state, the event log and the viewer set each sit behind their own
//! lock. A command takes them one after another, never nested, and nothing
//! is rendered or written to a socket while any of them is held. A slow
//! viewer loses frames instead of stalling the game.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, GameConfig, ServerConfig};
pub use core::rng::{Dice, RandomSource, XorShiftRng};
pub use game::board::{Board, Position};
pub use game::events::{EventLog, LogKind, StreamLog};
pub use game::state::{GameError, GameState, MoveOutcome, Player, PlayerId, SharedGame};
pub use network::{Broadcaster, GameHub, GameServer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
