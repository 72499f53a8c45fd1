//! Game Logic Module
//!
//! Board, players and the event feed. Nothing here touches the network.
//!
//! ## Module Structure
//!
//! - `board`: Numbered grid, portals, cell colors
//! - `state`: Player registry, movement, shared game handle
//! - `events`: Bounded log of recent events

pub mod board;
pub mod state;
pub mod events;

// Re-export key types
pub use board::{Board, Cell, PortalPair, Position};
pub use state::{GameError, GameSnapshot, GameState, MoveOutcome, Player, PlayerId, SharedGame};
pub use events::{EventLog, LogKind, RingBuffer, StreamLog};
