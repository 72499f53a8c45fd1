//! Game State Definitions
//!
//! The board, the player registry and the movement rules. [`GameState`]
//! is a plain owned value with `&mut self` operations; [`SharedGame`]
//! puts it behind the single lock every request handler goes through.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::game::board::{Board, Cell, Position};

// =============================================================================
// PLAYER ID
// =============================================================================

/// Opaque per-browser player identifier.
///
/// Supplied by the caller; the game only checks membership.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Wall-clock bracket around a player's run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTimer {
    /// When play started.
    pub started_at: DateTime<Utc>,
    /// When play stopped, if it has.
    pub ended_at: Option<DateTime<Utc>>,
    /// Still running.
    pub active: bool,
}

impl PlayerTimer {
    /// Start a timer now.
    pub fn start_now() -> Self {
        Self {
            started_at: Utc::now(),
            ended_at: None,
            active: true,
        }
    }

    /// Stop the timer. No-op if already stopped.
    pub fn stop_now(&mut self) {
        if !self.active {
            return;
        }
        self.ended_at = Some(Utc::now());
        self.active = false;
    }

    /// Time between start and stop, once stopped.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

/// A player in the game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Identifier.
    pub id: PlayerId,
    /// Display name, set at join.
    pub name: String,
    /// Current cell.
    pub position: Position,
    /// Ordering hint for player lists. Always 0 for now.
    pub rank: u32,
    /// Run timer, stopped at the finish.
    pub timer: PlayerTimer,
}

impl Player {
    fn new(id: PlayerId, name: String, position: Position) -> Self {
        Self {
            id,
            name,
            position,
            rank: 0,
            timer: PlayerTimer::start_now(),
        }
    }
}

// =============================================================================
// ERRORS & OUTCOMES
// =============================================================================

/// Rejected game operations. None of them change state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Join with an id that is already playing.
    #[error("Player already exists")]
    AlreadyJoined(PlayerId),

    /// Operation on an id that is not playing.
    #[error("Player doesn't exist")]
    NotFound(PlayerId),

    /// Roll by a player who already reached the finish.
    #[error("Player has already completed the game")]
    AlreadyCompleted(PlayerId),

    /// Join when the configured player cap is reached.
    #[error("Game is full ({max} players)")]
    GameFull {
        /// Configured cap.
        max: usize,
    },

    /// Zero-step move.
    #[error("Invalid roll: {0}")]
    InvalidRoll(u32),

    /// Empty display name.
    #[error("Name required")]
    InvalidName,
}

/// Result of a move.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    /// Player after the move.
    pub player: Player,
    /// A portal was taken.
    pub teleported: bool,
    /// The player changed cell. False on overshoot.
    pub moved: bool,
    /// The player reached the finish with this move.
    pub completed: bool,
    /// Value of the cell the player is on now.
    pub cell_value: u32,
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Board plus player registry.
#[derive(Clone, Debug)]
pub struct GameState {
    board: Board,
    players: BTreeMap<PlayerId, Player>,
    max_players: Option<usize>,
}

impl GameState {
    /// Create a game on `board` with an optional player cap.
    pub fn new(board: Board, max_players: Option<usize>) -> Self {
        Self {
            board,
            players: BTreeMap::new(),
            max_players,
        }
    }

    /// Get the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Get a player.
    pub fn get_player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Number of registered players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Players ordered by rank, ties broken by id.
    pub fn current_players(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        // BTreeMap order is by id already; stable sort keeps it within a rank
        players.sort_by_key(|p| p.rank);
        players
    }

    /// Add a player at the start cell.
    pub fn add_player(&mut self, id: PlayerId, name: impl Into<String>) -> Result<(), GameError> {
        if self.players.contains_key(&id) {
            return Err(GameError::AlreadyJoined(id));
        }
        if let Some(max) = self.max_players {
            if self.players.len() >= max {
                return Err(GameError::GameFull { max });
            }
        }

        let start = self.board.start();
        let player = Player::new(id.clone(), name.into(), start);
        self.occupy(start, id.clone());
        self.players.insert(id, player);

        Ok(())
    }

    /// Remove a player, returning their name.
    pub fn remove_player(&mut self, id: &PlayerId) -> Result<String, GameError> {
        let position = match self.players.get(id) {
            Some(player) => player.position,
            None => return Err(GameError::NotFound(id.clone())),
        };

        self.vacate(position, id);
        let mut player = self
            .players
            .remove(id)
            .ok_or_else(|| GameError::NotFound(id.clone()))?;
        player.timer.stop_now();

        Ok(player.name)
    }

    /// Advance a player by `steps`.
    ///
    /// Overshooting the finish leaves the player in place and reports
    /// `moved = false`. Landing on a portal source continues to its
    /// destination.
    pub fn move_player(&mut self, steps: u32, id: &PlayerId) -> Result<MoveOutcome, GameError> {
        let player = self
            .players
            .get(id)
            .ok_or_else(|| GameError::NotFound(id.clone()))?;
        if steps == 0 {
            return Err(GameError::InvalidRoll(steps));
        }

        let finish = self.board.finish();
        if player.position == finish {
            return Err(GameError::AlreadyCompleted(id.clone()));
        }

        let from = player.position;
        let current = self.board.value_at(from).unwrap_or(0);
        let last = self.board.last_cell_value();

        let target = current.saturating_add(steps);
        if target > last {
            return Ok(MoveOutcome {
                player: player.clone(),
                teleported: false,
                moved: false,
                completed: false,
                cell_value: current,
            });
        }

        let (dest, teleported) = self
            .board
            .resolve(target)
            .ok_or_else(|| GameError::InvalidRoll(steps))?;
        debug!(
            player = %id, old = current, roll = steps, new = target, teleported,
            "moving player"
        );

        self.vacate(from, id);
        self.occupy(dest, id.clone());

        let completed = dest == finish;
        let player = self
            .players
            .get_mut(id)
            .ok_or_else(|| GameError::NotFound(id.clone()))?;
        player.position = dest;
        if completed {
            player.timer.stop_now();
        }

        Ok(MoveOutcome {
            player: player.clone(),
            teleported,
            moved: true,
            completed,
            cell_value: self.board.value_at(dest).unwrap_or(0),
        })
    }

    /// Owned copy of everything a renderer needs.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            size: self.board.size(),
            last_cell_value: self.board.last_cell_value(),
            cells: self.board.rows().to_vec(),
            players: self.current_players(),
        }
    }

    /// Check the occupancy invariant: every player is listed on exactly the
    /// cell at its position and nowhere else, and no cell lists a stranger.
    pub fn occupancy_consistent(&self) -> bool {
        let mut listed: BTreeMap<&PlayerId, usize> = BTreeMap::new();
        for (row, cells) in self.board.rows().iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                for id in &cell.occupants {
                    match self.players.get(id) {
                        Some(p) if p.position == Position::new(row, col) => {
                            *listed.entry(id).or_default() += 1;
                        }
                        _ => return false,
                    }
                }
            }
        }
        listed.len() == self.players.len() && listed.values().all(|n| *n == 1)
    }

    fn occupy(&mut self, pos: Position, id: PlayerId) {
        if let Some(cell) = self.board.cell_mut(pos) {
            cell.occupants.push(id);
        }
    }

    fn vacate(&mut self, pos: Position, id: &PlayerId) {
        if let Some(cell) = self.board.cell_mut(pos) {
            if let Some(idx) = cell.occupants.iter().position(|o| o == id) {
                cell.occupants.remove(idx);
            }
        }
    }
}

/// Point-in-time copy of the board and players.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Board dimension.
    pub size: usize,
    /// Finish value.
    pub last_cell_value: u32,
    /// Rows of cells, top to bottom.
    pub cells: Vec<Vec<Cell>>,
    /// Players by rank.
    pub players: Vec<Player>,
}

impl GameSnapshot {
    /// Value of the cell at `pos`.
    pub fn value_at(&self, pos: Position) -> Option<u32> {
        self.cells.get(pos.row).and_then(|r| r.get(pos.col)).map(|c| c.value)
    }
}

// =============================================================================
// SHARED GAME
// =============================================================================

/// [`GameState`] behind one mutex.
///
/// Each method locks once, runs a whole operation and releases; no method
/// calls another while holding the lock.
#[derive(Debug)]
pub struct SharedGame {
    inner: Mutex<GameState>,
}

impl SharedGame {
    /// Wrap a game state.
    pub fn new(state: GameState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Join the game.
    pub async fn join(&self, id: PlayerId, name: impl Into<String>) -> Result<(), GameError> {
        self.inner.lock().await.add_player(id, name)
    }

    /// Leave the game, returning the player's name.
    pub async fn leave(&self, id: &PlayerId) -> Result<String, GameError> {
        self.inner.lock().await.remove_player(id)
    }

    /// Move a player by an already-rolled step count.
    pub async fn roll(&self, id: &PlayerId, steps: u32) -> Result<MoveOutcome, GameError> {
        self.inner.lock().await.move_player(steps, id)
    }

    /// Players ordered by rank.
    pub async fn current_players(&self) -> Vec<Player> {
        self.inner.lock().await.current_players()
    }

    /// Copy the board and players.
    pub async fn snapshot(&self) -> GameSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Run a read-only closure against the state.
    pub async fn inspect<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        let state = self.inner.lock().await;
        f(&state)
    }
}

// =============================================================================
// TESTS
// =============================================================================
