//! Game Hub
//!
//! The request-handling layer. Every command runs as three independent
//! steps: mutate the game, push a log entry, publish fresh views. Each step
//! takes and releases its own lock, so at most one lock is held at a time
//! and rendering never happens under the game lock.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{ConfigError, GameConfig};
use crate::core::rng::{Dice, XorShiftRng};
use crate::game::board::Board;
use crate::game::events::{EventLog, LogKind, StreamLog};
use crate::game::state::{GameError, GameState, MoveOutcome, Player, PlayerId, SharedGame};
use crate::network::broker::Broadcaster;
use crate::network::protocol::encode_event;
use crate::network::render::{JsonRenderer, Renderer, View, ViewSnapshot};

/// Result of a dice roll command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollResult {
    /// Face rolled.
    pub roll: u32,
    /// What the move did.
    pub outcome: MoveOutcome,
}

/// Shared context for all connections.
pub struct GameHub {
    game: SharedGame,
    logs: EventLog,
    broadcaster: Broadcaster,
    dice: Mutex<Dice>,
    renderer: Arc<dyn Renderer>,
    subscriber_queue: usize,
}

impl GameHub {
    /// Build everything from configuration, in order: board, game state,
    /// event log, broker.
    pub fn from_config(config: &GameConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut rng = XorShiftRng::from_seed_or_clock(config.rng_seed);
        let board = Board::new(
            config.board_dim,
            config.max_portals,
            &config.default_cell_color,
            &mut rng,
        )?;
        let state = GameState::new(board, config.max_players);
        let dice = Dice::new(config.dice_min, config.dice_max, Box::new(rng));

        Ok(Self::new(
            state,
            EventLog::new(config.max_logs),
            Broadcaster::new(),
            dice,
            Arc::new(JsonRenderer),
        )
        .with_subscriber_queue(config.subscriber_queue))
    }

    /// Assemble a hub from prepared parts.
    pub fn new(
        state: GameState,
        logs: EventLog,
        broadcaster: Broadcaster,
        dice: Dice,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            game: SharedGame::new(state),
            logs,
            broadcaster,
            dice: Mutex::new(dice),
            renderer,
            subscriber_queue: 8,
        }
    }

    /// Set the per-viewer queue capacity.
    pub fn with_subscriber_queue(mut self, capacity: usize) -> Self {
        self.subscriber_queue = capacity.max(1);
        self
    }

    /// The shared game.
    pub fn game(&self) -> &SharedGame {
        &self.game
    }

    /// The event log.
    pub fn logs(&self) -> &EventLog {
        &self.logs
    }

    /// The broker.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Per-viewer queue capacity.
    pub fn subscriber_queue(&self) -> usize {
        self.subscriber_queue
    }

    /// Join the game under `name`.
    pub async fn join(&self, id: &PlayerId, name: &str) -> Result<(), GameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::InvalidName);
        }

        self.game.join(id.clone(), name).await?;
        info!(player = %id, name, "player joined");

        self.logs
            .push(StreamLog::now(LogKind::Join, format!("{name} has joined the game")))
            .await;
        self.publish_all(None).await;
        Ok(())
    }

    /// Leave the game. Returns the player's name.
    pub async fn leave(&self, id: &PlayerId) -> Result<String, GameError> {
        let name = self.game.leave(id).await?;
        info!(player = %id, name = %name, "player left");

        self.logs
            .push(StreamLog::now(LogKind::Leave, format!("{name} has left the game")))
            .await;
        self.publish_all(None).await;
        Ok(name)
    }

    /// Roll the die and move.
    pub async fn roll(&self, id: &PlayerId) -> Result<RollResult, GameError> {
        let roll = self.dice.lock().await.roll();
        let outcome = self.game.roll(id, roll).await?;
        let name = &outcome.player.name;
        debug!(player = %id, roll, cell = outcome.cell_value, "rolled");

        let (kind, message) = if !outcome.moved {
            (LogKind::Move, format!("{name} rolled {roll} and stays on {}", outcome.cell_value))
        } else if outcome.teleported {
            (LogKind::Teleported, format!("{name} has teleported to {}", outcome.cell_value))
        } else {
            (LogKind::Move, format!("{name} has moved to {}", outcome.cell_value))
        };
        self.logs.push(StreamLog::now(kind, message)).await;

        if outcome.completed {
            let secs = outcome
                .player
                .timer
                .elapsed()
                .map(|d| d.num_milliseconds() as f64 / 1000.0)
                .unwrap_or_default();
            info!(player = %id, secs, "player completed");
            self.logs
                .push(StreamLog::now(
                    LogKind::Completed,
                    format!("{name} has completed the game in {secs:.1}s"),
                ))
                .await;
        }

        self.publish_all(Some(roll)).await;
        Ok(RollResult { roll, outcome })
    }

    /// Players ordered by rank.
    pub async fn current_players(&self) -> Vec<Player> {
        self.game.current_players().await
    }

    /// Log entries, newest first.
    pub async fn current_logs(&self) -> Vec<StreamLog> {
        self.logs.latest().await
    }

    /// Gather a snapshot, one lock at a time.
    pub async fn view_snapshot(
        &self,
        viewer: Option<PlayerId>,
        just_rolled: Option<u32>,
    ) -> ViewSnapshot {
        let game = self.game.snapshot().await;
        let logs = self.logs.latest().await;
        ViewSnapshot {
            game,
            logs,
            viewer,
            just_rolled,
        }
    }

    /// Encoded frames of every view, for a viewer that just connected.
    pub async fn snapshot_frames(&self, viewer: Option<PlayerId>) -> Vec<String> {
        let snapshot = self.view_snapshot(viewer, None).await;
        View::SNAPSHOT_ORDER
            .iter()
            .map(|view| encode_event(view.event_name(), &self.renderer.render(*view, &snapshot)))
            .collect()
    }

    /// Render and publish every view.
    pub async fn publish_all(&self, just_rolled: Option<u32>) {
        let snapshot = self.view_snapshot(None, just_rolled).await;
        for view in View::UPDATE_ORDER {
            let payload = self.renderer.render(view, &snapshot);
            self.broadcaster.publish(view.event_name(), &payload).await;
        }
    }
}

impl std::fmt::Debug for GameHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameHub")
            .field("subscriber_queue", &self.subscriber_queue)
            .finish_non_exhaustive()
    }
}
