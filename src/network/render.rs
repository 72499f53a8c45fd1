//! View Rendering
//!
//! Turns a snapshot of the game into the text fragments viewers replace
//! in place. The broker treats the result as an opaque payload.

use serde::Serialize;
use serde_json::json;

use crate::game::events::StreamLog;
use crate::game::state::{GameSnapshot, PlayerId};

/// Independently replaceable views, one per push event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum View {
    /// The grid with portals and occupants.
    Board,
    /// Player list.
    Players,
    /// Dice panel.
    Dice,
    /// Player tokens and their cells.
    Tokens,
    /// Event log feed.
    Stream,
}

impl View {
    /// Order for a freshly connected viewer.
    pub const SNAPSHOT_ORDER: [View; 5] =
        [View::Board, View::Players, View::Dice, View::Tokens, View::Stream];

    /// Order after a game mutation.
    pub const UPDATE_ORDER: [View; 5] =
        [View::Players, View::Board, View::Dice, View::Tokens, View::Stream];

    /// Push event name.
    pub fn event_name(self) -> &'static str {
        match self {
            View::Board => "board",
            View::Players => "players",
            View::Dice => "dice",
            View::Tokens => "tokens",
            View::Stream => "stream",
        }
    }
}

/// Everything a renderer may show.
#[derive(Clone, Debug)]
pub struct ViewSnapshot {
    /// Board and players.
    pub game: GameSnapshot,
    /// Log entries, newest first.
    pub logs: Vec<StreamLog>,
    /// Player the view is rendered for, if any.
    pub viewer: Option<PlayerId>,
    /// Face just rolled, if this render follows a roll.
    pub just_rolled: Option<u32>,
}

/// Produces view fragments.
pub trait Renderer: Send + Sync {
    /// Render one view.
    fn render(&self, view: View, snapshot: &ViewSnapshot) -> String;
}

/// Renders each view as pretty-printed JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRenderer;

#[derive(Serialize)]
struct TokenView<'a> {
    id: &'a PlayerId,
    name: &'a str,
    row: usize,
    col: usize,
    cell_value: Option<u32>,
}

impl Renderer for JsonRenderer {
    fn render(&self, view: View, snapshot: &ViewSnapshot) -> String {
        let game = &snapshot.game;
        let value = match view {
            View::Board => json!({
                "size": game.size,
                "last_cell_value": game.last_cell_value,
                "cells": game.cells,
            }),
            View::Players => json!({ "players": game.players }),
            View::Dice => json!({
                "me": snapshot.viewer,
                "joined": snapshot
                    .viewer
                    .as_ref()
                    .map(|me| game.players.iter().any(|p| &p.id == me))
                    .unwrap_or(false),
                "just_rolled": snapshot.just_rolled,
            }),
            View::Tokens => {
                let tokens: Vec<TokenView> = game
                    .players
                    .iter()
                    .map(|p| TokenView {
                        id: &p.id,
                        name: &p.name,
                        row: p.position.row,
                        col: p.position.col,
                        cell_value: game.value_at(p.position),
                    })
                    .collect();
                json!({ "tokens": tokens })
            }
            View::Stream => json!({ "logs": snapshot.logs }),
        };

        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}
