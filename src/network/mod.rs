//! Network Layer
//!
//! Live views for connected viewers and the WebSocket front-end.
//! Game rules live in `game/`; this layer sequences, renders and fans out.

pub mod broker;
pub mod hub;
pub mod protocol;
pub mod render;
pub mod server;
pub mod viewer;

pub use broker::{Broadcaster, PublishReport, SubscriberId, Subscription};
pub use hub::{GameHub, RollResult};
pub use protocol::{encode_event, ClientMessage, ErrorCode, ServerReply};
pub use render::{JsonRenderer, Renderer, View, ViewSnapshot};
pub use server::{GameServer, GameServerError};
pub use viewer::{pump_viewer, ViewerError, ViewerExit};
