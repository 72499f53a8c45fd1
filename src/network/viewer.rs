//! Viewer Streams
//!
//! One long-lived pump per connected viewer: register with the broker,
//! send the current state, then forward pushes until the connection's
//! cancellation fires.

use std::future::Future;

use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tracing::debug;

use crate::game::state::PlayerId;
use crate::network::broker::Subscription;
use crate::network::hub::GameHub;

/// Why a viewer stream ended early.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// The outbound sink rejected a frame.
    #[error("viewer sink closed: {0}")]
    SinkClosed(String),
}

/// How a viewer stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerExit {
    /// The cancellation future fired.
    Cancelled,
    /// The broker closed the queue.
    QueueClosed,
}

/// Stream frames to one viewer until `cancel` resolves.
///
/// Registration happens before the snapshot is rendered, so anything
/// published after the snapshot is queued. The viewer is unregistered on
/// every exit path.
pub async fn pump_viewer<S, C>(
    hub: &GameHub,
    viewer: Option<PlayerId>,
    sink: S,
    cancel: C,
) -> Result<ViewerExit, ViewerError>
where
    S: Sink<String>,
    S::Error: std::fmt::Display,
    C: Future<Output = ()>,
{
    let mut subscription = hub.broadcaster().register(hub.subscriber_queue()).await;
    let id = subscription.id();
    debug!(subscriber = %id, viewer = ?viewer, "viewer stream opened");

    let result = forward(hub, viewer, &mut subscription, sink, cancel).await;

    hub.broadcaster().unregister(subscription).await;
    debug!(subscriber = %id, ?result, "viewer stream closed");
    result
}

async fn forward<S, C>(
    hub: &GameHub,
    viewer: Option<PlayerId>,
    subscription: &mut Subscription,
    sink: S,
    cancel: C,
) -> Result<ViewerExit, ViewerError>
where
    S: Sink<String>,
    S::Error: std::fmt::Display,
    C: Future<Output = ()>,
{
    let mut sink = std::pin::pin!(sink);
    let mut cancel = std::pin::pin!(cancel);

    for frame in hub.snapshot_frames(viewer).await {
        tokio::select! {
            _ = &mut cancel => return Ok(ViewerExit::Cancelled),
            sent = sink.send(frame) => sent.map_err(sink_closed)?,
        }
    }

    loop {
        let frame = tokio::select! {
            _ = &mut cancel => return Ok(ViewerExit::Cancelled),
            frame = subscription.recv() => match frame {
                Some(frame) => frame,
                None => return Ok(ViewerExit::QueueClosed),
            },
        };
        // A stalled sink must not outlive the connection
        tokio::select! {
            _ = &mut cancel => return Ok(ViewerExit::Cancelled),
            sent = sink.send(frame) => sent.map_err(sink_closed)?,
        }
    }
}

fn sink_closed(e: impl std::fmt::Display) -> ViewerError {
    ViewerError::SinkClosed(e.to_string())
}
