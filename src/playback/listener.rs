//! Playback notifications.
//!
//! The controller reports through [`PlaybackListener`]. Consumers that would
//! rather receive values can use [`ChannelListener`], which turns every
//! callback into a [`PlaybackEvent`] on a tokio channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// State transitions reported to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackState {
    Playing,
    Paused,
    Reset,
    Completed,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Playing => "PLAYING",
            PlaybackState::Paused => "PAUSED",
            PlaybackState::Reset => "RESET",
            PlaybackState::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// Receives playback updates. Position callbacks arrive on the ticker thread
/// and completion on the engine thread, so implementations must be thread safe.
pub trait PlaybackListener: Send + Sync {
    fn on_state_changed(&self, _state: PlaybackState) {}

    fn on_position_changed(&self, _position_ms: u64) {}

    fn on_duration_changed(&self, _duration_ms: u64) {}

    fn on_playback_completed(&self) {}

    fn on_log_updated(&self, _message: &str) {}
}

/// One listener callback as a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybackEvent {
    StateChanged { state: PlaybackState },
    PositionChanged { position_ms: u64 },
    DurationChanged { duration_ms: u64 },
    PlaybackCompleted,
    LogUpdated { message: String },
}

/// Forwards callbacks into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: PlaybackEvent) {
        // Nobody listening any more is fine
        let _ = self.tx.send(event);
    }
}

impl PlaybackListener for ChannelListener {
    fn on_state_changed(&self, state: PlaybackState) {
        self.emit(PlaybackEvent::StateChanged { state });
    }

    fn on_position_changed(&self, position_ms: u64) {
        self.emit(PlaybackEvent::PositionChanged { position_ms });
    }

    fn on_duration_changed(&self, duration_ms: u64) {
        self.emit(PlaybackEvent::DurationChanged { duration_ms });
    }

    fn on_playback_completed(&self) {
        self.emit(PlaybackEvent::PlaybackCompleted);
    }

    fn on_log_updated(&self, message: &str) {
        self.emit(PlaybackEvent::LogUpdated {
            message: message.to_string(),
        });
    }
}
