// Media engine abstraction
// The controller drives any engine that follows the media player state machine

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Called by an engine, from its own thread, when a track plays to the end.
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Something an engine can open and decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub path: PathBuf,
}

impl MediaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Lifecycle states of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Initialized,
    Prepared,
    Started,
    Paused,
    PlaybackCompleted,
    End,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Idle => "Idle",
            EngineState::Initialized => "Initialized",
            EngineState::Prepared => "Prepared",
            EngineState::Started => "Started",
            EngineState::Paused => "Paused",
            EngineState::PlaybackCompleted => "PlaybackCompleted",
            EngineState::End => "End",
        };
        f.write_str(name)
    }
}

/// Engine operation failed.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{op}() called in state {state}")]
    InvalidState { op: &'static str, state: EngineState },

    #[error("set_data_source failed: {0}")]
    DataSource(String),

    #[error("prepare failed: {0}")]
    Prepare(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("audio output failed: {0}")]
    Output(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn invalid_state(op: &'static str, state: EngineState) -> Self {
        EngineError::InvalidState { op, state }
    }
}

/// Playback engine driven by the controller.
///
/// Positions and durations are in milliseconds. Operations that are not legal
/// in the current [`EngineState`] return [`EngineError::InvalidState`].
pub trait MediaEngine: Send {
    fn set_data_source(&mut self, source: MediaSource) -> Result<(), EngineError>;

    /// Synchronously prepare the data source for playback.
    fn prepare(&mut self) -> Result<(), EngineError>;

    fn start(&mut self) -> Result<(), EngineError>;

    fn pause(&mut self) -> Result<(), EngineError>;

    fn seek_to(&mut self, position_ms: u64) -> Result<(), EngineError>;

    fn is_playing(&self) -> bool;

    fn current_position_ms(&self) -> u64;

    /// Total duration, or 0 when nothing is prepared.
    fn duration_ms(&self) -> u64;

    /// Return to `Idle`, dropping the data source.
    fn reset(&mut self);

    /// Free everything; the engine is unusable afterwards.
    fn release(&mut self);

    fn set_on_completion(&mut self, callback: CompletionCallback);
}

/// Creates engines on demand.
pub trait EngineFactory: Send + Sync {
    type Engine: MediaEngine + 'static;

    fn create(&self) -> Result<Self::Engine, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_operation_and_state() {
        let err = EngineError::invalid_state("start", EngineState::Idle);
        assert_eq!(
            err.to_string(),
            "start() called in state Idle"
        );
    }

    #[test]
    fn media_source_from_str() {
        let source = MediaSource::new("/tmp/a.wav");
        assert_eq!(source.path, PathBuf::from("/tmp/a.wav"));
    }
}
