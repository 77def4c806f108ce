// Playback module
// Controller, listener interface and the periodic position task

pub mod controller;
pub mod listener;
pub mod ticker;

pub use controller::{MediaController, PLAYBACK_POSITION_REFRESH_INTERVAL_MS};
pub use listener::{ChannelListener, PlaybackEvent, PlaybackListener, PlaybackState};
pub use ticker::PositionTicker;
