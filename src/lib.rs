// audioplayer - playback holder with transport controls and position reporting
// Module declarations
pub mod audio;
pub mod console;
pub mod library;
pub mod logging;
pub mod playback;
pub mod settings;
mod state;

// Test support (unit tests, or integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use audio::{EngineError, EngineFactory, MediaEngine, MediaSource, NativePlayerFactory};
pub use library::{RawResources, ResourceResolver, TrackId};
pub use playback::{
    ChannelListener, MediaController, PlaybackEvent, PlaybackListener, PlaybackState,
};
pub use settings::PlayerSettings;

pub fn run(options: console::ConsoleOptions) -> anyhow::Result<()> {
    logging::init();
    console::run(options)
}
