// Audio playback module
// Engine abstraction plus the native engine: Symphonia for decoding, cpal for output

pub mod decoder;
pub mod engine;
pub mod output;
pub mod player;
pub mod resampler;

pub use engine::{
    CompletionCallback, EngineError, EngineFactory, EngineState, MediaEngine, MediaSource,
};
pub use player::{NativePlayer, NativePlayerFactory};
