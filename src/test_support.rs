// Test support utilities for both unit and integration tests

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::audio::{
    CompletionCallback, EngineError, EngineFactory, EngineState, MediaEngine, MediaSource,
};
use crate::library::{ResourceError, ResourceResolver, TrackId};
use crate::playback::{PlaybackEvent, PlaybackListener, PlaybackState};

#[derive(Debug, Clone, Copy, Default)]
struct Script {
    duration_ms: u64,
    fail_create: bool,
    fail_data_source: bool,
    fail_prepare: bool,
}

struct ScriptedInner {
    state: EngineState,
    source: Option<MediaSource>,
    position_ms: u64,
    on_completion: Option<CompletionCallback>,
    script: Script,
}

/// In-memory engine that follows the media player state machine.
///
/// Clones share state, so a test can keep a handle to the engine the
/// controller owns and drive it (positions, end of track).
#[derive(Clone)]
pub struct ScriptedEngine {
    inner: Arc<Mutex<ScriptedInner>>,
}

impl ScriptedEngine {
    fn new(script: Script) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScriptedInner {
                state: EngineState::Idle,
                source: None,
                position_ms: 0,
                on_completion: None,
                script,
            })),
        }
    }

    pub fn state(&self) -> EngineState {
        self.inner.lock().state
    }

    /// File stem of the current data source.
    pub fn source_name(&self) -> Option<String> {
        self.inner.lock().source.as_ref().and_then(|s| {
            s.path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
    }

    pub fn position(&self) -> u64 {
        self.inner.lock().position_ms
    }

    pub fn set_position(&self, position_ms: u64) {
        self.inner.lock().position_ms = position_ms;
    }

    /// Play to the end of the track and fire the completion callback.
    pub fn finish(&self) {
        let callback = {
            let mut inner = self.inner.lock();
            inner.state = EngineState::PlaybackCompleted;
            inner.position_ms = inner.script.duration_ms;
            inner.on_completion.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    fn transition(
        &self,
        op: &'static str,
        from: &[EngineState],
        to: EngineState,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if !from.contains(&inner.state) {
            return Err(EngineError::invalid_state(op, inner.state));
        }
        inner.state = to;
        Ok(())
    }
}

impl MediaEngine for ScriptedEngine {
    fn set_data_source(&mut self, source: MediaSource) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Idle {
            return Err(EngineError::invalid_state("set_data_source", inner.state));
        }
        if inner.script.fail_data_source {
            return Err(EngineError::DataSource(format!(
                "cannot open {}",
                source.path.display()
            )));
        }
        inner.source = Some(source);
        inner.state = EngineState::Initialized;
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if inner.state != EngineState::Initialized {
            return Err(EngineError::invalid_state("prepare", inner.state));
        }
        if inner.script.fail_prepare {
            return Err(EngineError::Prepare("unsupported format".to_string()));
        }
        inner.state = EngineState::Prepared;
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.transition(
            "start",
            &[
                EngineState::Prepared,
                EngineState::Started,
                EngineState::Paused,
                EngineState::PlaybackCompleted,
            ],
            EngineState::Started,
        )
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.transition(
            "pause",
            &[EngineState::Started, EngineState::Paused],
            EngineState::Paused,
        )
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        match inner.state {
            EngineState::Prepared
            | EngineState::Started
            | EngineState::Paused
            | EngineState::PlaybackCompleted => {
                inner.position_ms = position_ms.min(inner.script.duration_ms);
                Ok(())
            }
            state => Err(EngineError::invalid_state("seek_to", state)),
        }
    }

    fn is_playing(&self) -> bool {
        self.state() == EngineState::Started
    }

    fn current_position_ms(&self) -> u64 {
        self.position()
    }

    fn duration_ms(&self) -> u64 {
        let inner = self.inner.lock();
        match inner.state {
            EngineState::Idle | EngineState::Initialized | EngineState::End => 0,
            _ => inner.script.duration_ms,
        }
    }

    fn reset(&mut self) {
        let mut inner = self.inner.lock();
        if inner.state == EngineState::End {
            return;
        }
        inner.state = EngineState::Idle;
        inner.source = None;
        inner.position_ms = 0;
    }

    fn release(&mut self) {
        let mut inner = self.inner.lock();
        inner.state = EngineState::End;
        inner.source = None;
        inner.on_completion = None;
    }

    fn set_on_completion(&mut self, callback: CompletionCallback) {
        self.inner.lock().on_completion = Some(callback);
    }
}

/// Factory for [`ScriptedEngine`]s that remembers everything it created.
#[derive(Clone)]
pub struct ScriptedFactory {
    script: Script,
    created: Arc<Mutex<Vec<ScriptedEngine>>>,
}

impl ScriptedFactory {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            script: Script {
                duration_ms,
                ..Script::default()
            },
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_create(mut self) -> Self {
        self.script.fail_create = true;
        self
    }

    pub fn failing_data_source(mut self) -> Self {
        self.script.fail_data_source = true;
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.script.fail_prepare = true;
        self
    }

    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    pub fn engine(&self, index: usize) -> ScriptedEngine {
        self.created.lock()[index].clone()
    }
}

impl EngineFactory for ScriptedFactory {
    type Engine = ScriptedEngine;

    fn create(&self) -> Result<ScriptedEngine, EngineError> {
        if self.script.fail_create {
            return Err(EngineError::Output("no output device available".to_string()));
        }
        let engine = ScriptedEngine::new(self.script);
        self.created.lock().push(engine.clone());
        Ok(engine)
    }
}

/// Resolver over made-up paths; nothing touches the disk.
#[derive(Debug, Clone, Default)]
pub struct FakeResources {
    names: BTreeMap<TrackId, String>,
}

impl FakeResources {
    pub fn with_tracks(names: &[&str]) -> (Self, Vec<TrackId>) {
        let mut resources = Self::default();
        let ids = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let id = TrackId(0x7f0b_0000 + i as u32);
                resources.names.insert(id, name.to_string());
                id
            })
            .collect();
        (resources, ids)
    }
}

impl ResourceResolver for FakeResources {
    fn open(&self, id: TrackId) -> Result<MediaSource, ResourceError> {
        let name = self.names.get(&id).ok_or(ResourceError::NotFound(id))?;
        Ok(MediaSource::new(PathBuf::from(format!("/res/raw/{}.wav", name))))
    }

    fn entry_name(&self, id: TrackId) -> Option<String> {
        self.names.get(&id).cloned()
    }
}

/// Listener that keeps every callback as a [`PlaybackEvent`].
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<PlaybackEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().clone()
    }

    /// Everything except log lines.
    pub fn transport_events(&self) -> Vec<PlaybackEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, PlaybackEvent::LogUpdated { .. }))
            .collect()
    }

    pub fn logs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PlaybackEvent::LogUpdated { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<PlaybackState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PlaybackEvent::StateChanged { state } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn positions(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PlaybackEvent::PositionChanged { position_ms } => Some(position_ms),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: PlaybackEvent) {
        self.events.lock().push(event);
    }
}

impl PlaybackListener for RecordingListener {
    fn on_state_changed(&self, state: PlaybackState) {
        self.push(PlaybackEvent::StateChanged { state });
    }

    fn on_position_changed(&self, position_ms: u64) {
        self.push(PlaybackEvent::PositionChanged { position_ms });
    }

    fn on_duration_changed(&self, duration_ms: u64) {
        self.push(PlaybackEvent::DurationChanged { duration_ms });
    }

    fn on_playback_completed(&self) {
        self.push(PlaybackEvent::PlaybackCompleted);
    }

    fn on_log_updated(&self, message: &str) {
        self.push(PlaybackEvent::LogUpdated {
            message: message.to_string(),
        });
    }
}
