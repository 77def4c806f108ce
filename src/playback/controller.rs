//! Playback controller.
//!
//! [`MediaController`] owns one engine, the track list and the position ticker,
//! and reports everything that happens to a [`PlaybackListener`]. Engine
//! failures never reach the caller: they end up as log lines.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::listener::{PlaybackListener, PlaybackState};
use super::ticker::PositionTicker;
use crate::audio::{CompletionCallback, EngineFactory, MediaEngine};
use crate::library::{ResourceResolver, TrackId};
use crate::settings::PlayerSettings;

pub const PLAYBACK_POSITION_REFRESH_INTERVAL_MS: u64 = 1000;

/// Listener slot shared with the ticker and completion threads.
#[derive(Clone, Default)]
struct Notifier {
    listener: Arc<RwLock<Option<Arc<dyn PlaybackListener>>>>,
}

impl Notifier {
    fn current(&self) -> Option<Arc<dyn PlaybackListener>> {
        self.listener.read().clone()
    }

    fn set(&self, listener: Option<Arc<dyn PlaybackListener>>) {
        *self.listener.write() = listener;
    }

    fn state(&self, state: PlaybackState) {
        if let Some(listener) = self.current() {
            listener.on_state_changed(state);
        }
    }

    fn position(&self, position_ms: u64) {
        if let Some(listener) = self.current() {
            listener.on_position_changed(position_ms);
        }
    }

    fn duration(&self, duration_ms: u64) {
        if let Some(listener) = self.current() {
            listener.on_duration_changed(duration_ms);
        }
    }

    fn completed(&self) {
        if let Some(listener) = self.current() {
            listener.on_playback_completed();
        }
    }

    fn log(&self, message: &str) {
        debug!("{}", message);
        if let Some(listener) = self.current() {
            listener.on_log_updated(message);
        }
    }

    fn log_error(&self, error: &dyn std::fmt::Display) {
        let message = error.to_string();
        warn!("{}", message);
        if let Some(listener) = self.current() {
            listener.on_log_updated(&message);
        }
    }
}

/// The single position ticker, reachable from the engine's completion thread.
#[derive(Clone, Default)]
struct ProgressUpdater {
    ticker: Arc<Mutex<Option<PositionTicker>>>,
    notifier: Notifier,
}

impl ProgressUpdater {
    fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }

    fn start<F>(&self, interval: Duration, tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut slot = self.ticker.lock();
        if slot.is_some() {
            return;
        }
        match PositionTicker::start(interval, tick) {
            Ok(ticker) => *slot = Some(ticker),
            Err(e) => {
                drop(slot);
                self.notifier.log_error(&e);
            }
        }
    }

    /// Cancel the ticker without waiting; optionally report position 0.
    fn stop(&self, reset_position: bool) {
        let ticker = self.ticker.lock().take();
        if let Some(mut ticker) = ticker {
            ticker.stop();
            if reset_position {
                self.notifier.position(0);
            }
        }
    }
}

/// Holds one media engine and drives it from transport commands.
pub struct MediaController<F: EngineFactory> {
    factory: F,
    resolver: Arc<dyn ResourceResolver>,
    engine: Arc<Mutex<Option<F::Engine>>>,
    tracks: Vec<TrackId>,
    current: usize,
    loaded_track: Option<TrackId>,
    refresh_interval: Duration,
    progress: ProgressUpdater,
}

impl<F: EngineFactory> MediaController<F> {
    pub fn new(factory: F, resolver: Arc<dyn ResourceResolver>) -> Self {
        Self {
            factory,
            resolver,
            engine: Arc::new(Mutex::new(None)),
            tracks: Vec::new(),
            current: 0,
            loaded_track: None,
            refresh_interval: Duration::from_millis(PLAYBACK_POSITION_REFRESH_INTERVAL_MS),
            progress: ProgressUpdater::default(),
        }
    }

    pub fn with_settings(
        factory: F,
        resolver: Arc<dyn ResourceResolver>,
        settings: &PlayerSettings,
    ) -> Self {
        let mut controller = Self::new(factory, resolver);
        controller.refresh_interval = settings.interval();
        controller
    }

    pub fn set_playback_info_listener(&self, listener: Arc<dyn PlaybackListener>) {
        self.progress.notifier.set(Some(listener));
    }

    pub fn clear_playback_info_listener(&self) {
        self.progress.notifier.set(None);
    }

    /// Replace the track list. The loaded track is left alone.
    pub fn set_media_list(&mut self, ids: &[TrackId]) {
        self.tracks = ids.to_vec();
    }

    pub fn media_list(&self) -> &[TrackId] {
        &self.tracks
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Track the current index resolves to.
    pub fn current_track(&self) -> Option<TrackId> {
        if self.tracks.is_empty() {
            return None;
        }
        Some(self.tracks[self.current % self.tracks.len()])
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Open the current track and prepare it synchronously.
    pub fn load_media(&mut self) {
        let Some(id) = self.current_track() else {
            self.log("load_media() skipped: media list is empty");
            return;
        };
        self.loaded_track = Some(id);

        if !self.ensure_engine() {
            return;
        }

        let source = match self.resolver.open(id) {
            Ok(source) => Some(source),
            Err(e) => {
                self.progress.notifier.log_error(&e);
                None
            }
        };

        if let Some(source) = source {
            self.log("load_media(): set data source");
            if let Some(Err(e)) = self.with_engine(|engine| engine.set_data_source(source)) {
                self.progress.notifier.log_error(&e);
            }
        }

        self.log("load_media(): prepare");
        if let Some(Err(e)) = self.with_engine(|engine| engine.prepare()) {
            self.progress.notifier.log_error(&e);
        }

        self.initialize_progress_callback();
        self.log("initialize_progress_callback()");
    }

    /// Destroy the engine if there is one. Safe to call repeatedly.
    pub fn release(&mut self) {
        self.progress.stop(false);
        let engine = self.engine.lock().take();
        if let Some(mut engine) = engine {
            self.log("release(): engine dropped");
            engine.release();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.with_engine(|engine| engine.is_playing()).unwrap_or(false)
    }

    pub fn play(&mut self) {
        if !self.has_engine() || self.is_playing() {
            return;
        }

        let name = self
            .loaded_track
            .and_then(|id| self.resolver.entry_name(id))
            .unwrap_or_default();
        self.log(&format!("play() {}", name));

        match self.with_engine(|engine| engine.start()) {
            Some(Ok(())) => {
                self.progress.notifier.state(PlaybackState::Playing);
                self.start_position_updates();
            }
            Some(Err(e)) => self.progress.notifier.log_error(&e),
            None => {}
        }
    }

    /// Advance to the next track (wrapping) and play it.
    pub fn next(&mut self) {
        if !self.has_engine() {
            return;
        }
        self.log("next()");
        self.current = if self.tracks.is_empty() {
            0
        } else {
            (self.current + 1) % self.tracks.len()
        };
        self.reset();
        self.play();
    }

    pub fn reset(&mut self) {
        if !self.has_engine() {
            return;
        }
        self.log("reset()");
        self.with_engine(|engine| engine.reset());
        self.load_media();
        self.progress.notifier.state(PlaybackState::Reset);
        self.stop_position_updates(true);
    }

    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }
        match self.with_engine(|engine| engine.pause()) {
            Some(Ok(())) => {
                self.progress.notifier.state(PlaybackState::Paused);
                self.log("pause()");
            }
            Some(Err(e)) => self.progress.notifier.log_error(&e),
            None => {}
        }
    }

    pub fn seek_to(&mut self, position_ms: u64) {
        if !self.has_engine() {
            return;
        }
        self.log(&format!("seek_to() {} ms", position_ms));
        if let Some(Err(e)) = self.with_engine(|engine| engine.seek_to(position_ms)) {
            self.progress.notifier.log_error(&e);
        }
    }

    /// Report the prepared track's duration and a zero position.
    pub fn initialize_progress_callback(&self) {
        let Some(duration) = self.with_engine(|engine| engine.duration_ms()) else {
            return;
        };
        self.progress.notifier.duration(duration);
        self.progress.notifier.position(0);
        self.log(&format!(
            "duration reported: {} sec",
            Duration::from_millis(duration).as_secs()
        ));
        self.log("position reported: 0");
    }

    /// True while the position ticker is alive.
    pub fn is_reporting_position(&self) -> bool {
        self.progress.is_running()
    }

    fn has_engine(&self) -> bool {
        self.engine.lock().is_some()
    }

    /// Run `f` against the engine, if one exists. The lock is released before
    /// the caller notifies anyone.
    fn with_engine<R>(&self, f: impl FnOnce(&mut F::Engine) -> R) -> Option<R> {
        let mut slot = self.engine.lock();
        slot.as_mut().map(f)
    }

    /// Create the engine on first use. False if it could not be created.
    fn ensure_engine(&mut self) -> bool {
        let mut slot = self.engine.lock();
        if slot.is_some() {
            return true;
        }

        match self.factory.create() {
            Ok(mut engine) => {
                engine.set_on_completion(self.completion_callback());
                *slot = Some(engine);
                drop(slot);
                self.log("engine created");
                true
            }
            Err(e) => {
                drop(slot);
                self.progress.notifier.log_error(&e);
                false
            }
        }
    }

    fn completion_callback(&self) -> CompletionCallback {
        let progress = self.progress.clone();
        Arc::new(move || {
            progress.stop(true);
            progress.notifier.log("playback completed");
            progress.notifier.state(PlaybackState::Completed);
            progress.notifier.completed();
        })
    }

    fn start_position_updates(&self) {
        let engine = self.engine.clone();
        let notifier = self.progress.notifier.clone();
        self.progress.start(self.refresh_interval, move || {
            let position = engine
                .lock()
                .as_ref()
                .filter(|engine| engine.is_playing())
                .map(|engine| engine.current_position_ms());
            if let Some(position) = position {
                notifier.position(position);
            }
        });
    }

    fn stop_position_updates(&self, reset_position: bool) {
        self.progress.stop(reset_position);
    }

    fn log(&self, message: &str) {
        self.progress.notifier.log(message);
    }
}

impl<F: EngineFactory> Drop for MediaController<F> {
    fn drop(&mut self) {
        // The ticker thread holds the engine slot; stop it so both go away
        self.progress.stop(false);
        if let Some(mut engine) = self.engine.lock().take() {
            engine.release();
        }
    }
}
