// Native media engine
// Symphonia decodes on a worker thread that feeds a cpal output

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::decoder::AudioDecoder;
use super::engine::{
    CompletionCallback, EngineError, EngineFactory, EngineState, MediaEngine, MediaSource,
};
use super::output::AudioOutput;
use super::resampler::FormatAdapter;

/// How long the worker waits on a full ring buffer before re-checking commands.
const WRITE_RETRY: Duration = Duration::from_millis(5);

#[derive(Debug)]
enum WorkerCommand {
    Pause,
    Resume,
    Seek(u64),
    SetVolume(f32),
    Stop,
}

/// State the worker thread updates while the engine is borrowed elsewhere.
struct Shared {
    state: Mutex<EngineState>,
    position_ms: AtomicU64,
    /// False once the engine has abandoned the worker holding this copy.
    live: Mutex<bool>,
}

#[derive(Debug, PartialEq, Eq)]
enum Completion {
    Done,
    /// The worker was stopped; nothing changed.
    Retired,
    /// Not in `Started`, a pause is on its way to the worker.
    NotStarted,
}

impl Shared {
    fn new(state: EngineState, position_ms: u64) -> Self {
        Self {
            state: Mutex::new(state),
            position_ms: AtomicU64::new(position_ms),
            live: Mutex::new(true),
        }
    }

    fn state(&self) -> EngineState {
        *self.state.lock()
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock() = state;
    }

    /// Blocks while a completion callback from this worker is running.
    fn retire(&self) {
        *self.live.lock() = false;
    }

    /// `Started` -> `PlaybackCompleted`, then the callback, both only while
    /// the worker is still live.
    fn complete(&self, end_ms: u64, callback: Option<&CompletionCallback>) -> Completion {
        let live = self.live.lock();
        if !*live {
            return Completion::Retired;
        }
        {
            let mut state = self.state.lock();
            if *state != EngineState::Started {
                return Completion::NotStarted;
            }
            self.position_ms.store(end_ms, Ordering::SeqCst);
            *state = EngineState::PlaybackCompleted;
        }
        if let Some(callback) = callback {
            callback();
        }
        drop(live);
        Completion::Done
    }
}

pub struct NativePlayer {
    shared: Arc<Shared>,
    source: Option<MediaSource>,
    prepared: Option<AudioDecoder>,
    duration_ms: u64,
    volume: f32,
    commands: Option<Sender<WorkerCommand>>,
    on_completion: Option<CompletionCallback>,
}

impl NativePlayer {
    pub fn new(volume: f32) -> Self {
        Self {
            shared: Arc::new(Shared::new(EngineState::Idle, 0)),
            source: None,
            prepared: None,
            duration_ms: 0,
            volume: volume.clamp(0.0, 1.0),
            commands: None,
            on_completion: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.send(WorkerCommand::SetVolume(self.volume));
    }

    fn send(&self, command: WorkerCommand) {
        if let Some(tx) = self.commands.as_ref() {
            // The worker may already have exited after completion
            let _ = tx.send(command);
        }
    }

    /// Tell the worker to stop without waiting for it.
    fn stop_worker(&mut self) {
        if let Some(tx) = self.commands.take() {
            let _ = tx.send(WorkerCommand::Stop);
            self.shared.retire();
            // The old worker keeps its copy until it notices the stop
            self.shared = Arc::new(Shared::new(
                self.shared.state(),
                self.shared.position_ms.load(Ordering::SeqCst),
            ));
        }
    }

    fn spawn_worker(&mut self) -> Result<(), EngineError> {
        let mut decoder = match self.prepared.take() {
            Some(decoder) => decoder,
            None => {
                let source = self
                    .source
                    .as_ref()
                    .ok_or_else(|| EngineError::invalid_state("start", self.state()))?;
                AudioDecoder::open(&source.path)?
            }
        };

        let start_ms = self.shared.position_ms.load(Ordering::SeqCst);
        if start_ms > 0 {
            let reached = decoder.seek(start_ms)?;
            self.shared.position_ms.store(reached, Ordering::SeqCst);
        }

        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let shared = self.shared.clone();
        let on_completion = self.on_completion.clone();
        let volume = self.volume;

        thread::Builder::new()
            .name("audioplayer-decode".to_string())
            .spawn(move || {
                let output = match AudioOutput::new(volume) {
                    Ok(output) => output,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let adapter = match FormatAdapter::new(
                    decoder.sample_rate(),
                    decoder.channels(),
                    output.sample_rate(),
                    output.channels() as usize,
                ) {
                    Ok(adapter) => adapter,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                PlaybackWorker {
                    decoder,
                    output,
                    adapter,
                    shared,
                    commands: command_rx,
                    on_completion,
                    paused: false,
                    frames: 0,
                }
                .run();
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.commands = Some(command_tx);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::Output("decode thread exited during start".to_string())),
        }
    }
}

impl MediaEngine for NativePlayer {
    fn set_data_source(&mut self, source: MediaSource) -> Result<(), EngineError> {
        let state = self.state();
        if state != EngineState::Idle {
            return Err(EngineError::invalid_state("set_data_source", state));
        }
        if !source.path.is_file() {
            return Err(EngineError::DataSource(format!(
                "{} is not a readable file",
                source.path.display()
            )));
        }

        debug!("Data source set to {:?}", source.path);
        self.source = Some(source);
        self.shared.set_state(EngineState::Initialized);
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), EngineError> {
        let state = self.state();
        if state != EngineState::Initialized {
            return Err(EngineError::invalid_state("prepare", state));
        }
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| EngineError::invalid_state("prepare", state))?;

        let decoder = AudioDecoder::open(&source.path)?;
        self.duration_ms = decoder.duration_ms().unwrap_or(0);
        self.prepared = Some(decoder);
        self.shared.position_ms.store(0, Ordering::SeqCst);
        self.shared.set_state(EngineState::Prepared);
        Ok(())
    }

    fn start(&mut self) -> Result<(), EngineError> {
        if self.commands.is_some() {
            let shared = self.shared.clone();
            let mut state = shared.state.lock();
            if *state == EngineState::Paused {
                self.send(WorkerCommand::Resume);
                *state = EngineState::Started;
                return Ok(());
            }
        }

        match self.state() {
            EngineState::Started => Ok(()),
            EngineState::Prepared | EngineState::Paused | EngineState::PlaybackCompleted => {
                if self.state() == EngineState::PlaybackCompleted {
                    self.stop_worker();
                    // Replay from the top unless a seek moved the position
                    if self.current_position_ms() >= self.duration_ms {
                        self.shared.position_ms.store(0, Ordering::SeqCst);
                    }
                }
                self.spawn_worker()?;
                self.shared.set_state(EngineState::Started);
                Ok(())
            }
            state => Err(EngineError::invalid_state("start", state)),
        }
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        // Under the state lock so a worker finishing the track cannot interleave
        let shared = self.shared.clone();
        let mut state = shared.state.lock();
        match *state {
            EngineState::Paused => Ok(()),
            EngineState::Started => {
                self.send(WorkerCommand::Pause);
                *state = EngineState::Paused;
                Ok(())
            }
            other => Err(EngineError::invalid_state("pause", other)),
        }
    }

    fn seek_to(&mut self, position_ms: u64) -> Result<(), EngineError> {
        let shared = self.shared.clone();
        let state = shared.state.lock();
        match *state {
            EngineState::Prepared
            | EngineState::Started
            | EngineState::Paused
            | EngineState::PlaybackCompleted => {}
            other => return Err(EngineError::invalid_state("seek_to", other)),
        }

        let target = if self.duration_ms > 0 {
            position_ms.min(self.duration_ms)
        } else {
            position_ms
        };

        if self.commands.is_some() && *state != EngineState::PlaybackCompleted {
            self.send(WorkerCommand::Seek(target));
        } else if let Some(decoder) = self.prepared.as_mut() {
            let reached = decoder.seek(target)?;
            shared.position_ms.store(reached, Ordering::SeqCst);
            return Ok(());
        }
        shared.position_ms.store(target, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state() == EngineState::Started
    }

    fn current_position_ms(&self) -> u64 {
        self.shared.position_ms.load(Ordering::SeqCst)
    }

    fn duration_ms(&self) -> u64 {
        match self.state() {
            EngineState::Idle | EngineState::Initialized | EngineState::End => 0,
            _ => self.duration_ms,
        }
    }

    fn reset(&mut self) {
        if self.state() == EngineState::End {
            return;
        }
        self.stop_worker();
        self.source = None;
        self.prepared = None;
        self.duration_ms = 0;
        self.shared.position_ms.store(0, Ordering::SeqCst);
        self.shared.set_state(EngineState::Idle);
    }

    fn release(&mut self) {
        self.reset();
        self.on_completion = None;
        self.shared.set_state(EngineState::End);
    }

    fn set_on_completion(&mut self, callback: CompletionCallback) {
        self.on_completion = Some(callback);
    }
}

impl Drop for NativePlayer {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Creates [`NativePlayer`]s on the default output device.
#[derive(Debug, Clone)]
pub struct NativePlayerFactory {
    pub volume: f32,
}

impl Default for NativePlayerFactory {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

impl EngineFactory for NativePlayerFactory {
    type Engine = NativePlayer;

    fn create(&self) -> Result<NativePlayer, EngineError> {
        Ok(NativePlayer::new(self.volume))
    }
}

/// Runs on the decode thread; owns the decoder and the device stream.
struct PlaybackWorker {
    decoder: AudioDecoder,
    output: AudioOutput,
    adapter: FormatAdapter,
    shared: Arc<Shared>,
    commands: Receiver<WorkerCommand>,
    on_completion: Option<CompletionCallback>,
    paused: bool,
    /// Source frames handed to the output so far.
    frames: u64,
}

impl PlaybackWorker {
    fn rate(&self) -> u64 {
        self.decoder.sample_rate().max(1) as u64
    }

    fn publish_position(&self) {
        let position = self.frames * 1000 / self.rate();
        self.shared.position_ms.store(position, Ordering::SeqCst);
    }

    fn run(mut self) {
        self.frames = self.shared.position_ms.load(Ordering::SeqCst) * self.rate() / 1000;

        loop {
            if !self.decode_to_end() {
                return;
            }
            match self.play_out() {
                PlayOut::Seeked => continue,
                PlayOut::Completed | PlayOut::Stopped => return,
            }
        }
    }

    /// Decode and queue until end of stream; false when the worker must exit.
    fn decode_to_end(&mut self) -> bool {
        let channels = self.decoder.channels().max(1) as u64;

        loop {
            if !self.drain_commands() {
                return false;
            }
            if self.paused {
                match self.commands.recv() {
                    Ok(command) => {
                        if !self.apply(command) {
                            return false;
                        }
                    }
                    Err(_) => return false,
                }
                continue;
            }

            let samples = match self.decoder.decode_next() {
                Ok(Some(samples)) => samples,
                Ok(None) => match self.write_tail() {
                    WriteOutcome::Written => return true,
                    WriteOutcome::Interrupted => continue,
                    WriteOutcome::Stopped => return false,
                },
                Err(e) => {
                    error!("Playback stopped: {}", e);
                    return true;
                }
            };

            let converted = match self.adapter.process(&samples) {
                Ok(converted) => converted,
                Err(e) => {
                    error!("Playback stopped: {}", e);
                    return true;
                }
            };

            match self.write_all(&converted) {
                WriteOutcome::Written => {
                    self.frames += samples.len() as u64 / channels;
                    self.publish_position();
                }
                WriteOutcome::Interrupted => {}
                WriteOutcome::Stopped => return false,
            }
        }
    }

    /// Queue whatever the resampler still holds at end of stream.
    fn write_tail(&mut self) -> WriteOutcome {
        match self.adapter.flush() {
            Ok(tail) => self.write_all(&tail),
            Err(e) => {
                warn!("Dropping resampler tail: {}", e);
                WriteOutcome::Written
            }
        }
    }

    /// Let the device play out what is queued, still obeying commands, then
    /// mark the track completed.
    fn play_out(&mut self) -> PlayOut {
        loop {
            let command = if self.paused {
                match self.commands.recv() {
                    Ok(command) => command,
                    Err(_) => return PlayOut::Stopped,
                }
            } else if self.output.queued() > 0 {
                match self.commands.recv_timeout(WRITE_RETRY) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return PlayOut::Stopped,
                }
            } else {
                match self
                    .shared
                    .complete(self.end_position(), self.on_completion.as_ref())
                {
                    Completion::Done => return PlayOut::Completed,
                    Completion::Retired => return PlayOut::Stopped,
                    Completion::NotStarted => match self.commands.recv() {
                        Ok(command) => command,
                        Err(_) => return PlayOut::Stopped,
                    },
                }
            };

            let seek = matches!(command, WorkerCommand::Seek(_));
            if !self.apply(command) {
                return PlayOut::Stopped;
            }
            if seek {
                return PlayOut::Seeked;
            }
        }
    }

    fn end_position(&self) -> u64 {
        self.decoder
            .duration_ms()
            .unwrap_or(self.frames * 1000 / self.rate())
    }

    /// Apply queued commands; false when the worker must exit.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if !self.apply(command) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn apply(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::Pause => {
                self.paused = true;
                self.output.set_paused(true);
            }
            WorkerCommand::Resume => {
                self.paused = false;
                self.output.set_paused(false);
            }
            WorkerCommand::Seek(position_ms) => match self.decoder.seek(position_ms) {
                Ok(reached) => {
                    self.adapter.reset();
                    self.output.clear();
                    self.frames = reached * self.rate() / 1000;
                    self.shared.position_ms.store(reached, Ordering::SeqCst);
                }
                Err(e) => warn!("Seek to {} ms failed: {}", position_ms, e),
            },
            WorkerCommand::SetVolume(volume) => self.output.set_volume(volume),
            WorkerCommand::Stop => {
                self.output.clear();
                return false;
            }
        }
        true
    }

    /// Apply one command received mid-write.
    fn interrupt(&mut self, command: WorkerCommand) -> Option<WriteOutcome> {
        let seek = matches!(command, WorkerCommand::Seek(_));
        if !self.apply(command) {
            return Some(WriteOutcome::Stopped);
        }
        if seek {
            return Some(WriteOutcome::Interrupted);
        }
        None
    }

    fn write_all(&mut self, samples: &[f32]) -> WriteOutcome {
        let mut remaining = samples;
        while !remaining.is_empty() {
            let written = self.output.write(remaining);
            remaining = &remaining[written..];
            if written > 0 {
                continue;
            }

            match self.commands.recv_timeout(WRITE_RETRY) {
                Ok(command) => {
                    if let Some(outcome) = self.interrupt(command) {
                        return outcome;
                    }
                    while self.paused {
                        let Ok(command) = self.commands.recv() else {
                            return WriteOutcome::Stopped;
                        };
                        if let Some(outcome) = self.interrupt(command) {
                            return outcome;
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return WriteOutcome::Stopped,
            }
        }
        WriteOutcome::Written
    }
}

enum PlayOut {
    Completed,
    /// A seek sent the worker back to decoding.
    Seeked,
    Stopped,
}

enum WriteOutcome {
    Written,
    /// A seek discarded the rest of the packet.
    Interrupted,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_wav(path: &Path, seconds: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..(8000 * seconds) {
            writer.write_sample(((i % 100) as i16 - 50) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn prepared_player(dir: &TempDir) -> NativePlayer {
        let path = dir.path().join("track.wav");
        write_wav(&path, 3);
        let mut player = NativePlayer::new(1.0);
        player.set_data_source(MediaSource::new(path)).unwrap();
        player.prepare().unwrap();
        player
    }

    #[test]
    fn prepare_reports_duration() {
        let dir = TempDir::new().unwrap();
        let player = prepared_player(&dir);
        assert_eq!(player.state(), EngineState::Prepared);
        assert_eq!(player.duration_ms(), 3000);
        assert_eq!(player.current_position_ms(), 0);
        assert!(!player.is_playing());
    }

    #[test]
    fn missing_file_is_rejected_as_data_source() {
        let dir = TempDir::new().unwrap();
        let mut player = NativePlayer::new(1.0);
        let err = player
            .set_data_source(MediaSource::new(dir.path().join("gone.wav")))
            .unwrap_err();
        assert!(matches!(err, EngineError::DataSource(_)));
        assert_eq!(player.state(), EngineState::Idle);
    }

    #[test]
    fn prepare_before_data_source_is_invalid() {
        let mut player = NativePlayer::new(1.0);
        let err = player.prepare().unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState { op: "prepare", state: EngineState::Idle }
        ));
    }

    #[test]
    fn start_and_pause_require_prepared_engine() {
        let mut player = NativePlayer::new(1.0);
        assert!(player.start().is_err());
        assert!(player.pause().is_err());
        assert!(player.seek_to(100).is_err());
    }

    #[test]
    fn seek_while_prepared_moves_position_and_clamps() {
        let dir = TempDir::new().unwrap();
        let mut player = prepared_player(&dir);

        player.seek_to(1500).unwrap();
        let position = player.current_position_ms();
        assert!((1400..=1500).contains(&position), "position {}", position);

        // Past the end is clamped; the decoder may still refuse the last frame
        let _ = player.seek_to(60_000);
        assert!(player.current_position_ms() <= 3000);
    }

    #[test]
    fn reset_returns_to_idle() {
        let dir = TempDir::new().unwrap();
        let mut player = prepared_player(&dir);
        player.reset();
        assert_eq!(player.state(), EngineState::Idle);
        assert_eq!(player.duration_ms(), 0);

        // A fresh data source is accepted again
        let path = dir.path().join("track.wav");
        player.set_data_source(MediaSource::new(path)).unwrap();
    }

    fn counting_callback() -> (CompletionCallback, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let callback: CompletionCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (callback, calls)
    }

    #[test]
    fn live_worker_completes_a_started_track() {
        let shared = Shared::new(EngineState::Started, 2900);
        let (callback, calls) = counting_callback();

        assert_eq!(shared.complete(3000, Some(&callback)), Completion::Done);
        assert_eq!(shared.state(), EngineState::PlaybackCompleted);
        assert_eq!(shared.position_ms.load(Ordering::SeqCst), 3000);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stopped_worker_cannot_complete() {
        let shared = Shared::new(EngineState::Started, 2900);
        let (callback, calls) = counting_callback();

        shared.retire();

        assert_eq!(shared.complete(3000, Some(&callback)), Completion::Retired);
        assert_eq!(shared.state(), EngineState::Started);
        assert_eq!(shared.position_ms.load(Ordering::SeqCst), 2900);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn paused_track_waits_instead_of_completing() {
        let shared = Shared::new(EngineState::Paused, 2900);
        let (callback, calls) = counting_callback();

        assert_eq!(shared.complete(3000, Some(&callback)), Completion::NotStarted);
        assert_eq!(shared.state(), EngineState::Paused);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reset_retires_the_running_worker() {
        let dir = TempDir::new().unwrap();
        let mut player = prepared_player(&dir);
        let (tx, rx) = mpsc::channel();
        player.commands = Some(tx);
        player.shared.set_state(EngineState::Started);
        let worker_copy = player.shared.clone();
        let (callback, calls) = counting_callback();

        player.reset();

        assert!(matches!(rx.try_recv(), Ok(WorkerCommand::Stop)));
        assert_eq!(worker_copy.complete(3000, Some(&callback)), Completion::Retired);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(player.state(), EngineState::Idle);
    }

    #[test]
    fn pause_after_completion_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut player = prepared_player(&dir);
        let (tx, rx) = mpsc::channel();
        player.commands = Some(tx);
        player.shared.set_state(EngineState::Started);

        // The worker reached the end first
        assert_eq!(player.shared.complete(3000, None), Completion::Done);

        assert!(player.pause().is_err());
        assert_eq!(player.state(), EngineState::PlaybackCompleted);
        assert!(!player.is_playing());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resume_reaches_the_worker_only_from_pause() {
        let dir = TempDir::new().unwrap();
        let mut player = prepared_player(&dir);
        let (tx, rx) = mpsc::channel();
        player.commands = Some(tx);
        player.shared.set_state(EngineState::Started);

        player.pause().unwrap();
        assert!(matches!(rx.try_recv(), Ok(WorkerCommand::Pause)));
        player.start().unwrap();
        assert!(matches!(rx.try_recv(), Ok(WorkerCommand::Resume)));
        assert!(player.is_playing());
    }

    #[test]
    fn released_engine_rejects_everything() {
        let dir = TempDir::new().unwrap();
        let mut player = prepared_player(&dir);
        player.release();
        assert_eq!(player.state(), EngineState::End);

        let path = dir.path().join("track.wav");
        assert!(player.set_data_source(MediaSource::new(path)).is_err());
        assert!(player.start().is_err());

        // Reset after release stays released
        player.reset();
        assert_eq!(player.state(), EngineState::End);
    }
}
