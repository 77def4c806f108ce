// Terminal front end
// Reads transport commands from stdin and prints listener events

use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::info;

use crate::audio::NativePlayerFactory;
use crate::library::RawResources;
use crate::playback::{ChannelListener, MediaController, PlaybackEvent};
use crate::settings::PlayerSettings;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Play,
    Pause,
    Reset,
    Next,
    Seek(u64),
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };

        let command = match word.to_lowercase().as_str() {
            "play" | "p" => ConsoleCommand::Play,
            "pause" => ConsoleCommand::Pause,
            "reset" | "stop" => ConsoleCommand::Reset,
            "next" | "n" => ConsoleCommand::Next,
            "seek" | "s" => {
                let ms = words.next().context("seek needs a position in ms")?;
                let ms = ms
                    .parse::<u64>()
                    .with_context(|| format!("bad position {:?}", ms))?;
                ConsoleCommand::Seek(ms)
            }
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            other => bail!("unknown command {:?}", other),
        };
        Ok(Some(command))
    }
}

const HELP: &str = "commands: play | pause | reset | next | seek <ms> | status | quit";

/// Options coming from the command line.
#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    pub resources: Option<PathBuf>,
    pub settings_dir: PathBuf,
    pub interval_ms: Option<u64>,
}

pub fn format_event(event: &PlaybackEvent) -> Option<String> {
    match event {
        PlaybackEvent::StateChanged { state } => Some(format!("state: {}", state)),
        PlaybackEvent::PositionChanged { position_ms } => {
            Some(format!("position: {}", format_ms(*position_ms)))
        }
        PlaybackEvent::DurationChanged { duration_ms } => {
            Some(format!("duration: {}", format_ms(*duration_ms)))
        }
        PlaybackEvent::PlaybackCompleted => Some("playback completed".to_string()),
        // Log lines already go through tracing
        PlaybackEvent::LogUpdated { .. } => None,
    }
}

fn format_ms(ms: u64) -> String {
    let seconds = ms / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn run(options: ConsoleOptions) -> Result<()> {
    let mut settings = PlayerSettings::load(&options.settings_dir)?;
    if let Some(dir) = options.resources {
        settings.resources_dir = Some(dir);
    }
    if let Some(interval) = options.interval_ms {
        settings.position_refresh_interval_ms = interval;
    }

    let resources_dir = settings
        .resources_dir
        .clone()
        .context("no resources directory given (use --resources)")?;
    let resources = RawResources::scan(&resources_dir)?;
    if resources.is_empty() {
        bail!("no audio files found in {}", resources_dir.display());
    }
    info!("Found {} tracks in {:?}", resources.len(), resources_dir);

    let ids = resources.ids();
    let factory = NativePlayerFactory {
        volume: settings.volume,
    };
    let mut controller = MediaController::with_settings(factory, Arc::new(resources), &settings);

    let (listener, mut events) = ChannelListener::new();
    controller.set_playback_info_listener(Arc::new(listener));
    controller.set_media_list(&ids);

    let printer = thread::spawn(move || {
        while let Some(event) = events.blocking_recv() {
            if let Some(line) = format_event(&event) {
                println!("{}", line);
            }
        }
    });

    let mut state = AppState::new(controller, settings, options.settings_dir);
    state.controller.load_media();
    println!("{}", HELP);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{:#}", e);
                continue;
            }
        };

        let controller = &mut state.controller;
        match command {
            ConsoleCommand::Play => controller.play(),
            ConsoleCommand::Pause => controller.pause(),
            ConsoleCommand::Reset => controller.reset(),
            ConsoleCommand::Next => controller.next(),
            ConsoleCommand::Seek(ms) => controller.seek_to(ms),
            ConsoleCommand::Status => println!(
                "track {} of {}, playing: {}",
                controller.current_index() + 1,
                controller.media_list().len(),
                controller.is_playing()
            ),
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => break,
        }
        io::stdout().flush().ok();
    }

    state.controller.release();
    state.controller.clear_playback_info_listener();
    state.settings.save(&state.app_dir)?;
    drop(state);
    let _ = printer.join();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlaybackState;

    #[test]
    fn parses_transport_commands() {
        assert_eq!(ConsoleCommand::parse("play").unwrap(), Some(ConsoleCommand::Play));
        assert_eq!(ConsoleCommand::parse("  NEXT ").unwrap(), Some(ConsoleCommand::Next));
        assert_eq!(
            ConsoleCommand::parse("seek 5000").unwrap(),
            Some(ConsoleCommand::Seek(5000))
        );
        assert_eq!(ConsoleCommand::parse("q").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("").unwrap(), None);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ConsoleCommand::parse("rewind").is_err());
        assert!(ConsoleCommand::parse("seek").is_err());
        assert!(ConsoleCommand::parse("seek soon").is_err());
    }

    #[test]
    fn formats_events_for_the_terminal() {
        assert_eq!(
            format_event(&PlaybackEvent::PositionChanged { position_ms: 75_500 }).as_deref(),
            Some("position: 1:15")
        );
        assert_eq!(
            format_event(&PlaybackEvent::StateChanged { state: PlaybackState::Reset }).as_deref(),
            Some("state: RESET")
        );
        assert!(format_event(&PlaybackEvent::LogUpdated { message: "x".into() }).is_none());
    }
}
