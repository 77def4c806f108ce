use clap::Parser;
use std::path::PathBuf;

use audioplayer_lib::console::ConsoleOptions;

/// Play a directory of audio files from the terminal
#[derive(Parser, Debug)]
#[command(name = "audioplayer", version)]
struct Args {
    /// Directory holding the tracks (overrides the saved setting)
    #[arg(short, long)]
    resources: Option<PathBuf>,

    /// Directory holding settings.json
    #[arg(long, default_value = ".")]
    settings_dir: PathBuf,

    /// Position refresh interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    audioplayer_lib::run(ConsoleOptions {
        resources: args.resources,
        settings_dir: args.settings_dir,
        interval_ms: args.interval_ms,
    })
}
