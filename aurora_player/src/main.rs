//! Aurora sound player
//!
//! Plays one sound resource through the sound manager until it finishes,
//! which makes it handy for checking that an asset decodes and loops the way
//! the game expects.

use aurora_sound::audio::backend::create_backend;
use aurora_sound::audio::{SoundManager, SoundType};
use aurora_sound::config::{Config, SoundConfig};
use aurora_sound::foundation::logging;
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "aurora_player")]
#[command(about = "Play a WAVE, MP3 or Ogg Vorbis resource through the Aurora sound manager")]
struct Args {
    /// Sound resource to play
    file: PathBuf,

    /// Loop the sound until interrupted (or for --seconds)
    #[arg(short, long = "loop")]
    looping: bool,

    /// Sound type the channel is mixed as
    #[arg(short = 't', long = "type", default_value = "sfx")]
    sound_type: SoundType,

    /// Gain applied to the sound type
    #[arg(short, long)]
    gain: Option<f32>,

    /// Stop after this many seconds
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Sound configuration file (.toml or .ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_with_level(&args.log_level);

    let config = match &args.config {
        Some(path) => SoundConfig::load_from_file(path)?,
        None => SoundConfig::default(),
    };

    let manager = SoundManager::new(create_backend(), config)?;
    manager.init()?;

    if let Some(gain) = args.gain {
        manager.set_type_gain(args.sound_type, gain)?;
    }

    let file = BufReader::new(File::open(&args.file)?);
    let mut handle = manager.play_sound_file(Box::new(file), args.sound_type, args.looping)?;
    manager.start_channel(&handle)?;
    log::info!(
        "Playing {} as {}{}",
        args.file.display(),
        args.sound_type,
        if args.looping { " (looping)" } else { "" }
    );

    let deadline = args
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs_f64(seconds));
    while manager.is_playing(&handle)? {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::info!("Time limit reached");
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    manager.stop_channel(&mut handle)?;
    manager.deinit();
    Ok(())
}
