mod control;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tonegen_backend::{CpalOutput, DeviceEnumerator, OscillatorEngine};
use tonegen_core::{AudioOutput, EngineConfig, Waveform};

use crate::control::{Command, Flow};

#[derive(Parser)]
#[command(name = "tonegen")]
#[command(about = "Wavetable tone generator: sine, sawtooth, square and triangle at any audible frequency")]
struct Cli {
    /// Initial frequency in Hz
    #[arg(short, long)]
    frequency: Option<u32>,
    /// Initial volume, 0-100
    #[arg(short, long)]
    volume: Option<u32>,
    /// Initial waveform: sine, sawtooth, square, triangle or 0-3
    #[arg(short, long)]
    waveform: Option<Waveform>,
    /// Output device name (substring match); the default output otherwise
    #[arg(short, long)]
    device: Option<String>,
    /// JSON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
    /// Start playing immediately
    #[arg(long)]
    play: bool,
    /// Play for this many seconds, then exit without reading commands
    #[arg(long)]
    duration: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_devices {
        let enumerator = DeviceEnumerator::new().context("failed to enumerate audio devices")?;
        enumerator.write_device_list(&mut io::stdout().lock())?;
        return Ok(());
    }

    let config = load_config(&cli)?;
    let engine = OscillatorEngine::new(CpalOutput::new(config.device.clone()), config);

    if let Some(secs) = cli.duration {
        let duration = Duration::try_from_secs_f64(secs).context("--duration must be a non-negative number of seconds")?;
        engine.play().context("failed to start playback")?;
        thread::sleep(duration);
        engine.stop();
        return Ok(());
    }

    if cli.play {
        if let Err(e) = engine.play() {
            log::error!("play failed: {}", e);
        }
    }

    run_interactive(&engine)
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    if let Some(hz) = cli.frequency {
        let clamped = hz.clamp(config.min_frequency, config.max_frequency);
        if clamped != hz {
            log::warn!("frequency {} Hz out of range, using {} Hz", hz, clamped);
        }
        config.default_frequency = clamped;
    }
    if let Some(volume) = cli.volume {
        config.default_volume = volume.min(tonegen_core::config::MAX_VOLUME);
    }
    if let Some(waveform) = cli.waveform {
        config.default_waveform = waveform;
    }
    if cli.device.is_some() {
        config.device = cli.device.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run_interactive<O: AudioOutput>(engine: &OscillatorEngine<O>) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "tonegen ready, type 'help' for commands")?;
    control::print_status(engine, &mut stdout)?;
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line.context("failed to read command")?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if control::execute(engine, command, &mut stdout)? == Flow::Quit {
                    return Ok(());
                }
            }
            Err(e) => writeln!(stdout, "{}", e)?,
        }
        stdout.flush()?;
    }

    // stdin closed
    engine.stop();
    Ok(())
}
