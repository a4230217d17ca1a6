//! Line-oriented control surface: parses commands typed on stdin and drives
//! the engine with them.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use tonegen_backend::{OscillatorEngine, PlaybackState};
use tonegen_core::config::{MAX_FREQUENCY, MAX_VOLUME, MIN_FREQUENCY};
use tonegen_core::waveform::ParseWaveformError;
use tonegen_core::{AudioOutput, Waveform};

/// Largest slider position; position 0 is `MIN_FREQUENCY`.
pub const SLIDER_MAX: u32 = MAX_FREQUENCY - MIN_FREQUENCY;

pub fn slider_to_frequency(pos: u32) -> u32 {
    pos.min(SLIDER_MAX) + MIN_FREQUENCY
}

pub fn frequency_to_slider(hz: u32) -> u32 {
    hz.clamp(MIN_FREQUENCY, MAX_FREQUENCY) - MIN_FREQUENCY
}

pub const HELP: &str = "\
commands:
  play                 start or resume playback
  pause                pause, keeping the device open
  toggle               play if paused or stopped, pause if playing
  stop                 stop and release the device
  freq <hz>            set the frequency
  slider <pos>         set the frequency from a slider position (0..=19980)
  vol <pct>            set the volume, 0..=100
  wave <name|index>    sine, sawtooth, square, triangle (or 0..=3)
  status               show the current state
  help                 show this help
  quit                 stop and exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Stop,
    Frequency(u32),
    Slider(u32),
    Volume(u32),
    Wave(Waveform),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    MissingArgument(&'static str),
    InvalidNumber { command: &'static str, value: String },
    InvalidWaveform(String),
    TrailingInput(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::Unknown(word) => write!(f, "unknown command '{}', try 'help'", word),
            Self::MissingArgument(command) => write!(f, "'{}' needs an argument", command),
            Self::InvalidNumber { command, value } => {
                write!(f, "'{}' expects a non-negative integer, got '{}'", command, value)
            }
            Self::InvalidWaveform(message) => f.write_str(message),
            Self::TrailingInput(rest) => write!(f, "unexpected input '{}'", rest),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ParseWaveformError> for CommandError {
    fn from(e: ParseWaveformError) -> Self {
        Self::InvalidWaveform(e.to_string())
    }
}

fn number(command: &'static str, value: Option<&str>) -> Result<u32, CommandError> {
    let value = value.ok_or(CommandError::MissingArgument(command))?;
    value.parse().map_err(|_| CommandError::InvalidNumber {
        command,
        value: value.to_string(),
    })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let head = words.next().ok_or(CommandError::Empty)?;
        let arg = words.next();

        let command = match head.to_ascii_lowercase().as_str() {
            "play" => Command::Play,
            "pause" => Command::Pause,
            "toggle" | "t" => Command::Toggle,
            "stop" => Command::Stop,
            "freq" | "f" => Command::Frequency(number("freq", arg)?),
            "slider" => Command::Slider(number("slider", arg)?),
            "vol" | "v" => Command::Volume(number("vol", arg)?),
            "wave" | "w" => Command::Wave(arg.ok_or(CommandError::MissingArgument("wave"))?.parse()?),
            "status" | "s" => Command::Status,
            "help" | "h" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        let takes_arg = matches!(
            command,
            Command::Frequency(_) | Command::Slider(_) | Command::Volume(_) | Command::Wave(_)
        );
        let extra = if takes_arg { words.next() } else { arg };
        match extra {
            Some(rest) => Err(CommandError::TrailingInput(rest.to_string())),
            None => Ok(command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Apply one command. Playback failures are reported to `out`, not returned;
/// only I/O errors on `out` end the session.
pub fn execute<O, W>(engine: &OscillatorEngine<O>, command: Command, out: &mut W) -> std::io::Result<Flow>
where
    O: AudioOutput,
    W: Write,
{
    match command {
        Command::Play => start(engine, out)?,
        Command::Pause => engine.pause(),
        Command::Toggle => {
            if engine.state() == PlaybackState::Playing {
                engine.pause();
            } else {
                start(engine, out)?;
            }
        }
        Command::Stop => engine.stop(),
        Command::Frequency(hz) => {
            let range = engine.config().frequency_range();
            engine.set_frequency(hz.clamp(*range.start(), *range.end()));
            writeln!(out, "frequency: {} Hz", engine.frequency())?;
        }
        Command::Slider(pos) => {
            engine.set_frequency(slider_to_frequency(pos));
            writeln!(
                out,
                "slider: {} -> {} Hz",
                frequency_to_slider(engine.frequency()),
                engine.frequency()
            )?;
        }
        Command::Volume(pct) => {
            engine.set_volume(pct.min(MAX_VOLUME));
            writeln!(out, "volume: {}%", engine.volume())?;
        }
        Command::Wave(waveform) => {
            engine.set_waveform_kind(waveform);
            writeln!(out, "waveform: {}", engine.waveform())?;
        }
        Command::Status => print_status(engine, out)?,
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => {
            engine.stop();
            return Ok(Flow::Quit);
        }
    }
    Ok(Flow::Continue)
}

fn start<O: AudioOutput, W: Write>(engine: &OscillatorEngine<O>, out: &mut W) -> std::io::Result<()> {
    if let Err(e) = engine.play() {
        log::error!("play failed: {}", e);
        writeln!(out, "could not start playback: {}", e)?;
    }
    Ok(())
}

pub fn print_status<O: AudioOutput, W: Write>(engine: &OscillatorEngine<O>, out: &mut W) -> std::io::Result<()> {
    let stats = engine.stats();
    writeln!(
        out,
        "{:?} | {} Hz (slider {}) | {} | volume {}% | output {}",
        engine.state(),
        engine.frequency(),
        frequency_to_slider(engine.frequency()),
        engine.waveform(),
        engine.volume(),
        engine.sink_state()
    )?;
    writeln!(
        out,
        "written: {} frames in {} blocks, {} write errors, write time {:.0}% of block",
        stats.frames_written, stats.blocks_written, stats.write_errors, stats.blocked_percent
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonegen_core::EngineConfig;
    use tonegen_core::sink::MemoryOutput;

    fn engine() -> OscillatorEngine<MemoryOutput> {
        let config = EngineConfig {
            buffer_frames: Some(441),
            ..EngineConfig::default()
        };
        OscillatorEngine::new(MemoryOutput::new(441), config)
    }

    #[test]
    fn test_slider_mapping() {
        assert_eq!(slider_to_frequency(0), MIN_FREQUENCY);
        assert_eq!(slider_to_frequency(420), 440);
        assert_eq!(slider_to_frequency(SLIDER_MAX), MAX_FREQUENCY);
        assert_eq!(slider_to_frequency(u32::MAX), MAX_FREQUENCY);
        assert_eq!(frequency_to_slider(440), 420);
        assert_eq!(frequency_to_slider(5), 0);
        assert_eq!(frequency_to_slider(30_000), SLIDER_MAX);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!("play".parse::<Command>(), Ok(Command::Play));
        assert_eq!("  PAUSE ".parse::<Command>(), Ok(Command::Pause));
        assert_eq!("freq 1000".parse::<Command>(), Ok(Command::Frequency(1000)));
        assert_eq!("slider 0".parse::<Command>(), Ok(Command::Slider(0)));
        assert_eq!("vol 75".parse::<Command>(), Ok(Command::Volume(75)));
        assert_eq!("wave square".parse::<Command>(), Ok(Command::Wave(Waveform::Square)));
        assert_eq!("wave 3".parse::<Command>(), Ok(Command::Wave(Waveform::Triangle)));
        assert_eq!("q".parse::<Command>(), Ok(Command::Quit));
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        assert_eq!("".parse::<Command>(), Err(CommandError::Empty));
        assert_eq!("freq".parse::<Command>(), Err(CommandError::MissingArgument("freq")));
        assert!(matches!("freq abc".parse::<Command>(), Err(CommandError::InvalidNumber { .. })));
        assert!(matches!("vol -5".parse::<Command>(), Err(CommandError::InvalidNumber { .. })));
        assert!(matches!("vol 99999999999".parse::<Command>(), Err(CommandError::InvalidNumber { .. })));
        assert!(matches!("wave noise".parse::<Command>(), Err(CommandError::InvalidWaveform(_))));
        assert!(matches!("play now".parse::<Command>(), Err(CommandError::TrailingInput(_))));
        assert!(matches!("freq 1 2".parse::<Command>(), Err(CommandError::TrailingInput(_))));
        assert!(matches!("jump".parse::<Command>(), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn test_execute_setters() {
        let engine = engine();
        let mut out = Vec::new();

        execute(&engine, Command::Frequency(50_000), &mut out).unwrap();
        assert_eq!(engine.frequency(), MAX_FREQUENCY);
        execute(&engine, Command::Slider(80), &mut out).unwrap();
        assert_eq!(engine.frequency(), 100);
        execute(&engine, Command::Volume(150), &mut out).unwrap();
        assert_eq!(engine.volume(), 100);
        execute(&engine, Command::Wave(Waveform::Sawtooth), &mut out).unwrap();
        assert_eq!(engine.waveform(), Waveform::Sawtooth);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("frequency: 20000 Hz"));
        assert!(text.contains("volume: 100%"));
    }

    #[test]
    fn test_toggle_and_quit() {
        let engine = engine();
        let mut out = Vec::new();

        execute(&engine, Command::Toggle, &mut out).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        execute(&engine, Command::Toggle, &mut out).unwrap();
        assert_eq!(engine.state(), PlaybackState::Paused);

        assert_eq!(execute(&engine, Command::Quit, &mut out).unwrap(), Flow::Quit);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.output().log().releases, 1);
    }

    #[test]
    fn test_play_failure_is_reported() {
        let engine = engine();
        engine.output().fail_next_open();
        let mut out = Vec::new();

        assert_eq!(execute(&engine, Command::Play, &mut out).unwrap(), Flow::Continue);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(String::from_utf8(out).unwrap().contains("could not start playback"));
    }

    #[test]
    fn test_status_lists_parameters() {
        let engine = engine();
        let mut out = Vec::new();
        execute(&engine, Command::Status, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("440 Hz (slider 420)"));
        assert!(text.contains("volume 50%"));
        assert!(text.contains("output uninitialized"));
    }
}
