mod device;
mod wav;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use face_theremin_core::mapping::DEFAULT_WARP;
use face_theremin_core::{
    nearest_note, solfege_of, AppConfig, AudioOutput, Curve, DetectionTrace, MelodySequence, MelodySequencer,
    RefreshClock, ScriptedCamera, ScriptedDetector, Session, StepOutcome, SynthGraph, ToneEngine,
};
use tracing_subscriber::EnvFilter;

use device::DeviceOutput;
use wav::WavOutput;

fn main() -> face_theremin_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Trace {
            trace,
            sink,
            config,
            curve,
            seconds,
        } => run_trace(&trace, &sink, config.as_deref(), curve, seconds),
        Commands::Melody { sink, config } => run_melody(&sink, config.as_deref()),
        Commands::Note { frequency } => {
            print_note(frequency);
            Ok(())
        }
        Commands::Map {
            relative_area,
            config,
            curve,
        } => run_map(relative_area, config.as_deref(), curve),
    }
}

fn load_config(
    path: Option<&Path>,
    curve: Option<CurveArg>,
) -> face_theremin_core::Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(curve) = curve {
        config.mapping.curve = curve.into();
    }
    config.validate()?;
    Ok(config)
}

/// Builds a graph whose clamp range is the mapping's output range.
fn build_engine<O: AudioOutput>(config: &AppConfig, output: O) -> SynthGraph<O> {
    SynthGraph::new(
        config.audio.clone(),
        (config.mapping.output_min, config.mapping.output_max),
        output,
    )
}

/// Renders `seconds` of audio, in wall-clock time when `realtime` is set.
fn render_for(
    engine: &mut dyn ToneEngine,
    seconds: f64,
    realtime: bool,
) -> face_theremin_core::Result<()> {
    if !realtime {
        return engine.advance(seconds);
    }
    const CHUNK: f64 = 0.02;
    let mut remaining = seconds;
    while remaining > 0.0 {
        let step = remaining.min(CHUNK);
        engine.advance(step)?;
        thread::sleep(Duration::from_secs_f64(step));
        remaining -= step;
    }
    Ok(())
}

fn run_trace(
    trace_path: &Path,
    sink: &SinkArgs,
    config_path: Option<&Path>,
    curve: Option<CurveArg>,
    seconds: Option<f64>,
) -> face_theremin_core::Result<()> {
    let config = load_config(config_path, curve)?;
    let trace = DetectionTrace::load(trace_path)?;
    let duration_ms = seconds
        .map(|seconds| seconds * 1000.0)
        .unwrap_or_else(|| trace.duration_ms() + 1000.0);
    tracing::info!(?trace_path, duration_ms, live = sink.live, "replaying detection trace");

    match &sink.output {
        Some(path) => {
            let output = replay_trace(&config, trace, duration_ms, WavOutput::new(path), false)?;
            let written = output.finalize()?;
            tracing::info!(?path, written, "WAV written");
        }
        None => {
            replay_trace(&config, trace, duration_ms, DeviceOutput::new(), true)?;
        }
    }
    Ok(())
}

fn replay_trace<O: AudioOutput>(
    config: &AppConfig,
    trace: DetectionTrace,
    duration_ms: f64,
    output: O,
    realtime: bool,
) -> face_theremin_core::Result<O> {
    let camera = ScriptedCamera::new(trace.frame_width, trace.frame_height);
    let mut session = Session::new(
        build_engine(config, output),
        camera,
        ScriptedDetector::new(trace),
        config.mapping,
        &config.sampler,
    )?;

    if let Err(err) = session.setup() {
        if let Some(notice) = session.permission_notice() {
            eprintln!("{notice}");
        }
        return Err(err);
    }

    let mut clock = RefreshClock::new(config.sampler.refresh_rate);
    session.start_detection(&mut clock)?;

    let frame_seconds = clock.interval_ms() / 1000.0;
    let mut last_note = None;
    while clock.now_ms() < duration_ms {
        if let Some((handle, timestamp)) = clock.advance() {
            if session.on_frame(handle, timestamp, &mut clock).is_some() {
                let readout = session.readout();
                if last_note != Some(readout.note) {
                    tracing::info!(timestamp_ms = timestamp, "{readout}");
                    last_note = Some(readout.note);
                }
            }
        }
        session.advance_audio(frame_seconds)?;
        if realtime {
            thread::sleep(Duration::from_secs_f64(frame_seconds));
        }
    }

    let accepted = session.sampler().accepted();
    let mut engine = session.teardown(&mut clock);
    render_for(
        &mut engine,
        f64::from(config.audio.ramp_down_seconds) * 2.0,
        realtime,
    )?;
    tracing::info!(accepted, "trace replay finished");
    Ok(engine.into_output())
}

fn run_melody(sink: &SinkArgs, config_path: Option<&Path>) -> face_theremin_core::Result<()> {
    let config = load_config(config_path, None)?;
    match &sink.output {
        Some(path) => {
            let output = play_melody(&config, WavOutput::new(path), false)?;
            let written = output.finalize()?;
            tracing::info!(?path, written, "WAV written");
        }
        None => {
            play_melody(&config, DeviceOutput::new(), true)?;
        }
    }
    Ok(())
}

fn play_melody<O: AudioOutput>(
    config: &AppConfig,
    output: O,
    realtime: bool,
) -> face_theremin_core::Result<O> {
    let mut engine = build_engine(config, output);
    let mut sequencer = MelodySequencer::new(MelodySequence::twinkle()?);
    tracing::info!(steps = sequencer.sequence().len(), live = realtime, "playing melody");

    engine.start()?;
    while let StepOutcome::Played {
        index,
        note,
        frequency_hz,
        duration_ms,
    } = sequencer.next(&mut engine)
    {
        tracing::info!(index, %note, solfege = %solfege_of(&note), frequency_hz, duration_ms, "step");
        render_for(&mut engine, f64::from(duration_ms) / 1000.0, realtime)?;
    }

    engine.stop();
    render_for(
        &mut engine,
        f64::from(config.audio.ramp_down_seconds) * 2.0,
        realtime,
    )?;
    tracing::info!("melody finished");
    Ok(engine.into_output())
}

fn print_note(frequency: f64) {
    let note = nearest_note(frequency);
    let solfege = solfege_of(note.name);
    println!("{:.2} Hz -> {} ({:.2} Hz) {}", frequency, note.name, note.frequency_hz, solfege);
    for token in solfege.unmapped() {
        println!("no solfège syllable for `{token}`");
    }
}

fn run_map(
    relative_area: f64,
    config_path: Option<&Path>,
    curve: Option<CurveArg>,
) -> face_theremin_core::Result<()> {
    let config = load_config(config_path, curve)?;
    let frequency = config.mapping.frequency_for(relative_area);
    println!("{relative_area} -> {frequency:.2} Hz");
    print_note(frequency);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Play tones by moving your face towards the camera", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where rendered audio goes: a WAV file or the default audio device.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SinkArgs {
    /// WAV file to write.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Play through the default audio device in real time.
    #[arg(long)]
    live: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CurveArg {
    Linear,
    Logarithmic,
}

impl From<CurveArg> for Curve {
    fn from(value: CurveArg) -> Self {
        match value {
            CurveArg::Linear => Curve::Linear,
            CurveArg::Logarithmic => Curve::Logarithmic { k: DEFAULT_WARP },
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded detection trace and render the resulting audio.
    Trace {
        /// JSON trace of detector answers.
        trace: PathBuf,
        #[command(flatten)]
        sink: SinkArgs,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the mapping curve from the configuration.
        #[arg(long, value_enum)]
        curve: Option<CurveArg>,
        /// Replay length; defaults to one second past the last trace entry.
        #[arg(short, long)]
        seconds: Option<f64>,
    },
    /// Render the built-in melody one step at a time.
    Melody {
        #[command(flatten)]
        sink: SinkArgs,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the nearest note and solfège for a frequency.
    Note {
        frequency: f64,
    },
    /// Print the frequency a relative face area maps to.
    Map {
        relative_area: f64,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        curve: Option<CurveArg>,
    },
}
