use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use drill_shield::audio::{FileTrackLoader, TrackLoader, TrackRef};
use drill_shield::config::{AppConfig, PRESET_NAMES};
use drill_shield::control::{simulate_readings, SessionStatus, StatusEvent};
use drill_shield::engine::backend::{list_devices, AudioBackend, CpalBackend, StubBackend};
use drill_shield::engine::{render_offline, write_wav, PlaybackSession};
use futures::StreamExt;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "drill_shield",
    about = "Adaptive masking: boost the music when the microphone hears drilling"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/drill_shield.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Replace the configured signal chain with a built-in preset
    #[arg(long, global = true)]
    preset: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a track with live masking until ctrl-c
    Play(PlayArgs),
    /// Print per-tick controller reports for a scripted reading sequence
    Simulate(SimulateArgs),
    /// Render a track through the chain offline and write a WAV file
    Render(RenderArgs),
    /// List built-in presets
    Presets {
        /// Print each preset's chain as JSON
        #[arg(long)]
        json: bool,
    },
    /// List audio devices on the default host
    Devices {
        #[arg(long)]
        json: bool,
    },
    /// List tracks in the configured catalog
    Tracks,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Default system devices
    Cpal,
    /// No devices; synthetic microphone bursts
    Stub,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Catalog name or file path (defaults to the catalog's default track)
    track: Option<String>,
    #[arg(long, value_enum, default_value_t = BackendKind::Cpal)]
    backend: BackendKind,
    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<f32>,
    /// Print every status event as a JSON line
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ReadingArgs {
    /// Comma-separated detection readings, one per tick
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    readings: Vec<f32>,
    /// JSON array of readings (used when --readings is absent)
    #[arg(long)]
    readings_file: Option<PathBuf>,
}

impl ReadingArgs {
    fn resolve(&self) -> Result<Vec<f32>> {
        if !self.readings.is_empty() {
            return Ok(self.readings.clone());
        }
        let path = self
            .readings_file
            .as_ref()
            .ok_or_else(|| anyhow!("provide --readings or --readings-file"))?;
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Args, Debug)]
struct SimulateArgs {
    #[command(flatten)]
    readings: ReadingArgs,
    /// Seconds per tick
    #[arg(long, default_value_t = 0.016)]
    dt: f32,
    /// Sample rate the chain is built for
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,
    /// Pretty-print a single JSON array instead of JSON lines
    #[arg(long)]
    pretty: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Catalog name or file path
    track: String,
    #[command(flatten)]
    readings: ReadingArgs,
    /// Milliseconds per tick
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
    /// Output WAV path
    #[arg(long, short)]
    output: PathBuf,
    /// Write the per-tick trace as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> ExitCode {
    drill_shield::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.preset.as_deref())?;

    match cli.command {
        Commands::Play(args) => run_play(config, args),
        Commands::Simulate(args) => run_simulate(&config, args),
        Commands::Render(args) => run_render(&config, args),
        Commands::Presets { json } => run_presets(json),
        Commands::Devices { json } => run_devices(json),
        Commands::Tracks => run_tracks(&config),
    }
}

fn load_config(path: Option<&Path>, preset: Option<&str>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::try_load_from_file(path).map_err(|e| anyhow!(e))?,
        None => AppConfig::load(),
    };
    if let Some(name) = preset {
        let preset = AppConfig::preset(name).ok_or_else(|| {
            anyhow!(
                "unknown preset '{}' (expected one of {})",
                name,
                PRESET_NAMES.join(", ")
            )
        })?;
        config.chain = preset.chain;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run_play(config: AppConfig, args: PlayArgs) -> Result<ExitCode> {
    let track = match args.track {
        Some(name) => TrackRef::new(name),
        None => config
            .tracks
            .default_track()
            .ok_or_else(|| anyhow!("no track given and the catalog has no default"))?,
    };

    let stub = StubBackend::new();
    let backend: Arc<dyn AudioBackend> = match args.backend {
        BackendKind::Cpal => Arc::new(CpalBackend::new()),
        BackendKind::Stub => Arc::new(stub.clone()),
    };
    let loader = Arc::new(FileTrackLoader::new(config.tracks.clone()));
    let mut session = PlaybackSession::new(config, backend, loader);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    let mut statuses = Box::pin(session.status_stream());
    if let Err(err) = session.start(&track) {
        bail!("failed to start '{}': {}", track, err);
    }

    let stub_feed = (args.backend == BackendKind::Stub).then_some(stub);
    let limit = args
        .duration_secs
        .filter(|secs| secs.is_finite())
        .map(|secs| Duration::from_secs_f32(secs.clamp(0.0, 86_400.0)));
    let mut last_status: Option<SessionStatus> = None;

    runtime.block_on(async {
        let started = Instant::now();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let stop_at = tokio::time::sleep(limit.unwrap_or(Duration::from_secs(3_600)));
        tokio::pin!(stop_at);
        let mut feed = tokio::time::interval(Duration::from_millis(20));

        loop {
            tokio::select! {
                _ = &mut ctrl_c => break,
                _ = &mut stop_at, if limit.is_some() => break,
                Some(event) = statuses.next() => {
                    print_status(&event, args.json, &mut last_status);
                }
                _ = feed.tick(), if stub_feed.is_some() => {
                    if let Some(stub) = &stub_feed {
                        feed_stub(stub, started.elapsed());
                    }
                }
            }
        }

        session.stop().context("stopping session")?;
        // Flush what the stop published
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), statuses.next()).await
        {
            print_status(&event, args.json, &mut last_status);
            if event.status == SessionStatus::Stopped {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(ExitCode::SUCCESS)
}

/// Two seconds of silence, two seconds of drill-like noise, repeated
fn feed_stub(stub: &StubBackend, elapsed: Duration) {
    const BLOCK: usize = 960;
    if (elapsed.as_secs() / 2) % 2 == 1 {
        stub.push_white_noise(0.5, BLOCK);
    } else {
        stub.push_microphone(&[0.0; BLOCK]);
    }
    stub.render_output(BLOCK);
}

fn print_status(event: &StatusEvent, json: bool, last: &mut Option<SessionStatus>) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }
    if *last == Some(event.status) {
        return;
    }
    *last = Some(event.status);
    match event.reading {
        Some(reading) => println!("[{:>7} ms] {} (reading {:.1})", event.timestamp_ms, event.label, reading),
        None => println!("[{:>7} ms] {}", event.timestamp_ms, event.label),
    }
}

fn run_simulate(config: &AppConfig, args: SimulateArgs) -> Result<ExitCode> {
    let readings = args.readings.resolve()?;
    let steps = simulate_readings(config, &readings, args.dt, args.sample_rate)
        .context("running simulation")?;

    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&steps)?);
    } else {
        for step in &steps {
            println!("{}", serde_json::to_string(step)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct RenderReport<'a> {
    track: &'a str,
    sample_rate: u32,
    channels: u16,
    duration_secs: f32,
    ticks: &'a [drill_shield::engine::RenderTick],
}

fn run_render(config: &AppConfig, args: RenderArgs) -> Result<ExitCode> {
    let readings = args.readings.resolve()?;
    let loader = FileTrackLoader::new(config.tracks.clone());
    let track = loader
        .load(&TrackRef::new(args.track.as_str()))
        .with_context(|| format!("loading {}", args.track))?;

    let tick_secs = args.tick_ms as f32 / 1000.0;
    let render = render_offline(config, track, &readings, tick_secs).context("rendering")?;
    write_wav(&args.output, &render).context("writing output")?;

    if let Some(path) = args.report {
        let report = RenderReport {
            track: &args.track,
            sample_rate: render.sample_rate,
            channels: render.channels,
            duration_secs: render.duration_secs(),
            ticks: &render.ticks,
        };
        fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    println!(
        "Wrote {} ({:.2}s, {} Hz, {} ch)",
        args.output.display(),
        render.duration_secs(),
        render.sample_rate,
        render.channels
    );
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct PresetListing {
    name: &'static str,
    description: &'static str,
    config: AppConfig,
}

fn run_presets(json: bool) -> Result<ExitCode> {
    let presets: Vec<PresetListing> = PRESET_NAMES
        .iter()
        .filter_map(|&name| {
            Some(PresetListing {
                name,
                description: AppConfig::preset_description(name)?,
                config: AppConfig::preset(name)?,
            })
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&presets)?);
    } else {
        for preset in &presets {
            println!("{:<10} {}", preset.name, preset.description);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_devices(json: bool) -> Result<ExitCode> {
    let devices = list_devices().context("listing devices")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(ExitCode::SUCCESS);
    }
    if devices.is_empty() {
        println!("No audio devices found");
    }
    for device in devices {
        println!(
            "{} {}{} ({} Hz, {} ch)",
            if device.is_input { "in " } else { "out" },
            device.name,
            if device.is_default { " [default]" } else { "" },
            device.sample_rate.map_or("?".to_string(), |r| r.to_string()),
            device.channels.map_or("?".to_string(), |c| c.to_string()),
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run_tracks(config: &AppConfig) -> Result<ExitCode> {
    let catalog = &config.tracks;
    if catalog.tracks.is_empty() {
        println!("No tracks configured");
        return Ok(ExitCode::SUCCESS);
    }
    let default = catalog.default_track();
    for entry in &catalog.tracks {
        let marker = if default.as_ref().map(|t| t.as_str()) == Some(entry.name.as_str()) {
            "*"
        } else {
            " "
        };
        match &entry.description {
            Some(description) => println!(
                "{} {:<16} {} - {}",
                marker,
                entry.name,
                entry.path.display(),
                description
            ),
            None => println!("{} {:<16} {}", marker, entry.name, entry.path.display()),
        }
    }
    Ok(ExitCode::SUCCESS)
}
