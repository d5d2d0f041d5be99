use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use sonify_core::{
    aggregate_range, narration, resolve_active_channels, AccessibilityMode, AppConfig,
    AudioEngine, Bucket, Category, ChannelSet, ChannelSettings, ExploreOptions, FrameRequest,
    MixerOutput, PlaybackScheduler, PlaybackSpeed, Reading, SonificationEvent, SonifyError,
    Strategy, TimeRange, ToneAnalyzer, TouchExplorer,
};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "device")]
mod device;

fn main() -> sonify_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Aggregate { series } => run_aggregate(&series),
        Commands::Sonify { series, playback } => run_sonify(&config, &series, &playback),
        Commands::Render {
            series,
            playback,
            output,
            verify,
        } => run_render(&config, &series, &playback, &output, verify),
        Commands::Explore {
            series,
            channels,
            positions,
        } => run_explore(&config, &series, &channels, &positions),
        Commands::Channels { channels } => print_json(&channels.resolve()),
        #[cfg(feature = "device")]
        Commands::Play { series, playback } => run_play(&config, &series, &playback),
    }
}

fn run_aggregate(series: &SeriesArgs) -> sonify_core::Result<()> {
    let (_, buckets) = series.load()?;
    print_json(&buckets)
}

fn run_sonify(
    config: &AppConfig,
    series: &SeriesArgs,
    playback: &PlaybackArgs,
) -> sonify_core::Result<()> {
    let (category, buckets) = series.load()?;
    let events = map_events(config, category, &buckets, playback)?;
    print_json(&events)
}

fn run_render(
    config: &AppConfig,
    series: &SeriesArgs,
    playback: &PlaybackArgs,
    output: &Path,
    verify: bool,
) -> sonify_core::Result<()> {
    let (category, buckets) = series.load()?;
    let events = map_events(config, category, &buckets, playback)?;
    println!(
        "{}",
        narration::describe_playback(
            category,
            events.len(),
            sonify_core::sequence_duration(&events),
            playback.speed
        )
    );

    let mixer = MixerOutput::new(config.audio.sample_rate);
    let mut scheduler =
        PlaybackScheduler::from_config(AudioEngine::new(mixer.clone()), &config.audio);
    let handle = scheduler.start(&events)?;
    let session_start = scheduler.session_start(handle).unwrap_or_default();
    scheduler.on_progress(handle, |progress| {
        tracing::trace!(progress, "render progress");
    })?;

    let mut samples = Vec::new();
    while scheduler.tick() == FrameRequest::Continue {
        samples.extend(mixer.render(config.audio.render_block)?);
    }

    write_wav(output, config.audio.sample_rate, &samples)?;
    tracing::info!(
        path = %output.display(),
        frames = samples.len(),
        events = events.len(),
        "rendered session"
    );

    if verify {
        let reports = ToneAnalyzer::new(config.audio.sample_rate).analyse_events(
            &samples,
            std::time::Duration::ZERO,
            session_start,
            &events,
        )?;
        print_json(&reports)?;
    }
    Ok(())
}

fn run_explore(
    config: &AppConfig,
    series: &SeriesArgs,
    channels: &ChannelArgs,
    positions: &[f64],
) -> sonify_core::Result<()> {
    let (category, buckets) = series.load()?;
    let channels = channels.resolve();
    if !channels.explores() {
        tracing::warn!("no exploration channel is enabled");
    }

    let mut explorer = TouchExplorer::new(buckets, category)
        .with_options(ExploreOptions::from_channels(&channels, config));

    for &position in positions {
        if let Some(cue) = explorer.on_pointer_move(position) {
            let haptic = cue
                .haptic
                .map(|haptic| format!(" [{haptic:?}]"))
                .unwrap_or_default();
            println!(
                "{position:.3} -> #{}: {}{haptic}",
                cue.index,
                narration::describe_cue(&cue, category)
            );
        }
    }

    match explorer.on_pointer_release() {
        Some(report) => println!("{}", narration::describe_summary(&report, category)),
        None => println!("Nothing explored."),
    }
    Ok(())
}

#[cfg(feature = "device")]
fn run_play(
    config: &AppConfig,
    series: &SeriesArgs,
    playback: &PlaybackArgs,
) -> sonify_core::Result<()> {
    let (category, buckets) = series.load()?;
    let events = map_events(config, category, &buckets, playback)?;
    println!(
        "{}",
        narration::describe_playback(
            category,
            events.len(),
            sonify_core::sequence_duration(&events),
            playback.speed
        )
    );
    device::play(&config.audio, &events)
}

fn map_events(
    config: &AppConfig,
    category: Category,
    buckets: &[Bucket],
    playback: &PlaybackArgs,
) -> sonify_core::Result<Vec<SonificationEvent>> {
    let channels = playback.channels.resolve();
    let Some(channel) = channels.playback else {
        return Err(SonifyError::unavailable(format!(
            "{:?} mode has no playback channel",
            playback.channels.mode
        )));
    };
    config
        .mapper(&channel)
        .map_to_events(buckets, category, playback.speed.multiplier())
}

fn write_wav(path: &Path, sample_rate: u32, samples: &[f32]) -> sonify_core::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_error)?;
    for sample in samples {
        writer.write_sample(*sample).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)
}

fn wav_error(err: hound::Error) -> SonifyError {
    match err {
        hound::Error::IoError(err) => SonifyError::Io(err),
        other => SonifyError::Io(std::io::Error::other(other)),
    }
}

fn print_json(value: &impl serde::Serialize) -> sonify_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Health data sonification engine", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bucket readings for a chart time range and print the buckets.
    Aggregate {
        #[command(flatten)]
        series: SeriesArgs,
    },
    /// Print the tone events a playback session would schedule.
    Sonify {
        #[command(flatten)]
        series: SeriesArgs,
        #[command(flatten)]
        playback: PlaybackArgs,
    },
    /// Play a session offline and write it to a WAV file.
    Render {
        #[command(flatten)]
        series: SeriesArgs,
        #[command(flatten)]
        playback: PlaybackArgs,
        /// Destination WAV path.
        #[arg(short, long)]
        output: PathBuf,
        /// Measure each rendered tone and print the report.
        #[arg(long)]
        verify: bool,
    },
    /// Replay a pointer gesture over the chart and print its cues.
    Explore {
        #[command(flatten)]
        series: SeriesArgs,
        #[command(flatten)]
        channels: ChannelArgs,
        /// Normalised pointer positions, comma separated.
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        positions: Vec<f64>,
    },
    /// Show which output channels a mode enables.
    Channels {
        #[command(flatten)]
        channels: ChannelArgs,
    },
    /// Play a session on the default output device.
    #[cfg(feature = "device")]
    Play {
        #[command(flatten)]
        series: SeriesArgs,
        #[command(flatten)]
        playback: PlaybackArgs,
    },
}

#[derive(Args, Debug)]
struct SeriesArgs {
    /// JSON array of readings.
    #[arg(short, long)]
    input: PathBuf,
    /// Category to keep; defaults to the first reading's category.
    #[arg(long)]
    category: Option<Category>,
    /// Chart time range token (H, D, W, M, 6M, Y).
    #[arg(short, long, default_value = "D")]
    range: TimeRange,
    /// Bucket strategy; defaults to the category's usual one.
    #[arg(long)]
    strategy: Option<Strategy>,
}

impl SeriesArgs {
    fn load(&self) -> sonify_core::Result<(Category, Vec<Bucket>)> {
        let json = std::fs::read_to_string(&self.input)?;
        let readings: Vec<Reading> = serde_json::from_str(&json)?;

        let category = self
            .category
            .or_else(|| readings.first().map(|reading| reading.category))
            .ok_or_else(|| {
                SonifyError::invalid("no readings to infer a category from; pass --category")
            })?;
        let readings: Vec<Reading> = readings
            .into_iter()
            .filter(|reading| reading.category == category)
            .collect();

        let strategy = self
            .strategy
            .unwrap_or_else(|| Strategy::default_for(category));
        let buckets = aggregate_range(&readings, self.range, strategy)?;
        tracing::info!(
            %category,
            readings = readings.len(),
            buckets = buckets.len(),
            range = self.range.token(),
            "loaded series"
        );
        Ok((category, buckets))
    }
}

#[derive(Args, Debug)]
struct ChannelArgs {
    /// Accessibility mode.
    #[arg(short, long, default_value = "hybrid")]
    mode: AccessibilityMode,
    /// Turn every audio channel off.
    #[arg(long)]
    no_audio: bool,
    /// Turn haptic cues off.
    #[arg(long)]
    no_haptics: bool,
}

impl ChannelArgs {
    fn resolve(&self) -> ChannelSet {
        resolve_active_channels(
            self.mode,
            ChannelSettings {
                audio_enabled: !self.no_audio,
                haptics_enabled: !self.no_haptics,
            },
        )
    }
}

#[derive(Args, Debug)]
struct PlaybackArgs {
    #[command(flatten)]
    channels: ChannelArgs,
    /// Playback speed preset (slow, normal, fast, very-fast).
    #[arg(short, long, default_value = "normal")]
    speed: PlaybackSpeed,
}
