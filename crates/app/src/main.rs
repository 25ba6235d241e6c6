use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use moodtunes_core::{
    run_session, AppConfig, CameraConfig, CaptureOutcome, PlaylistBuilder, SpotifyClient,
    SpotifyConfig, SpotifyOAuth,
};
use tracing_subscriber::EnvFilter;

fn main() -> moodtunes_core::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AppConfig::load(&cli.config)?;
    config.apply_env()?;
    if let Some(index) = cli.camera {
        config.camera.device_index = index;
    }
    config.validate()?;

    tracing::info!(camera = config.camera.device_index, "starting emotion detection");
    let outcome = capture(&config.camera)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_session(outcome, || connect(&config.spotify), &mut out)?;
    Ok(())
}

#[cfg(feature = "opencv")]
fn capture(camera: &CameraConfig) -> moodtunes_core::Result<CaptureOutcome> {
    let mut capture = moodtunes_core::vision::open_capture_loop(camera)?;
    capture.run()
}

#[cfg(not(feature = "opencv"))]
fn capture(camera: &CameraConfig) -> moodtunes_core::Result<CaptureOutcome> {
    Err(moodtunes_core::MoodTunesError::DeviceUnavailable(format!(
        "camera {} cannot be opened: built without the `opencv` feature",
        camera.device_index
    )))
}

fn connect(spotify: &SpotifyConfig) -> moodtunes_core::Result<PlaylistBuilder<SpotifyClient>> {
    let oauth = SpotifyOAuth::new(spotify)?;
    let token = oauth.obtain_token(prompt_for_redirect)?;
    let client = SpotifyClient::new(token.access_token)?;
    Ok(PlaylistBuilder::with_track_limit(client, spotify.track_limit))
}

fn prompt_for_redirect(url: &str) -> moodtunes_core::Result<String> {
    let mut stderr = io::stderr();
    writeln!(stderr, "Go to the following URL: {url}")?;
    write!(stderr, "Enter the URL you were redirected to: ")?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .try_init();
}

/// Detects your mood on camera and builds a matching Spotify playlist.
///
/// Press `s` to confirm the detected emotion, `q` to quit.
///
/// Camera capture needs a build with `--features opencv` (and a system
/// OpenCV install); other builds stop with a camera-unavailable error.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Cli {
    /// JSON configuration file. Missing files fall back to defaults.
    #[arg(short, long, default_value = "moodtunes.json")]
    config: PathBuf,

    /// Camera index, overriding the configuration.
    #[arg(long)]
    camera: Option<i32>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long)]
    verbose: bool,
}
