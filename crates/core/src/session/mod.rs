use std::io::Write;

use crate::{CaptureOutcome, MusicService, PlaylistBuilder, Result};

pub const NO_EMOTION_MESSAGE: &str = "No emotion detected, or user quit.";

/// Top-level sequence after capture: when an emotion was confirmed, connect to
/// the music service, build the playlist and report its URL. `connect` runs
/// only when there is something to build.
///
/// Service failures are returned as errors and are not folded into the
/// "no emotion" message.
pub fn run_session<S, F, W>(outcome: CaptureOutcome, connect: F, out: &mut W) -> Result<Option<String>>
where
    S: MusicService,
    F: FnOnce() -> Result<PlaylistBuilder<S>>,
    W: Write,
{
    let Some(emotion) = outcome.into_label() else {
        writeln!(out, "{NO_EMOTION_MESSAGE}")?;
        return Ok(None);
    };

    writeln!(out, "Detected Emotion: {emotion}")?;
    out.flush()?;

    let builder = connect()?;
    let url = builder.build_for(&emotion)?;
    writeln!(out, "Playlist created! Check it out here: {url}")?;
    Ok(Some(url))
}
