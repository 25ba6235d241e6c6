use crate::config::MAX_TRACK_LIMIT;
use crate::{genre_for, EmotionLabel, MusicService, Result, TrackId};

/// Turns an emotion into a populated private playlist.
///
/// Calls are issued strictly in sequence and never retried. If playlist
/// creation succeeds but adding tracks fails, the empty playlist is left in
/// place.
#[derive(Debug)]
pub struct PlaylistBuilder<S> {
    service: S,
    track_limit: usize,
}

impl<S: MusicService> PlaylistBuilder<S> {
    pub fn new(service: S) -> Self {
        Self::with_track_limit(service, MAX_TRACK_LIMIT)
    }

    /// The limit is clamped to `1..=MAX_TRACK_LIMIT` so the catalog is never
    /// asked for an empty or oversized page.
    pub fn with_track_limit(service: S, track_limit: usize) -> Self {
        Self {
            service,
            track_limit: track_limit.clamp(1, MAX_TRACK_LIMIT),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Searches the catalog for the emotion's genre and returns up to the
    /// track limit ids in result order.
    pub fn recommend(&self, emotion: &EmotionLabel) -> Result<Vec<TrackId>> {
        let genre = genre_for(emotion);
        tracing::info!(%emotion, %genre, "recommending tracks");

        let mut tracks = self
            .service
            .search(&genre.search_query(), "track", self.track_limit)?;
        tracks.truncate(self.track_limit);
        Ok(tracks)
    }

    /// Creates a private playlist and adds `tracks` in order. Returns the
    /// playlist URL.
    pub fn create_playlist(&self, user_id: &str, name: &str, tracks: &[TrackId]) -> Result<String> {
        let playlist = self.service.user_playlist_create(user_id, name, false)?;
        self.service
            .user_playlist_add_tracks(user_id, &playlist.id, tracks)?;
        tracing::info!(playlist = %playlist.id, tracks = tracks.len(), "playlist populated");
        Ok(playlist.url)
    }

    /// Full sequence for one emotion: recommend, resolve the current user,
    /// create and populate.
    pub fn build_for(&self, emotion: &EmotionLabel) -> Result<String> {
        let tracks = self.recommend(emotion)?;
        let user_id = self.service.current_user()?;
        self.create_playlist(&user_id, &playlist_name(emotion), &tracks)
    }
}

/// `"<Emotion> Playlist"`, e.g. `"Happy Playlist"`.
pub fn playlist_name(emotion: &EmotionLabel) -> String {
    format!("{} Playlist", emotion.capitalized())
}
