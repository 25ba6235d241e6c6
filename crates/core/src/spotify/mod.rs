mod auth;
#[cfg(test)]
mod stub;

pub use auth::{SpotifyOAuth, TokenCache, TokenInfo, SCOPE};

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{MoodTunesError, Result};

const API_BASE: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque catalog track identifier.
pub type TrackId = String;

/// Playlist returned by the service after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPlaylist {
    pub id: String,
    pub url: String,
}

/// Remote music catalog and playlist store. These are the four remote
/// operations the playlist builder consumes.
pub trait MusicService {
    /// Searches the catalog and returns up to `limit` ids in result order.
    fn search(&self, query: &str, kind: &str, limit: usize) -> Result<Vec<TrackId>>;

    fn current_user(&self) -> Result<String>;

    fn user_playlist_create(&self, user_id: &str, name: &str, public: bool)
        -> Result<CreatedPlaylist>;

    fn user_playlist_add_tracks(
        &self,
        user_id: &str,
        playlist_id: &str,
        track_ids: &[TrackId],
    ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<Paging<TrackObject>>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<Option<T>>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    id: String,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePlaylistRequest<'a> {
    name: &'a str,
    public: bool,
}

impl SearchResponse {
    fn into_track_ids(self, limit: usize) -> Vec<TrackId> {
        self.tracks
            .map(|paging| paging.items)
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|track| track.id)
            .take(limit)
            .collect()
    }
}

impl PlaylistObject {
    fn into_created(self) -> CreatedPlaylist {
        let url = self
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", self.id));
        CreatedPlaylist { id: self.id, url }
    }
}

/// Converts a bare id into a `spotify:track:` URI; URIs and URLs pass through.
pub fn track_uri(id: &str) -> String {
    if id.starts_with("spotify:") || id.starts_with("http") {
        id.to_string()
    } else {
        format!("spotify:track:{id}")
    }
}

/// Blocking Spotify Web API client authenticated with a bearer token.
///
/// 401 and 403 responses become [`MoodTunesError::Auth`], every other failure
/// [`MoodTunesError::ServiceUnavailable`]. No call is retried.
pub struct SpotifyClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl SpotifyClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(access_token, API_BASE)
    }

    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.bearer_auth(&self.access_token).send()?;
        check_status(response)
    }
}

/// Maps non-success statuses onto the crate error kinds.
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = format!("{status}: {}", body.trim());
    if status.as_u16() == 401 || status.as_u16() == 403 {
        Err(MoodTunesError::Auth(message))
    } else {
        Err(MoodTunesError::ServiceUnavailable(message))
    }
}

impl MusicService for SpotifyClient {
    fn search(&self, query: &str, kind: &str, limit: usize) -> Result<Vec<TrackId>> {
        tracing::info!(query, kind, limit, "searching catalog");
        let limit_param = limit.to_string();
        let request = self.client.get(self.url("/search")).query(&[
            ("q", query),
            ("type", kind),
            ("limit", limit_param.as_str()),
        ]);
        let body: SearchResponse = self.send(request)?.json()?;
        Ok(body.into_track_ids(limit))
    }

    fn current_user(&self) -> Result<String> {
        let user: UserObject = self.send(self.client.get(self.url("/me")))?.json()?;
        Ok(user.id)
    }

    fn user_playlist_create(
        &self,
        user_id: &str,
        name: &str,
        public: bool,
    ) -> Result<CreatedPlaylist> {
        tracing::info!(user_id, name, public, "creating playlist");
        let request = self
            .client
            .post(self.url(&format!("/users/{user_id}/playlists")))
            .json(&CreatePlaylistRequest { name, public });
        let playlist: PlaylistObject = self.send(request)?.json()?;
        Ok(playlist.into_created())
    }

    fn user_playlist_add_tracks(
        &self,
        user_id: &str,
        playlist_id: &str,
        track_ids: &[TrackId],
    ) -> Result<()> {
        if track_ids.is_empty() {
            return Ok(());
        }

        tracing::info!(user_id, playlist_id, tracks = track_ids.len(), "adding tracks");
        let uris: Vec<String> = track_ids.iter().map(|id| track_uri(id)).collect();
        let request = self
            .client
            .post(self.url(&format!("/playlists/{playlist_id}/tracks")))
            .json(&json!({ "uris": uris }));
        self.send(request)?;
        Ok(())
    }
}

impl std::fmt::Debug for SpotifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
