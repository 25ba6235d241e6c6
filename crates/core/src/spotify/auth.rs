use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::{blocking::Client, Url};
use serde::{Deserialize, Serialize};

use crate::{MoodTunesError, Result, SpotifyConfig};

/// Playback read/modify plus private playlist modification.
pub const SCOPE: &str = "user-read-playback-state user-modify-playback-state playlist-modify-private";

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Access token as persisted in the token cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
    /// Unix timestamp in seconds.
    pub expires_at: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenInfo {
    pub fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_add(EXPIRY_MARGIN_SECS) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "bearer")]
    token_type: String,
    #[serde(default)]
    scope: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

fn bearer() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Refresh responses may omit the refresh token; the previous one stays
    /// valid in that case.
    fn into_token(self, now: u64, previous_refresh: Option<String>) -> TokenInfo {
        TokenInfo {
            access_token: self.access_token,
            token_type: self.token_type,
            scope: self.scope,
            expires_at: now.saturating_add(self.expires_in),
            refresh_token: self.refresh_token.or(previous_refresh),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// JSON file holding the last issued token.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when the cache is missing or unreadable.
    pub fn load(&self) -> Option<TokenInfo> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::warn!(path = ?self.path, %err, "ignoring corrupt token cache");
                None
            }
        }
    }

    pub fn save(&self, token: &TokenInfo) -> Result<()> {
        std::fs::write(&self.path, serde_json::to_string(token)?)?;
        Ok(())
    }
}

/// Authorization-code flow for a single user.
pub struct SpotifyOAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    cache: TokenCache,
}

impl SpotifyOAuth {
    pub fn new(config: &SpotifyConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_url: TOKEN_URL.to_string(),
            cache: TokenCache::new(&config.token_cache_path),
        })
    }

    /// Consent page the user has to visit.
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", SCOPE),
                ("state", state),
            ],
        )
        .map_err(|err| MoodTunesError::Auth(format!("invalid authorize url: {err}")))?;
        Ok(url.into())
    }

    /// Extracts the authorization code from the URL the browser was
    /// redirected to. A bare code is accepted as is.
    pub fn parse_redirect(input: &str, expected_state: Option<&str>) -> Result<String> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MoodTunesError::Auth("no authorization response given".to_string()));
        }

        let Ok(url) = Url::parse(input) else {
            return Ok(input.to_string());
        };

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match &*key {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => {
                    return Err(MoodTunesError::Auth(format!(
                        "authorization denied: {value}"
                    )))
                }
                _ => {}
            }
        }

        if let (Some(expected), Some(actual)) = (expected_state, state.as_deref()) {
            if expected != actual {
                return Err(MoodTunesError::Auth("authorization state mismatch".to_string()));
            }
        }

        code.ok_or_else(|| MoodTunesError::Auth("redirect url carries no code".to_string()))
    }

    pub fn exchange_code(&self, code: &str) -> Result<TokenInfo> {
        tracing::info!("exchanging authorization code");
        self.request_token(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
            None,
        )
    }

    pub fn refresh(&self, token: &TokenInfo) -> Result<TokenInfo> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| MoodTunesError::Auth("token has no refresh token".to_string()))?;

        tracing::info!("refreshing access token");
        self.request_token(
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
            token.refresh_token.clone(),
        )
    }

    fn request_token(
        &self,
        form: &[(&str, &str)],
        previous_refresh: Option<String>,
    ) -> Result<TokenInfo> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()?;

        let status = response.status();
        if status.is_server_error() {
            return Err(MoodTunesError::ServiceUnavailable(format!(
                "token endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(MoodTunesError::Auth(format!("{status}: {}", body.trim())));
        }

        let body: TokenResponse = response.json()?;
        Ok(body.into_token(unix_now(), previous_refresh))
    }

    /// Returns a usable token: the cached one if still fresh, a refreshed one
    /// if it expired, or a new one obtained interactively. A refresh token the
    /// endpoint rejects falls through to the interactive flow, whose token
    /// replaces the cached one. `prompt` receives the consent URL and returns
    /// what the user pasted back.
    pub fn obtain_token<P>(&self, mut prompt: P) -> Result<TokenInfo>
    where
        P: FnMut(&str) -> Result<String>,
    {
        if let Some(cached) = self.cache.load() {
            if !cached.is_expired() {
                tracing::debug!("using cached access token");
                return Ok(cached);
            }
            if cached.refresh_token.is_some() {
                match self.refresh(&cached) {
                    Ok(token) => {
                        self.cache.save(&token)?;
                        return Ok(token);
                    }
                    Err(MoodTunesError::Auth(reason)) => {
                        tracing::warn!(%reason, "refresh token rejected, asking for consent again");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        let state = uuid::Uuid::new_v4().simple().to_string();
        let url = self.authorize_url(&state)?;
        let response = prompt(&url)?;
        let code = Self::parse_redirect(&response, Some(&state))?;
        let token = self.exchange_code(&code)?;
        self.cache.save(&token)?;
        Ok(token)
    }
}

impl std::fmt::Debug for SpotifyOAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyOAuth")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("cache", &self.cache.path)
            .finish()
    }
}
