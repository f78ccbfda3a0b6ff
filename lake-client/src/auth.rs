use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::LakeClientError;

/// Seconds subtracted from the token lifetime so a token is refreshed before
/// it actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Acquires and caches OAuth2 tokens for the content lake using the
/// resource-owner-password grant.
pub struct TokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    expires_at: OffsetDateTime,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl TokenProvider {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            username: username.into(),
            password: password.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a valid bearer token, refreshing it when the cached one is
    /// within the expiry margin.
    pub async fn token(&self) -> Result<String, LakeClientError> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if OffsetDateTime::now_utc() < entry.expires_at {
                return Ok(entry.token.clone());
            }
        }

        debug!("Fetching new token from IdP");

        let form = [
            ("grant_type", "password"),
            ("scope", "openid profile email"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| LakeClientError::ResponseError(e.to_string()))?;

        if resp.status().as_u16() == 401 || resp.status().as_u16() == 403 {
            return Err(LakeClientError::Unauthorized);
        }
        if !resp.status().is_success() {
            return Err(LakeClientError::ResponseError(format!(
                "token endpoint returned status {}",
                resp.status()
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| LakeClientError::ParsingError(format!("token response: {}", e)))?;

        let expires_at = OffsetDateTime::now_utc()
            + time::Duration::seconds((token.expires_in - EXPIRY_MARGIN_SECS).max(0));
        debug!(expires_in = token.expires_in, "Token obtained");

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            token: token.access_token,
            expires_at,
        });

        Ok(value)
    }
}
