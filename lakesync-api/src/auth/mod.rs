//! Basic and ticket authentication against the source repository.
//!
//! The provider chain is ticket-first, then basic: a ticket arrives either in
//! the `alf_ticket` query parameter or as a bare `TICKET_…` value inside a
//! Basic Authorization header (no `:` separator). Basic credentials are
//! validated by requesting a ticket from the source repository.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::routes::ApiError;

const TICKET_PREFIX: &str = "TICKET_";
const TICKET_QUERY_PARAM: &str = "alf_ticket";

/// The authenticated principal, resolved to the real username.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let basic_credentials = basic_credentials_from_header(parts);

        // Ticket first: query parameter, then a bare ticket in the
        // Authorization header.
        let ticket = ticket_from_query(parts).or_else(|| ticket_from_basic(&basic_credentials));

        if let Some(ticket) = ticket {
            debug!("Found ticket in request");
            match app_state.repo.validate_ticket(&ticket).await {
                Ok(Some(username)) => {
                    info!(%username, "Authenticated with ticket");
                    return Ok(AuthUser { username });
                }
                Ok(None) => {
                    debug!("Ticket authentication failed");
                }
                Err(e) => {
                    warn!(error = %e, "Ticket validation errored");
                }
            }
        }

        // Then basic user:password.
        if let Some(BasicCredentials::UserPassword(username, password)) = basic_credentials {
            match app_state.repo.validate_credentials(&username, &password).await {
                Ok(true) => {
                    info!(%username, "Authenticated with basic credentials");
                    return Ok(AuthUser { username });
                }
                Ok(false) => {
                    warn!(%username, "Source repository rejected credentials");
                    return Err(ApiError::unauthorized_challenge("Invalid credentials"));
                }
                Err(e) => {
                    warn!(error = %e, "Credential validation errored");
                    return Err(ApiError::unauthorized_challenge(format!(
                        "Unable to validate credentials: {}",
                        e
                    )));
                }
            }
        }

        Err(ApiError::unauthorized_challenge("Authentication required"))
    }
}

enum BasicCredentials {
    /// Decoded payload carried `user:password`.
    UserPassword(String, String),
    /// Decoded payload was a bare ticket.
    Ticket(String),
}

fn basic_credentials_from_header(parts: &Parts) -> Option<BasicCredentials> {
    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    match decoded.split_once(':') {
        Some((user, pass)) => Some(BasicCredentials::UserPassword(
            user.to_string(),
            pass.to_string(),
        )),
        None if decoded.starts_with(TICKET_PREFIX) => Some(BasicCredentials::Ticket(decoded)),
        None => None,
    }
}

fn ticket_from_basic(credentials: &Option<BasicCredentials>) -> Option<String> {
    match credentials {
        Some(BasicCredentials::Ticket(ticket)) => Some(ticket.clone()),
        _ => None,
    }
}

fn ticket_from_query(parts: &Parts) -> Option<String> {
    let query = parts.uri.query()?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == TICKET_QUERY_PARAM)
        .map(|(_, value)| value)
        .filter(|value| value.starts_with(TICKET_PREFIX))
        .map(|value| value.to_string())
}
