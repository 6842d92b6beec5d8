use std::time::Duration;

use chrono::Local;
use reqwest::{Client, Response};
use shared::{
    domain::ParkingStatus,
    error::ApiError,
    protocol::{StatusUpdateRequest, StatusUpdateResponse, STATUS_ROUTE},
};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub mod preferences;
mod sync;

pub use preferences::SelectedUserStore;
pub use sync::{SyncSession, SyncState, DEFAULT_POLL_INTERVAL};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Transport failure, including timeouts.
    #[error("could not reach the server: {0}")]
    Network(#[from] reqwest::Error),
    #[error("server answered {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Thin HTTP wrapper around `GET /status` and `POST /status`.
#[derive(Debug, Clone)]
pub struct StatusClient {
    http: Client,
    status_url: Url,
}

impl StatusClient {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base = Url::parse(server_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let status_url = base.join(STATUS_ROUTE.trim_start_matches('/'))?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, status_url })
    }

    pub fn status_url(&self) -> &Url {
        &self.status_url
    }

    pub async fn fetch_status(&self) -> Result<ParkingStatus, ClientError> {
        let response = self.http.get(self.status_url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn update_status(&self, status: &ParkingStatus) -> Result<ParkingStatus, ClientError> {
        let response = self
            .http
            .post(self.status_url.clone())
            .json(&StatusUpdateRequest::from(status.clone()))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        let body: StatusUpdateResponse = response.json().await?;
        Ok(body.data)
    }

    /// Records `location` for `user`, stamped with this machine's current time.
    pub async fn submit_location(
        &self,
        location: &str,
        user: &str,
    ) -> Result<ParkingStatus, ClientError> {
        let candidate = ParkingStatus::recorded_at(location.trim(), user.trim(), &Local::now());
        debug!(location = %candidate.location, user = %candidate.user, "submitting location");
        self.update_status(&candidate).await
    }
}

async fn rejected(response: Response) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiError>(&body) {
        Ok(err) => err.error,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
        Err(_) => body,
    };
    ClientError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
