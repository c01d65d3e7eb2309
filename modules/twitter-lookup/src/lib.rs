pub mod error;
pub mod types;

pub use error::{LookupError, Result};
pub use types::{identity_of, GuestTokenResponse, LookupKind};

use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.twitter.com/1.1";

pub struct TwitterClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl TwitterClient {
    pub fn new(bearer_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            bearer_token,
        }
    }

    /// Client against a non-default base URL with a per-request timeout.
    pub fn with_options(bearer_token: String, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
        })
    }

    /// Activate a disposable anonymous guest session.
    pub async fn activate_guest_token(&self) -> Result<String> {
        let url = format!("{}/guest/activate.json", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(LookupError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: GuestTokenResponse = resp.json().await?;
        match body.guest_token {
            Some(token) if !token.is_empty() => {
                tracing::debug!("Guest token activated");
                Ok(token)
            }
            _ => Err(LookupError::MissingGuestToken),
        }
    }

    /// Look up one batch of identities. The caller keeps batches within the
    /// endpoint limit (100).
    pub async fn lookup(
        &self,
        kind: LookupKind,
        ids: &[String],
        guest_token: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/{}", self.base_url, kind.endpoint());
        let joined = ids.join(",");
        let mut query: Vec<(&str, &str)> = vec![(kind.id_param(), joined.as_str())];
        query.extend_from_slice(kind.extra_params());

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .bearer_auth(&self.bearer_token)
            .header("x-guest-token", guest_token)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            tracing::debug!(%kind, batch = ids.len(), "Lookup rate limited");
            return Err(LookupError::RateLimited);
        }
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(LookupError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let items: Vec<serde_json::Value> = resp.json().await?;
        tracing::debug!(%kind, requested = ids.len(), returned = items.len(), "Lookup batch complete");
        Ok(items)
    }
}
