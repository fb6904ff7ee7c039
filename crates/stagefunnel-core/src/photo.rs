//! Profile photo lookup.
//!
//! The lookup service contract is a JSON `POST` of `{ "phone": "<digits>" }`
//! answered by `{ success, result?, is_photo_private? }`. Every failure mode
//! (non-success, transport error, malformed body) resolves to the fallback
//! placeholder with the private flag set, so the form guard never waits on a
//! lookup that cannot succeed.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::LookupError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoLookupRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoLookupResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub is_photo_private: Option<bool>,
}

/// What came back from one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Response(PhotoLookupResponse),
    Failed(LookupError),
}

impl From<Result<PhotoLookupResponse, LookupError>> for LookupOutcome {
    fn from(result: Result<PhotoLookupResponse, LookupError>) -> Self {
        match result {
            Ok(response) => LookupOutcome::Response(response),
            Err(err) => LookupOutcome::Failed(err),
        }
    }
}

/// A lookup the caller should perform on behalf of the funnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRequest {
    pub request_id: u64,
    pub phone: String,
}

/// Resolved photo shown on the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePhoto {
    pub url: String,
    pub private: bool,
    /// Short inline message shown when the lookup failed.
    #[serde(default)]
    pub notice: Option<String>,
}

/// Fallback image and notices used when a lookup does not yield a photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoFallback {
    pub url: String,
    pub unavailable_notice: String,
    pub error_notice: String,
}

/// Map a lookup outcome to the photo the form shows.
pub fn resolve_photo(outcome: &LookupOutcome, fallback: &PhotoFallback) -> ProfilePhoto {
    let placeholder = |notice: Option<&str>| ProfilePhoto {
        url: fallback.url.clone(),
        private: true,
        notice: notice.map(str::to_string),
    };

    match outcome {
        LookupOutcome::Response(resp) if resp.success => {
            if resp.is_photo_private.unwrap_or(false) {
                return placeholder(None);
            }
            match resp.result.as_deref().map(str::trim) {
                Some(url) if !url.is_empty() => ProfilePhoto {
                    url: url.to_string(),
                    private: false,
                    notice: None,
                },
                _ => placeholder(Some(&fallback.unavailable_notice)),
            }
        }
        LookupOutcome::Response(_) => placeholder(Some(&fallback.unavailable_notice)),
        LookupOutcome::Failed(_) => placeholder(Some(&fallback.error_notice)),
    }
}

/// The photo lookup collaborator.
pub trait PhotoLookup: Send + Sync {
    /// Never fails: errors are reported as [`LookupOutcome::Failed`].
    fn lookup<'a>(&'a self, phone: &'a str) -> BoxFuture<'a, LookupOutcome>;
}

/// HTTP client for the lookup service.
pub struct HttpPhotoLookup {
    client: Client,
    endpoint: Url,
}

impl HttpPhotoLookup {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn fetch(&self, phone: &str) -> Result<PhotoLookupResponse, LookupError> {
        let body = PhotoLookupRequest {
            phone: phone.to_string(),
        };
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LookupError::Status(resp.status().as_u16()));
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| LookupError::Decode(e.to_string()))
    }
}

impl PhotoLookup for HttpPhotoLookup {
    fn lookup<'a>(&'a self, phone: &'a str) -> BoxFuture<'a, LookupOutcome> {
        Box::pin(async move {
            let outcome = LookupOutcome::from(self.fetch(phone).await);
            if let LookupOutcome::Failed(ref err) = outcome {
                tracing::warn!(error = %err, "photo lookup failed, using fallback");
            }
            outcome
        })
    }
}

/// Lookup that never reaches a service; every request resolves to the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflinePhotoLookup;

impl PhotoLookup for OfflinePhotoLookup {
    fn lookup<'a>(&'a self, _phone: &'a str) -> BoxFuture<'a, LookupOutcome> {
        Box::pin(async {
            LookupOutcome::Failed(LookupError::Transport("offline".into()))
        })
    }
}
