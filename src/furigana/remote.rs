//! Remote furigana lookup endpoint
//!
//! One POST per enrichment pass carrying the ordered list of distinct words:
//!
//! ```text
//! request:  {"words": ["日本", "東京"]}
//! response: {"readings": {"日本": "にほん", "東京": {"reading": "とうきょう", "frequency_rank": 87}}}
//! ```
//!
//! Words missing from the response are unknown to the service, not an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::Reading;
use crate::error::RemoteError;

/// Remote batch reading service
#[async_trait]
pub trait RemoteFurigana: Send + Sync {
    /// Look up many words in one request
    ///
    /// `Ok` with an empty map means the service answered but knew none of them.
    async fn lookup_batch(&self, words: &[String]) -> Result<HashMap<String, Reading>, RemoteError>;

    /// Look up one word
    async fn lookup(&self, word: &str) -> Result<Option<Reading>, RemoteError> {
        let mut found = self.lookup_batch(&[word.to_string()]).await?;
        Ok(found.remove(word))
    }
}

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    words: &'a [String],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    readings: HashMap<String, ReadingValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReadingValue {
    Plain(String),
    Detailed {
        reading: String,
        #[serde(default)]
        frequency_rank: Option<u32>,
    },
}

/// Decode a response body into readings keyed by word
fn parse_response(body: &str) -> Result<HashMap<String, Reading>, RemoteError> {
    let response: LookupResponse =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;

    Ok(response
        .readings
        .into_iter()
        .filter_map(|(word, value)| {
            let (reading, frequency_rank) = match value {
                ReadingValue::Plain(reading) => (reading, None),
                ReadingValue::Detailed { reading, frequency_rank } => (reading, frequency_rank),
            };
            if reading.is_empty() {
                return None;
            }
            let parsed = Reading {
                word: word.clone(),
                reading,
                frequency_rank,
            };
            Some((word, parsed))
        })
        .collect())
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Http(error)
    }
}

/// HTTP client for the furigana endpoint
pub struct HttpFuriganaClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFuriganaClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteFurigana for HttpFuriganaClient {
    async fn lookup_batch(&self, words: &[String]) -> Result<HashMap<String, Reading>, RemoteError> {
        if words.is_empty() {
            return Ok(HashMap::new());
        }

        debug!("Requesting {} readings from {}", words.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&LookupRequest { words })
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(map_transport_error)?;
        parse_response(&body)
    }
}
