use crate::errors::SourceError;
use std::time::Duration;

/// Blocking document retrieval. Implementations never retry; a failed fetch
/// degrades to the next source.
pub trait DocumentFetcher {
    fn get_text(&self, url: &str, timeout: Duration) -> Result<String, SourceError>;
    fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, SourceError>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("indice/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Fetch {
                url: String::new(),
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client })
    }

    fn send(&self, url: &str, timeout: Duration) -> Result<reqwest::blocking::Response, SourceError> {
        tracing::info!(event = "official.fetch", url = %url, timeout_secs = timeout.as_secs());
        self.client
            .get(url)
            .timeout(timeout)
            .send()
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| fetch_error(url, e))
    }
}

impl DocumentFetcher for HttpFetcher {
    fn get_text(&self, url: &str, timeout: Duration) -> Result<String, SourceError> {
        self.send(url, timeout)?
            .text()
            .map_err(|e| fetch_error(url, e))
    }

    fn get_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, SourceError> {
        let body = self.send(url, timeout)?.bytes().map_err(|e| fetch_error(url, e))?;
        Ok(body.to_vec())
    }
}

fn fetch_error(url: &str, e: reqwest::Error) -> SourceError {
    let reason = match e.status() {
        Some(status) => format!("http status {status}"),
        None if e.is_timeout() => "timed out".to_string(),
        None => e.to_string(),
    };
    SourceError::Fetch {
        url: url.to_string(),
        reason,
    }
}
