use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use crate::tile_system::types::TileError;

/// Fetches raw tile bytes for a URL.
///
/// The download workers only see this trait, so tests can swap the network
/// for an in-memory source.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError>;
}

/// Loads tiles from a tile server over HTTP
pub struct HttpTileLoader {
    /// HTTP client for making requests
    client: Client,
}

impl HttpTileLoader {
    /// Create a loader whose requests give up after `timeout`
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, TileError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TileError::Download(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl TileFetcher for HttpTileLoader {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, TileError> {
        debug!("Requesting tile URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TileError::Download(format!("request error: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TileError::NotFound);
        }
        if !status.is_success() {
            return Err(TileError::Download(format!("HTTP error: {}", status)));
        }

        let bytes = response
            .bytes()
            .map_err(|e| TileError::Download(format!("failed to read response bytes: {}", e)))?;
        debug!("Received {} bytes from {}", bytes.len(), url);

        Ok(bytes.to_vec())
    }
}
