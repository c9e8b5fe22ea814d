//! Process directory: the backend's `/processes` REST collaborator.

use serde::Deserialize;
use tracing::debug;

use crate::error::DirectoryError;

#[derive(Debug, Deserialize)]
struct ProcessListBody {
    processes: Vec<String>,
}

/// Client for the backend's process-name listing.
#[derive(Clone)]
pub struct ProcessDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl ProcessDirectory {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url: String = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Fetch the current candidate process list.
    ///
    /// Pure read with no caching contract: safe to call concurrently, callers
    /// race to replace their displayed list and the last response wins.
    pub async fn list(&self) -> Result<Vec<String>, DirectoryError> {
        let url = format!("{}/processes", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        let body: ProcessListBody = response.json().await?;
        debug!(count = body.processes.len(), "process list fetched");
        Ok(body.processes)
    }
}
