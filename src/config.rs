//! Upload target configuration: endpoint URL and expiration hint.

use tracing::{debug, info};

/// Default upload endpoint when `FILE_IO_URL` is not set.
pub const DEFAULT_UPLOAD_URL: &str = "https://file.io";

/// Where an upload goes and how long the hosted file should live.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub url: String,
    /// Forwarded verbatim as the `expires` query parameter.
    pub expires: Option<String>,
}

impl UploadTarget {
    /// Resolve the endpoint from the `FILE_IO_URL` environment variable,
    /// falling back to the public file.io endpoint.
    pub fn from_env(expires: Option<String>) -> Self {
        let url = match std::env::var("FILE_IO_URL") {
            Ok(url) => {
                info!(url = %url, "using upload endpoint from FILE_IO_URL");
                url
            }
            Err(_) => DEFAULT_UPLOAD_URL.to_string(),
        };
        debug!(url = %url, expires = ?expires, "resolved upload target");
        Self { url, expires }
    }
}
