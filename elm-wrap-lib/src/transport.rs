// SPDX-License-Identifier: MPL-2.0

//! Module defining the HTTP transport seam.
//!
//! The library never talks to the network directly: every download goes
//! through a [Transport], provided by the caller. The binary plugs in a
//! real blocking HTTP client; tests plug in in-memory fakes; offline mode
//! plugs in [OfflineTransport] which refuses every request.

use thiserror::Error;

/// Error type for transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request was refused because offline mode is active.
    #[error("offline mode active, refusing to fetch {url}")]
    Offline {
        /// The refused url.
        url: String,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} failed with status {status}")]
    Status {
        /// The requested url.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request failed before producing a status.
    #[error("failed to fetch {url}")]
    Network {
        /// The requested url.
        url: String,
        /// The actual network error that happened.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Blocking HTTP GET interface consumed by the fetch pipeline,
/// the mirror builder and the bulk downloader.
pub trait Transport {
    /// Fetch a url into a string (used for the JSON metadata endpoints).
    fn fetch_string(&self, url: &str) -> Result<String, TransportError>;

    /// Fetch a url into raw bytes (used for package archives).
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn fetch_string(&self, url: &str) -> Result<String, TransportError> {
        (**self).fetch_string(url)
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        (**self).fetch_bytes(url)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn fetch_string(&self, url: &str) -> Result<String, TransportError> {
        (**self).fetch_string(url)
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        (**self).fetch_bytes(url)
    }
}

/// Transport refusing every request with an offline error.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn fetch_string(&self, url: &str) -> Result<String, TransportError> {
        Err(TransportError::Offline {
            url: url.to_string(),
        })
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Offline {
            url: url.to_string(),
        })
    }
}

impl TransportError {
    /// True when the error is the offline short-circuit.
    pub fn is_offline(&self) -> bool {
        matches!(self, TransportError::Offline { .. })
    }
}
