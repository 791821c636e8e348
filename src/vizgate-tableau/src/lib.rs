//! Tableau Server REST API client for Vizgate
//!
//! This crate signs in to a Tableau Server with a service account and reads
//! site, workbook and view metadata. It is the only component that talks to
//! the vendor server; everything it returns is raw REST data for callers to
//! map into their own types.

mod client;
mod models;
mod site;

pub use client::{Session, TableauClient, TableauSettings};
pub use models::{OwnerRef, Site, Tag, View, Workbook};
pub use site::{SiteContext, SiteContextMode};

/// REST API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "3.21";

/// Default page size for paginated listings.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Header carrying the session credential on authenticated calls.
pub const AUTH_HEADER: &str = "X-Tableau-Auth";

/// Error types for Tableau REST operations
#[derive(Debug, thiserror::Error)]
pub enum TableauError {
    #[error("Tableau Server is not reachable at {0}")]
    Connection(String),

    #[error("{context} failed with status {status}: {body}")]
    Server {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Sign-in failed for every site context: {}", .0.join("; "))]
    AllSiteContextsFailed(Vec<String>),
}

impl TableauError {
    /// HTTP status returned by the server, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for Tableau operations
pub type Result<T> = std::result::Result<T, TableauError>;
