//! Authority record resolution
//!
//! Lookups go through two seams so tests can substitute either side:
//! - [`AuthorityTransport`]: fetches one raw MARCXML payload by identifier
//! - [`CacheStore`]: persisted payloads keyed by identifier
//!
//! [`ReconciliationSource`] combines them with the retry policy.

pub mod cache;
pub mod source;
pub mod worldcat_client;

use async_trait::async_trait;
use catmig_common::marc::marcxml;
use catmig_common::TaggedRecord;

use crate::error::ReconResult;
use crate::identifier::{Identifier, PRIMARY_TAG};
use crate::title::TitleParts;

pub use cache::{init_cache_pool, CacheStore, SqliteCache};
pub use source::{Lookup, ReconciliationSource, ResolveMode};
pub use worldcat_client::WorldCatClient;

/// Fetches authority payloads from a remote service
#[async_trait]
pub trait AuthorityTransport: Send + Sync {
    /// Raw response body for one identifier
    ///
    /// Network faults and non-success statuses are errors; a body that is not a
    /// usable record is returned as-is for the caller to judge.
    async fn fetch(&self, identifier: &Identifier) -> ReconResult<String>;
}

/// Parsed authority record together with the payload it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecord {
    record: TaggedRecord,
    payload: String,
}

impl ExternalRecord {
    /// Parse a MARCXML payload
    pub fn from_payload(payload: impl Into<String>) -> catmig_common::Result<Self> {
        let payload = payload.into();
        let record = marcxml::parse_record(&payload)?;
        Ok(Self { record, payload })
    }

    /// Wrap an already-built record, serializing it as the payload
    pub fn from_record(record: TaggedRecord) -> Self {
        let payload = marcxml::to_marcxml(&record);
        Self { record, payload }
    }

    pub fn record(&self) -> &TaggedRecord {
        &self.record
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The authority's own identifier (`001`), if present and non-blank
    pub fn authority_id(&self) -> Option<&str> {
        self.record
            .control_value(PRIMARY_TAG)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn title_parts(&self) -> Option<TitleParts> {
        TitleParts::from_record(&self.record)
    }

    /// Payload without its XML declaration, for embedding in a collection
    pub fn payload_body(&self) -> &str {
        let trimmed = self.payload.trim_start();
        match trimmed.strip_prefix("<?xml") {
            Some(rest) => rest
                .find("?>")
                .map(|end| rest[end + 2..].trim_start())
                .unwrap_or(trimmed),
            None => trimmed,
        }
    }
}
