//! Authority resolution with cache and bounded retry
//!
//! Two mutually exclusive modes, fixed for a run:
//! - cache-only: answer from the cache, never touch the network
//! - live: ask the transport, retrying invalid responses, optionally persisting
//!   every valid payload to the cache

use std::time::Duration;

use super::{AuthorityTransport, CacheStore, ExternalRecord};
use crate::error::ReconResult;
use crate::identifier::Identifier;

/// Delays between live attempts when none are configured
pub const DEFAULT_BACKOFF: [Duration; 2] = [Duration::from_millis(500), Duration::from_millis(300)];

/// How lookups are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    CacheOnly,
    Live { persist: bool },
}

/// Result of resolving one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(ExternalRecord),
    /// Nothing cached for this identifier (cache-only mode)
    NotFound,
    /// Every live attempt returned an unusable payload
    Exhausted { attempts: u32, last_payload: String },
}

enum Backend {
    Cache(Box<dyn CacheStore>),
    Live {
        transport: Box<dyn AuthorityTransport>,
        cache: Option<Box<dyn CacheStore>>,
    },
}

/// Answers identifier lookups for the pipeline
pub struct ReconciliationSource {
    backend: Backend,
    backoff: Vec<Duration>,
    failed_lookups: u64,
}

impl ReconciliationSource {
    /// Cache-only source
    pub fn cache_only(cache: Box<dyn CacheStore>) -> Self {
        Self {
            backend: Backend::Cache(cache),
            backoff: DEFAULT_BACKOFF.to_vec(),
            failed_lookups: 0,
        }
    }

    /// Live source; valid payloads are written to `persist_to` when given
    pub fn live(
        transport: Box<dyn AuthorityTransport>,
        persist_to: Option<Box<dyn CacheStore>>,
    ) -> Self {
        Self {
            backend: Backend::Live {
                transport,
                cache: persist_to,
            },
            backoff: DEFAULT_BACKOFF.to_vec(),
            failed_lookups: 0,
        }
    }

    /// Replace the inter-attempt delays; attempts = delays + 1
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn mode(&self) -> ResolveMode {
        match &self.backend {
            Backend::Cache(_) => ResolveMode::CacheOnly,
            Backend::Live { cache, .. } => ResolveMode::Live {
                persist: cache.is_some(),
            },
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.backoff.len() as u32 + 1
    }

    /// Lookups that ended in [`Lookup::Exhausted`]
    pub fn failed_lookups(&self) -> u64 {
        self.failed_lookups
    }

    /// Resolve one identifier
    ///
    /// Transport and cache-read errors propagate. Invalid payloads (unparseable, or
    /// a record without its own identifier) are retried until the attempt budget
    /// runs out.
    pub async fn resolve(&mut self, identifier: &Identifier) -> ReconResult<Lookup> {
        let max_attempts = self.max_attempts();
        let (transport, cache) = match &self.backend {
            Backend::Cache(cache) => return resolve_cached(cache.as_ref(), identifier).await,
            Backend::Live { transport, cache } => (transport, cache),
        };

        let mut last_payload = String::new();
        for attempt in 1..=max_attempts {
            let payload = transport.fetch(identifier).await?;
            match ExternalRecord::from_payload(payload.as_str()) {
                Ok(external) if external.authority_id().is_some() => {
                    if let Some(cache) = cache {
                        persist(cache.as_ref(), identifier, &external).await;
                    }
                    tracing::debug!(identifier = %identifier, attempt, "Authority record retrieved");
                    return Ok(Lookup::Found(external));
                }
                Ok(_) => {
                    tracing::warn!(identifier = %identifier, attempt, "Authority response has no identifier field");
                }
                Err(e) => {
                    tracing::warn!(identifier = %identifier, attempt, error = %e, "Invalid authority response");
                }
            }
            last_payload = payload;

            if let Some(delay) = self.backoff.get(attempt as usize - 1) {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        self.failed_lookups += 1;
        tracing::warn!(
            identifier = %identifier,
            attempts = max_attempts,
            "Authority lookup failed after all attempts"
        );
        Ok(Lookup::Exhausted {
            attempts: max_attempts,
            last_payload,
        })
    }
}

async fn resolve_cached(cache: &dyn CacheStore, identifier: &Identifier) -> ReconResult<Lookup> {
    let Some(payload) = cache.get(identifier).await? else {
        tracing::debug!(identifier = %identifier, "Identifier not cached");
        return Ok(Lookup::NotFound);
    };

    match ExternalRecord::from_payload(payload) {
        Ok(external) => Ok(Lookup::Found(external)),
        Err(e) => {
            tracing::warn!(identifier = %identifier, error = %e, "Cached payload does not parse");
            Ok(Lookup::NotFound)
        }
    }
}

/// Cache write failures are logged, never raised
async fn persist(cache: &dyn CacheStore, identifier: &Identifier, external: &ExternalRecord) {
    let title = external.title_parts().map(|p| p.comparison);
    if let Err(e) = cache
        .put(
            identifier,
            external.payload(),
            external.authority_id(),
            title.as_deref(),
        )
        .await
    {
        tracing::warn!(identifier = %identifier, error = %e, "Failed to cache authority record");
    }
}
