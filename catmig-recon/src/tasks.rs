//! Auxiliary tasks around reconciliation
//!
//! - [`fetch_authority_records`]: save the authority record for every identifier
//! - [`compare_identifiers`]: report local identifiers the authority disagrees with
//! - [`load_cache`]: seed the cache from a saved MARCXML collection
//! - [`modify_records`]: apply only the institution policy

use std::io::Write;

use catmig_common::marc::marcxml::{self, COLLECTION_FOOTER, COLLECTION_HEADER};
use catmig_common::marc::Decoded;
use catmig_common::TaggedRecord;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::authority::{CacheStore, Lookup, ReconciliationSource};
use crate::error::{ReconError, ReconResult};
use crate::identifier::{self, Identifier, PRIMARY_TAG};
use crate::output::RecordSink;
use crate::policy::PolicyExtension;

/// Counters shared by the auxiliary tasks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub processed: u64,
    pub written: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl TaskSummary {
    pub fn display_string(&self) -> String {
        format!(
            "{} processed, {} written, {} skipped, {} errors",
            self.processed, self.written, self.skipped, self.errors
        )
    }
}

fn io_error(err: std::io::Error) -> ReconError {
    ReconError::Output(err.to_string())
}

/// The record inside a decoded item; failures are logged and counted as skipped
fn decoded_record(item: Decoded, summary: &mut TaskSummary) -> Option<TaggedRecord> {
    summary.processed += 1;
    match item {
        Decoded::Record(record) => Some(record),
        Decoded::Failure(failure) => {
            warn!(reason = %failure.reason, "Skipping undecodable record");
            summary.skipped += 1;
            None
        }
    }
}

/// Write every resolvable authority record into one MARCXML collection
pub async fn fetch_authority_records<I, W>(
    input: I,
    source: &mut ReconciliationSource,
    out: &mut W,
) -> ReconResult<TaskSummary>
where
    I: IntoIterator<Item = catmig_common::Result<Decoded>>,
    W: Write,
{
    let mut summary = TaskSummary::default();

    out.write_all(COLLECTION_HEADER.as_bytes()).map_err(io_error)?;
    for item in input {
        let Some(record) = decoded_record(item?, &mut summary) else {
            continue;
        };
        let Some(id) = identifier::extract(&record).identifier else {
            summary.skipped += 1;
            continue;
        };
        match source.resolve(&id).await {
            Ok(Lookup::Found(external)) => {
                writeln!(out, "{}", external.payload_body()).map_err(io_error)?;
                summary.written += 1;
            }
            Ok(_) => summary.skipped += 1,
            Err(e) => {
                error!(identifier = %id, error = %e, "Authority lookup failed");
                summary.errors += 1;
            }
        }
    }
    out.write_all(COLLECTION_FOOTER.as_bytes()).map_err(io_error)?;
    out.flush().map_err(io_error)?;

    info!("Fetch: {}", summary.display_string());
    Ok(summary)
}

/// Write `'local<TAB>'authority` for every identifier the authority renumbered
pub async fn compare_identifiers<I, W>(
    input: I,
    source: &mut ReconciliationSource,
    out: &mut W,
) -> ReconResult<TaskSummary>
where
    I: IntoIterator<Item = catmig_common::Result<Decoded>>,
    W: Write,
{
    let mut summary = TaskSummary::default();

    for item in input {
        let Some(record) = decoded_record(item?, &mut summary) else {
            continue;
        };
        let Some(id) = identifier::extract(&record).identifier else {
            summary.skipped += 1;
            continue;
        };
        match source.resolve(&id).await {
            Ok(Lookup::Found(external)) => match external.authority_id() {
                Some(authority_id) if Identifier::parse(authority_id).as_ref() == Some(&id) => {}
                Some(authority_id) => {
                    writeln!(out, "'{id}\t'{authority_id}").map_err(io_error)?;
                    summary.written += 1;
                }
                None => {
                    writeln!(out, "'{id}'\tno identifier in authority record").map_err(io_error)?;
                    summary.written += 1;
                }
            },
            Ok(_) => summary.skipped += 1,
            Err(e) => {
                error!(identifier = %id, error = %e, "Authority lookup failed");
                summary.errors += 1;
            }
        }
    }
    out.flush().map_err(io_error)?;

    info!("Compare: {}", summary.display_string());
    Ok(summary)
}

/// Upsert every record of a MARCXML collection that has an identifier and a title
pub async fn load_cache(xml: &str, cache: &dyn CacheStore) -> ReconResult<TaskSummary> {
    let mut summary = TaskSummary::default();
    for record in marcxml::parse_records(xml)? {
        summary.processed += 1;
        let id = record.control_value(PRIMARY_TAG).and_then(Identifier::parse);
        let title = record.title();
        let (Some(id), Some(title)) = (id, title) else {
            warn!(record = summary.processed, "Skipping record without identifier or title");
            summary.skipped += 1;
            continue;
        };

        let payload = marcxml::to_marcxml(&record);
        match cache.put(&id, &payload, Some(id.as_str()), Some(title.as_str())).await {
            Ok(()) => summary.written += 1,
            Err(e) => {
                error!(identifier = %id, error = %e, "Cache insert failed");
                summary.errors += 1;
            }
        }
    }

    info!("Load cache: {}", summary.display_string());
    Ok(summary)
}

/// Apply the policy to every record, splitting online records out when a sink is given
pub fn modify_records<I>(
    input: I,
    policy: &mut dyn PolicyExtension,
    out: &mut dyn RecordSink,
    mut online_out: Option<&mut dyn RecordSink>,
) -> ReconResult<TaskSummary>
where
    I: IntoIterator<Item = catmig_common::Result<Decoded>>,
{
    let mut summary = TaskSummary::default();

    for item in input {
        let Some(mut record) = decoded_record(item?, &mut summary) else {
            continue;
        };
        let id = identifier::extract(&record).identifier;
        policy.execute(&mut record, id.as_ref());
        let online = policy.is_online(&record);
        let written = match online_out.as_deref_mut() {
            Some(online_sink) if online => online_sink.write_record(&record),
            _ => out.write_record(&record),
        };
        match written {
            Ok(()) => summary.written += 1,
            Err(e) => {
                error!(error = %e, "Record write failed");
                summary.errors += 1;
            }
        }
    }
    out.flush_records()?;
    if let Some(online) = online_out {
        online.flush_records()?;
    }

    info!("Modify: {}", summary.display_string());
    Ok(summary)
}
