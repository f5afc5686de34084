//! Record output routing
//!
//! Each processed record lands in exactly one bucket, chosen by its [`Outcome`] and
//! whether the policy classified it as an online resource. Buckets without an
//! online sink take online records too.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use catmig_common::marc::{Iso2709Writer, TextWriter};
use catmig_common::TaggedRecord;
use serde::Serialize;

use crate::error::{ReconError, ReconResult};

/// Final disposition of one input record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Perfect title match, substitution applied
    Modified,
    /// Fuzzy title match, substitution applied and labelled
    FuzzyModified,
    /// No usable authority record; local content kept
    Unmodified,
    /// Input could not be decoded
    Bad,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::FuzzyModified => "fuzzy-modified",
            Self::Unmodified => "unmodified",
            Self::Bad => "bad",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Destination for decoded records
pub trait RecordSink: Send {
    fn write_record(&mut self, record: &TaggedRecord) -> catmig_common::Result<()>;

    fn flush_records(&mut self) -> catmig_common::Result<()> {
        Ok(())
    }
}

impl<W: Write + Send> RecordSink for TextWriter<W> {
    fn write_record(&mut self, record: &TaggedRecord) -> catmig_common::Result<()> {
        self.write(record)
    }

    fn flush_records(&mut self) -> catmig_common::Result<()> {
        self.flush()
    }
}

impl<W: Write + Send> RecordSink for Iso2709Writer<W> {
    fn write_record(&mut self, record: &TaggedRecord) -> catmig_common::Result<()> {
        self.write(record)
    }

    fn flush_records(&mut self) -> catmig_common::Result<()> {
        self.flush()
    }
}

/// Online/physical split of one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey {
    outcome: Outcome,
    online: bool,
}

/// Routes records and raw failures to their sinks
#[derive(Default)]
pub struct OutputRouter {
    buckets: HashMap<BucketKey, Box<dyn RecordSink>>,
    fuzzy_originals: Option<Box<dyn RecordSink>>,
    missing_fields: Option<Box<dyn RecordSink>>,
    bad: Option<Box<dyn Write + Send>>,
}

impl OutputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(mut self, outcome: Outcome, sink: Box<dyn RecordSink>) -> Self {
        self.buckets.insert(BucketKey { outcome, online: false }, sink);
        self
    }

    pub fn with_online_bucket(mut self, outcome: Outcome, sink: Box<dyn RecordSink>) -> Self {
        self.buckets.insert(BucketKey { outcome, online: true }, sink);
        self
    }

    /// Local records as they were before a fuzzy substitution
    pub fn with_fuzzy_originals(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.fuzzy_originals = Some(sink);
        self
    }

    /// Records lacking a required field (for example a title)
    pub fn with_missing_fields(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.missing_fields = Some(sink);
        self
    }

    /// Raw bytes of undecodable records
    pub fn with_bad(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.bad = Some(sink);
        self
    }

    /// Write a record to its bucket; buckets with no sink drop the record
    pub fn route(&mut self, outcome: Outcome, online: bool, record: &TaggedRecord) -> ReconResult<()> {
        let key = if online && self.buckets.contains_key(&BucketKey { outcome, online: true }) {
            BucketKey { outcome, online: true }
        } else {
            BucketKey { outcome, online: false }
        };
        match self.buckets.get_mut(&key) {
            Some(sink) => sink.write_record(record).map_err(output_error),
            None => {
                tracing::debug!(outcome = %outcome, online, "No sink configured, record dropped");
                Ok(())
            }
        }
    }

    pub fn fuzzy_original(&mut self, record: &TaggedRecord) -> ReconResult<()> {
        match self.fuzzy_originals.as_mut() {
            Some(sink) => sink.write_record(record).map_err(output_error),
            None => Ok(()),
        }
    }

    pub fn missing_field(&mut self, record: &TaggedRecord) -> ReconResult<()> {
        match self.missing_fields.as_mut() {
            Some(sink) => sink.write_record(record).map_err(output_error),
            None => Ok(()),
        }
    }

    pub fn bad(&mut self, raw: &[u8]) -> ReconResult<()> {
        match self.bad.as_mut() {
            Some(sink) => sink
                .write_all(raw)
                .map_err(|e| ReconError::Output(e.to_string())),
            None => Ok(()),
        }
    }

    pub fn flush(&mut self) -> ReconResult<()> {
        for sink in self.buckets.values_mut() {
            sink.flush_records().map_err(output_error)?;
        }
        for sink in [&mut self.fuzzy_originals, &mut self.missing_fields]
            .into_iter()
            .flatten()
        {
            sink.flush_records().map_err(output_error)?;
        }
        if let Some(bad) = self.bad.as_mut() {
            bad.flush().map_err(|e| ReconError::Output(e.to_string()))?;
        }
        Ok(())
    }
}

fn output_error(err: catmig_common::Error) -> ReconError {
    ReconError::Output(err.to_string())
}
