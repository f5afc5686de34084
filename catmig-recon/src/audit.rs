//! Append-only audit logs
//!
//! Every sink is optional. A write failure is logged and counted but never changes
//! how a record is routed.

use std::io::Write;

use catmig_common::marc::marcxml::{COLLECTION_FOOTER, COLLECTION_HEADER};
use tracing::warn;

use crate::authority::ExternalRecord;
use crate::identifier::SecondaryNote;
use crate::substitution::AuditEntry;
use crate::title::TitleComparison;

type Sink = Box<dyn Write + Send>;

/// The run's audit sinks
#[derive(Default)]
pub struct AuditLog {
    fields: Option<Sink>,
    titles: Option<Sink>,
    cancelled: Option<Sink>,
    bad_responses: Option<Sink>,
    material_types: Option<Sink>,
    authority_xml: Option<Sink>,
    write_failures: u64,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaced and moved field values
    pub fn with_fields(mut self, sink: Sink) -> Self {
        self.fields = Some(sink);
        self
    }

    /// Non-perfect title comparisons
    pub fn with_titles(mut self, sink: Sink) -> Self {
        self.titles = Some(sink);
        self
    }

    /// Cancelled, missing and duplicate secondary identifiers
    pub fn with_cancelled(mut self, sink: Sink) -> Self {
        self.cancelled = Some(sink);
        self
    }

    /// Raw payloads of exhausted lookups
    pub fn with_bad_responses(mut self, sink: Sink) -> Self {
        self.bad_responses = Some(sink);
        self
    }

    /// Policy material-type diagnostics
    pub fn with_material_types(mut self, sink: Sink) -> Self {
        self.material_types = Some(sink);
        self
    }

    /// Every retrieved authority record, as a MARCXML collection
    ///
    /// The collection is opened right away so a run without hits still leaves a
    /// well-formed, empty document.
    pub fn with_authority_xml(mut self, sink: Sink) -> Self {
        self.authority_xml = Some(sink);
        write_line(&mut self.authority_xml, &mut self.write_failures, "authority xml", COLLECTION_HEADER);
        self
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn field(&mut self, entry: &AuditEntry) {
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            entry.record_id, entry.tag, entry.new_value, entry.old_value, entry.action
        );
        write_line(&mut self.fields, &mut self.write_failures, "field", &line);
    }

    pub fn title(&mut self, identifier: &str, comparison: &TitleComparison) {
        let line = format!(
            "{}\t{}\t\"{}\"\t\"{}\"\t{}\t{}\t{}\n",
            comparison.local_raw,
            comparison.authority_raw,
            comparison.local_normalized,
            comparison.authority_normalized,
            comparison.score,
            if comparison.passed { "passed" } else { "failed" },
            identifier
        );
        write_line(&mut self.titles, &mut self.write_failures, "title", &line);
    }

    pub fn cancelled(&mut self, note: &SecondaryNote, title: &str) {
        let (kind, value) = note.columns();
        let line = format!("{kind}\t{value}\t{title}\n");
        write_line(&mut self.cancelled, &mut self.write_failures, "cancelled", &line);
    }

    pub fn bad_response(&mut self, identifier: &str, payload: &str) {
        let line = format!("{identifier}\n{payload}\n");
        write_line(&mut self.bad_responses, &mut self.write_failures, "bad response", &line);
    }

    pub fn material_type(&mut self, line: &str) {
        let line = format!("{line}\n");
        write_line(&mut self.material_types, &mut self.write_failures, "material type", &line);
    }

    pub fn authority_record(&mut self, external: &ExternalRecord) {
        let body = format!("{}\n", external.payload_body());
        write_line(&mut self.authority_xml, &mut self.write_failures, "authority xml", &body);
    }

    /// Close the MARCXML collection and flush every sink
    pub fn finish(&mut self) {
        if self.authority_xml.is_some() {
            write_line(&mut self.authority_xml, &mut self.write_failures, "authority xml", COLLECTION_FOOTER);
        }
        for sink in [
            &mut self.fields,
            &mut self.titles,
            &mut self.cancelled,
            &mut self.bad_responses,
            &mut self.material_types,
            &mut self.authority_xml,
        ]
        .into_iter()
        .flatten()
        {
            if let Err(e) = sink.flush() {
                warn!(error = %e, "Failed to flush audit log");
                self.write_failures += 1;
            }
        }
    }
}

fn write_line(sink: &mut Option<Sink>, failures: &mut u64, kind: &str, line: &str) {
    let Some(sink) = sink else {
        return;
    };
    if let Err(e) = sink.write_all(line.as_bytes()) {
        warn!(log = kind, error = %e, "Audit log write failed");
        *failures += 1;
    }
}
