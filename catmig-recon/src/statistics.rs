//! Run statistics
//!
//! Counters for one pipeline run, reported at the end through tracing and,
//! optionally, written out as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::output::Outcome;
use crate::substitution::SubstitutionReport;

/// Counters accumulated over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Records read, including undecodable ones
    pub processed: u64,
    pub modified: u64,
    pub fuzzy_modified: u64,
    pub unmodified: u64,
    pub bad: u64,

    /// Fuzzy records whose substituted title still passed verification
    pub fuzzy_passed: u64,
    pub fuzzy_failed: u64,

    pub identifiers_replaced: u64,
    pub leaders_replaced: u64,
    /// Fields written per tag
    pub field_tally: BTreeMap<String, u64>,

    /// Lookups that exhausted every attempt
    pub failed_lookups: u64,
    /// Per-record errors absorbed by the pipeline
    pub record_errors: u64,
    pub identifier_defects: u64,
    pub missing_titles: u64,
    pub audit_write_failures: u64,

    /// Policy-defined counters
    pub policy: BTreeMap<String, u64>,
}

impl RunStatistics {
    pub fn record_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Modified => self.modified += 1,
            Outcome::FuzzyModified => self.fuzzy_modified += 1,
            Outcome::Unmodified => self.unmodified += 1,
            Outcome::Bad => self.bad += 1,
        }
    }

    pub fn merge_substitution(&mut self, report: &SubstitutionReport) {
        if report.identifier_replaced {
            self.identifiers_replaced += 1;
        }
        if report.leader_replaced {
            self.leaders_replaced += 1;
        }
        self.merge_tally(&report.tally);
    }

    pub fn merge_tally(&mut self, tally: &BTreeMap<String, u64>) {
        for (tag, count) in tally {
            *self.field_tally.entry(tag.clone()).or_default() += count;
        }
    }

    /// Sum of routed outcomes; equals `processed` at the end of a run
    pub fn routed(&self) -> u64 {
        self.modified + self.fuzzy_modified + self.unmodified + self.bad
    }

    pub fn fields_replaced(&self) -> u64 {
        self.field_tally.values().sum()
    }

    pub fn display_string(&self) -> String {
        format!(
            "{} processed: {} modified, {} fuzzy, {} unmodified, {} bad",
            self.processed, self.modified, self.fuzzy_modified, self.unmodified, self.bad
        )
    }

    /// Emit the summary through tracing
    pub fn log_summary(&self) {
        tracing::info!("{}", self.display_string());
        tracing::info!(
            passed = self.fuzzy_passed,
            failed = self.fuzzy_failed,
            "Fuzzy title re-verification"
        );
        tracing::info!(
            identifiers = self.identifiers_replaced,
            leaders = self.leaders_replaced,
            fields = self.fields_replaced(),
            "Substitutions"
        );
        for (tag, count) in &self.field_tally {
            tracing::info!(tag = %tag, count, "Field substitutions");
        }
        for (name, count) in &self.policy {
            tracing::info!(counter = %name, count, "Policy");
        }
        if self.failed_lookups + self.record_errors + self.audit_write_failures > 0 {
            tracing::warn!(
                failed_lookups = self.failed_lookups,
                record_errors = self.record_errors,
                audit_write_failures = self.audit_write_failures,
                "Run completed with errors"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_and_tally() {
        let mut stats = RunStatistics::default();
        stats.record_outcome(Outcome::Modified);
        stats.record_outcome(Outcome::Unmodified);
        stats.record_outcome(Outcome::Unmodified);

        let mut report = SubstitutionReport {
            identifier_replaced: true,
            leader_replaced: true,
            ..Default::default()
        };
        report.tally.insert("245".to_string(), 1);
        report.tally.insert("650".to_string(), 3);
        stats.merge_substitution(&report);
        stats.merge_substitution(&report);

        assert_eq!(stats.routed(), 3);
        assert_eq!(stats.identifiers_replaced, 2);
        assert_eq!(stats.field_tally.get("650"), Some(&6));
        assert_eq!(stats.fields_replaced(), 8);
        assert_eq!(
            stats.display_string(),
            "0 processed: 1 modified, 0 fuzzy, 2 unmodified, 0 bad"
        );
    }

    #[test]
    fn test_serializes_to_json() {
        let mut stats = RunStatistics {
            processed: 1,
            ..Default::default()
        };
        stats.policy.insert("ebook records".to_string(), 4);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["processed"], 1);
        assert_eq!(json["policy"]["ebook records"], 4);
    }
}
