//! Institution-specific policy hooks
//!
//! A policy adjusts records after substitution, splits output between physical and
//! online holdings, and relabels records whose identifiers cannot be trusted.
//! Every hook has a no-op default, so [`NoPolicy`] is the empty impl.

pub mod art_school;

use catmig_common::TaggedRecord;

use crate::error::{ReconError, ReconResult};
use crate::identifier::Identifier;
use crate::substitution::ConditionalMove;

pub use art_school::ArtSchoolPolicy;

/// Policy hooks invoked by the pipeline
pub trait PolicyExtension: Send {
    fn name(&self) -> &'static str;

    /// Institution adjustments, run after substitution or no-match handling
    fn execute(&mut self, _record: &mut TaggedRecord, _identifier: Option<&Identifier>) {}

    /// Whether the record describes an online resource
    fn is_online(&mut self, _record: &TaggedRecord) -> bool {
        false
    }

    /// Local tags preserved under another tag when the authority lacks them
    fn conditional_moves(&self) -> Vec<ConditionalMove> {
        Vec::new()
    }

    /// Assign a local identifier when the existing one is untrustworthy
    fn set_local_identifier(&mut self, _record: &mut TaggedRecord) {}

    /// Diagnostic lines about material-type inconsistencies
    fn analyze_type(&mut self, _record: &TaggedRecord, _outcome: &str) -> Vec<String> {
        Vec::new()
    }

    /// Named counters for the run summary
    fn counters(&self) -> Vec<(String, u64)> {
        Vec::new()
    }
}

/// Policy that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPolicy;

impl PolicyExtension for NoPolicy {
    fn name(&self) -> &'static str {
        "none"
    }
}

/// Construct a policy from its configured name
pub fn policy_by_name(name: &str) -> ReconResult<Box<dyn PolicyExtension>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "" | "none" => Ok(Box::new(NoPolicy)),
        "art-school" | "art_school" => Ok(Box::new(ArtSchoolPolicy::default())),
        other => Err(ReconError::Config(format!(
            "unknown policy '{other}' (expected none or art-school)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_by_name() {
        assert_eq!(policy_by_name("none").unwrap().name(), "none");
        assert_eq!(policy_by_name("Art-School").unwrap().name(), "art-school");
        assert!(matches!(policy_by_name("museum"), Err(ReconError::Config(_))));
    }

    #[test]
    fn test_no_policy_is_inert() {
        let mut policy = NoPolicy;
        let mut record = TaggedRecord::default();
        policy.execute(&mut record, None);
        policy.set_local_identifier(&mut record);
        assert_eq!(record, TaggedRecord::default());
        assert!(!policy.is_online(&record));
        assert!(policy.conditional_moves().is_empty());
    }
}
