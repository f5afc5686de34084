//! Field substitution from an authority record into a local record
//!
//! Order of operations for one record:
//! 1. identifier fields (`001`/`003`) take the authority's identifier and label
//! 2. the leader is replaced wholesale
//! 3. each configured tag is replaced according to the [`Strategy`]
//! 4. conditional moves preserve local fields the authority does not supply
//!
//! Applying the same authority record twice yields the same record.

pub mod fields;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use catmig_common::marc::is_control_tag;
use catmig_common::{TaggedField, TaggedRecord};

use crate::authority::ExternalRecord;
use crate::error::{ReconError, ReconResult};
use crate::identifier::{AUTHORITY_LABEL, LABEL_TAG, PRIMARY_TAG};

/// Pseudo-tag naming the leader in substitution lists
pub const LEADER_TAG: &str = "LDR";

/// How configured tags are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Replace local occurrences and add tags the local record lacks
    #[default]
    ReplaceAndAdd,
    /// Touch only tags the local record already carries
    ReplaceOnly,
}

impl FromStr for Strategy {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "replace_and_add" => Ok(Self::ReplaceAndAdd),
            "replace_only" => Ok(Self::ReplaceOnly),
            other => Err(ReconError::Config(format!(
                "unknown substitution strategy '{other}' (expected replace_and_add or replace_only)"
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReplaceAndAdd => "replace_and_add",
            Self::ReplaceOnly => "replace_only",
        })
    }
}

/// What a substitution tag refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Leader,
    Identifier,
    Control,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionRule {
    pub tag: String,
    pub kind: TagKind,
}

impl SubstitutionRule {
    pub fn new(tag: &str) -> ReconResult<Self> {
        let tag = tag.trim();
        let kind = if tag.eq_ignore_ascii_case(LEADER_TAG) {
            TagKind::Leader
        } else if tag.len() != 3 || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ReconError::Config(format!("invalid substitution tag '{tag}'")));
        } else if tag == PRIMARY_TAG || tag == LABEL_TAG {
            TagKind::Identifier
        } else if is_control_tag(tag) {
            TagKind::Control
        } else {
            TagKind::Data
        };
        Ok(Self {
            tag: tag.to_string(),
            kind,
        })
    }
}

/// Ordered tag list plus strategy, fixed for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionRules {
    rules: Vec<SubstitutionRule>,
    strategy: Strategy,
}

impl SubstitutionRules {
    /// Build from configured tags; duplicates are dropped, order kept
    pub fn new<S: AsRef<str>>(tags: &[S], strategy: Strategy) -> ReconResult<Self> {
        let mut rules: Vec<SubstitutionRule> = Vec::with_capacity(tags.len());
        for tag in tags {
            let rule = SubstitutionRule::new(tag.as_ref())?;
            if !rules.iter().any(|r| r.tag == rule.tag) {
                rules.push(rule);
            }
        }
        Ok(Self { rules, strategy })
    }

    pub fn rules(&self) -> &[SubstitutionRule] {
        &self.rules
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }
}

/// Local tag to preserve under another tag when the authority lacks it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalMove {
    pub from: String,
    pub to: String,
}

impl ConditionalMove {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Replaced,
    Moved,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Replaced => "replaced",
            Self::Moved => "moved",
        })
    }
}

/// One removed or moved local value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub record_id: String,
    pub tag: String,
    pub old_value: String,
    pub new_value: String,
    pub action: AuditAction,
}

/// What one application changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionReport {
    pub identifier_replaced: bool,
    pub leader_replaced: bool,
    /// Fields written per tag (authority additions and move targets)
    pub tally: BTreeMap<String, u64>,
    pub audit: Vec<AuditEntry>,
}

impl SubstitutionReport {
    fn count(&mut self, tag: &str, n: usize) {
        if n > 0 {
            *self.tally.entry(tag.to_string()).or_default() += n as u64;
        }
    }
}

/// Applies [`SubstitutionRules`] to local records
#[derive(Debug, Clone)]
pub struct SubstitutionEngine {
    rules: SubstitutionRules,
}

impl SubstitutionEngine {
    pub fn new(rules: SubstitutionRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SubstitutionRules {
        &self.rules
    }

    /// Substitute authority content into `local`
    ///
    /// Fails without touching `local` when the authority record has no identifier.
    pub fn apply(
        &self,
        local: &mut TaggedRecord,
        external: &ExternalRecord,
        moves: &[ConditionalMove],
    ) -> ReconResult<SubstitutionReport> {
        let authority = external.record();
        let authority_id = external.authority_id().ok_or_else(|| {
            ReconError::AuthorityIntegrity(
                local
                    .control_value(PRIMARY_TAG)
                    .unwrap_or("unknown")
                    .to_string(),
            )
        })?;

        let mut report = SubstitutionReport::default();
        let mut working = local.take_fields();

        // 1. identifier and label
        working = fields::replace_control(working, PRIMARY_TAG, authority_id).0;
        working = fields::replace_control(working, LABEL_TAG, AUTHORITY_LABEL).0;
        report.identifier_replaced = true;

        // 2. leader
        local.set_leader(authority.leader().clone());
        report.leader_replaced = true;

        // 3. configured tags
        let present: Vec<String> = working.iter().map(|f| f.tag().to_string()).collect();
        let mut main_entry_cleared = false;
        for rule in self.rules.rules() {
            if self.rules.strategy() == Strategy::ReplaceOnly && !present.contains(&rule.tag) {
                continue;
            }
            match rule.kind {
                TagKind::Leader | TagKind::Identifier => {}
                TagKind::Control => {
                    let Some(value) = authority.control_value(&rule.tag) else {
                        continue;
                    };
                    let (next, removed) = fields::replace_control(working, &rule.tag, value);
                    working = next;
                    report.count(&rule.tag, 1);
                    audit_removed(&mut report, authority_id, &rule.tag, value, removed);
                }
                TagKind::Data => {
                    let additions: Vec<TaggedField> =
                        authority.fields_with_tag(&rule.tag).cloned().collect();
                    if additions.is_empty() {
                        continue;
                    }
                    let new_value = additions
                        .iter()
                        .map(|f| f.value())
                        .collect::<Vec<_>>()
                        .join(" | ");
                    // Local main entries go once; a second authority main entry only adds
                    let is_main_entry = fields::MAIN_ENTRY_TAGS.contains(&rule.tag.as_str());
                    let remove = if is_main_entry && main_entry_cleared {
                        Vec::new()
                    } else {
                        fields::replacement_class(&rule.tag)
                    };
                    main_entry_cleared |= is_main_entry;
                    let (next, removed) = fields::replace_fields(working, &remove, &additions);
                    working = next;
                    report.count(&rule.tag, additions.len());
                    audit_removed(&mut report, authority_id, &rule.tag, &new_value, removed);
                }
            }
        }

        // 4. preserve local fields the authority does not supply
        for mv in moves {
            if authority.has_tag(&mv.from) {
                continue;
            }
            let (next, moved) = move_with_audit(working, mv, authority_id, &mut report);
            working = next;
            report.count(&mv.to, moved);
        }

        local.set_fields(working);
        Ok(report)
    }
}

/// Move every field named by the mappings, regardless of the authority
///
/// Used on records that end up unmodified, so local notes land in the same
/// place whether or not a match was found.
pub fn apply_moves(local: &mut TaggedRecord, moves: &[ConditionalMove]) -> BTreeMap<String, u64> {
    let mut tally = BTreeMap::new();
    let mut working = local.take_fields();
    for mv in moves {
        let (next, moved) = fields::move_fields(working, &mv.from, &mv.to);
        working = next;
        if moved > 0 {
            *tally.entry(mv.to.clone()).or_default() += moved as u64;
        }
    }
    local.set_fields(working);
    tally
}

fn move_with_audit(
    working: Vec<TaggedField>,
    mv: &ConditionalMove,
    record_id: &str,
    report: &mut SubstitutionReport,
) -> (Vec<TaggedField>, usize) {
    for field in working.iter().filter(|f| f.tag() == mv.from) {
        report.audit.push(AuditEntry {
            record_id: record_id.to_string(),
            tag: mv.from.clone(),
            old_value: field.value(),
            new_value: format!("{} {}", mv.to, field.value()),
            action: AuditAction::Moved,
        });
    }
    fields::move_fields(working, &mv.from, &mv.to)
}

fn audit_removed(
    report: &mut SubstitutionReport,
    record_id: &str,
    tag: &str,
    new_value: &str,
    removed: Vec<TaggedField>,
) {
    for field in removed {
        report.audit.push(AuditEntry {
            record_id: record_id.to_string(),
            tag: tag.to_string(),
            old_value: field.value(),
            new_value: new_value.to_string(),
            action: AuditAction::Replaced,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catmig_common::{Leader, Subfield};

    fn data(tag: &str, a: &str) -> TaggedField {
        TaggedField::data(tag, [' ', ' '], vec![Subfield::new('a', a)])
    }

    fn authority(fields: Vec<TaggedField>) -> ExternalRecord {
        ExternalRecord::from_record(TaggedRecord::with_fields(
            Leader::new("00000cam a2200000 a 4500"),
            fields,
        ))
    }

    fn engine(tags: &[&str], strategy: Strategy) -> SubstitutionEngine {
        SubstitutionEngine::new(SubstitutionRules::new(tags, strategy).unwrap())
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("replace_only".parse::<Strategy>().unwrap(), Strategy::ReplaceOnly);
        assert_eq!("Replace-And-Add".parse::<Strategy>().unwrap(), Strategy::ReplaceAndAdd);
        assert!("merge".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_rule_kinds() {
        let rules = SubstitutionRules::new(["LDR", "001", "008", "245", "245"].as_slice(), Strategy::default())
            .unwrap();
        let kinds: Vec<_> = rules.rules().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![TagKind::Leader, TagKind::Identifier, TagKind::Control, TagKind::Data]
        );
        assert!(SubstitutionRule::new("24").is_err());
    }

    #[test]
    fn test_identifier_and_leader_replaced() {
        let mut local = TaggedRecord::with_fields(
            Leader::default(),
            vec![TaggedField::control("001", "ocm0042"), data("245", "T")],
        );
        let external = authority(vec![TaggedField::control("001", "42")]);
        let report = engine(&[], Strategy::ReplaceAndAdd)
            .apply(&mut local, &external, &[])
            .unwrap();

        assert!(report.identifier_replaced && report.leader_replaced);
        assert_eq!(local.control_value("001"), Some("42"));
        assert_eq!(local.control_value("003"), Some("OCoLC"));
        assert_eq!(local.leader().as_str(), "00000cam a2200000 a 4500");
        let tags: Vec<_> = local.fields().iter().map(|f| f.tag()).collect();
        assert_eq!(tags, vec!["001", "003", "245"]);
    }

    #[test]
    fn test_missing_authority_identifier_leaves_local_untouched() {
        let mut local = TaggedRecord::with_fields(Leader::default(), vec![data("245", "T")]);
        let before = local.clone();
        let external = authority(vec![data("245", "Other")]);
        let result = engine(&["245"], Strategy::ReplaceAndAdd).apply(&mut local, &external, &[]);
        assert!(matches!(result, Err(ReconError::AuthorityIntegrity(_))));
        assert_eq!(local, before);
    }

    #[test]
    fn test_replace_only_skips_absent_tags() {
        let mut local = TaggedRecord::with_fields(
            Leader::default(),
            vec![TaggedField::control("001", "1"), data("245", "Local")],
        );
        let external = authority(vec![
            TaggedField::control("001", "1"),
            data("245", "Authority"),
            data("650", "Subject"),
        ]);
        let report = engine(&["245", "650"], Strategy::ReplaceOnly)
            .apply(&mut local, &external, &[])
            .unwrap();
        assert_eq!(local.first("245").unwrap().subfield('a'), Some("Authority"));
        assert!(!local.has_tag("650"));
        assert_eq!(report.tally.get("245"), Some(&1));
    }

    #[test]
    fn test_second_main_entry_rule_keeps_first_addition() {
        let mut local = TaggedRecord::with_fields(
            Leader::default(),
            vec![
                TaggedField::control("001", "1"),
                data("110", "Local body"),
                data("245", "Title"),
            ],
        );
        let external = authority(vec![
            TaggedField::control("001", "1"),
            data("100", "Author"),
            data("130", "Uniform title"),
            data("245", "Title"),
        ]);
        let engine = engine(&["100", "130"], Strategy::ReplaceAndAdd);

        let report = engine.apply(&mut local, &external, &[]).unwrap();

        assert_eq!(local.first("100").unwrap().subfield('a'), Some("Author"));
        assert_eq!(local.first("130").unwrap().subfield('a'), Some("Uniform title"));
        assert!(!local.has_tag("110"));
        assert_eq!(report.audit.len(), 1);
        assert_eq!(report.audit[0].old_value, "Local body");

        let once = local.clone();
        engine.apply(&mut local, &external, &[]).unwrap();
        assert_eq!(local, once);
    }

    #[test]
    fn test_tag_without_authority_occurrence_is_kept() {
        let mut local = TaggedRecord::with_fields(
            Leader::default(),
            vec![TaggedField::control("001", "1"), data("650", "Local subject")],
        );
        let external = authority(vec![TaggedField::control("001", "1")]);
        let report = engine(&["650"], Strategy::ReplaceAndAdd)
            .apply(&mut local, &external, &[])
            .unwrap();
        assert_eq!(local.first("650").unwrap().value(), "Local subject");
        assert!(report.audit.is_empty());
    }

    #[test]
    fn test_conditional_move_only_when_authority_lacks_tag() {
        let moves = [ConditionalMove::new("500", "591")];
        let local = TaggedRecord::with_fields(
            Leader::default(),
            vec![TaggedField::control("001", "1"), data("500", "Local note")],
        );

        let mut without = local.clone();
        let report = engine(&["500"], Strategy::ReplaceAndAdd)
            .apply(&mut without, &authority(vec![TaggedField::control("001", "1")]), &moves)
            .unwrap();
        assert_eq!(without.first("591").unwrap().value(), "Local note");
        assert!(!without.has_tag("500"));
        assert_eq!(report.tally.get("591"), Some(&1));

        let mut with = local.clone();
        engine(&["500"], Strategy::ReplaceAndAdd)
            .apply(
                &mut with,
                &authority(vec![TaggedField::control("001", "1"), data("500", "Authority note")]),
                &moves,
            )
            .unwrap();
        assert!(!with.has_tag("591"));
        assert_eq!(with.first("500").unwrap().value(), "Authority note");
    }

    #[test]
    fn test_control_field_replaced() {
        let mut local = TaggedRecord::with_fields(
            Leader::default(),
            vec![TaggedField::control("001", "1"), TaggedField::control("008", "local")],
        );
        let external = authority(vec![
            TaggedField::control("001", "1"),
            TaggedField::control("008", "authority"),
        ]);
        let report = engine(&["008"], Strategy::ReplaceAndAdd)
            .apply(&mut local, &external, &[])
            .unwrap();
        assert_eq!(local.control_value("008"), Some("authority"));
        assert_eq!(report.audit.len(), 1);
        assert_eq!(report.audit[0].old_value, "local");
    }

    #[test]
    fn test_apply_moves_unconditionally() {
        let mut local = TaggedRecord::with_fields(
            Leader::default(),
            vec![data("500", "a"), data("500", "b"), data("505", "c")],
        );
        let tally = apply_moves(
            &mut local,
            &[ConditionalMove::new("500", "591"), ConditionalMove::new("505", "590")],
        );
        assert_eq!(tally.get("591"), Some(&2));
        assert_eq!(tally.get("590"), Some(&1));
        let tags: Vec<_> = local.fields().iter().map(|f| f.tag()).collect();
        assert_eq!(tags, vec!["590", "591", "591"]);
    }
}
