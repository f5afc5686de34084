//! Authority identifier extraction
//!
//! A record carries its authority identifier either in the primary control field
//! (`001`, optionally prefixed and labelled by `003`) or in a secondary system-number
//! field (`035 $a`, wrapped as `(OCoLC)nnnn`). Primary wins when it yields a valid
//! candidate.

use std::fmt;

use catmig_common::TaggedRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

pub const PRIMARY_TAG: &str = "001";
pub const LABEL_TAG: &str = "003";
pub const SECONDARY_TAG: &str = "035";

/// Source label of the authority service
pub const AUTHORITY_LABEL: &str = "OCoLC";

/// Vendor prefixes stripped from primary values, applied in this order
const PRIMARY_PREFIXES: &[&str] = &["ocn", "ocm", "on"];

static SECONDARY_WRAPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(OCoLC\)").expect("static pattern"));

/// A validated authority identifier (digits only, no leading zeros)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validate a candidate after trimming whitespace and control artifacts
    ///
    /// Zero padding is dropped so `01234567` and `1234567` name the same record;
    /// an all-zero value keeps a single `0`.
    pub fn parse(candidate: &str) -> Option<Self> {
        let trimmed = candidate.trim_matches(|c: char| c.is_whitespace() || c.is_control());
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let unpadded = trimmed.trim_start_matches('0');
        Some(Self(if unpadded.is_empty() { "0" } else { unpadded }.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local data-quality problem found while extracting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionDefect {
    /// More than one primary field
    DuplicatePrimary { count: usize },
    /// Primary value present and labelled but not a valid identifier
    MalformedPrimary { value: String },
    /// One `035` occurrence with several `$a` values
    DuplicateSecondarySubfield { values: Vec<String> },
    /// Labelled `035 $a` that does not reduce to digits
    MalformedSecondary { value: String },
}

impl fmt::Display for ExtractionDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePrimary { count } => write!(f, "{count} primary identifier fields"),
            Self::MalformedPrimary { value } => write!(f, "malformed primary identifier '{value}'"),
            Self::DuplicateSecondarySubfield { values } => {
                write!(f, "secondary field has duplicate $a: {}", values.join(" | "))
            }
            Self::MalformedSecondary { value } => {
                write!(f, "malformed secondary identifier '{value}'")
            }
        }
    }
}

/// Which field produced the identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierSource {
    Primary,
    Secondary,
}

/// Result of scanning one record
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub identifier: Option<Identifier>,
    pub source: Option<IdentifierSource>,
    pub defects: Vec<ExtractionDefect>,
}

/// Notes on secondary fields kept for the cancelled-identifier audit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryNote {
    /// `$z` (cancelled or invalid) identifier
    Cancelled(Identifier),
    /// Field without any `$a`
    MissingValue,
    /// One of several `$a` values on the same field
    DuplicateValue(Identifier),
}

impl SecondaryNote {
    /// Kind label and value column of the audit line
    pub fn columns(&self) -> (&'static str, &str) {
        match self {
            Self::Cancelled(id) => ("z", id.as_str()),
            Self::MissingValue => ("a missing", " "),
            Self::DuplicateValue(id) => ("a duplicate", id.as_str()),
        }
    }
}

/// Candidate from a primary value, given the record's label value
///
/// Known vendor prefixes imply the authority; otherwise the label must name it.
pub fn primary_identifier(value: &str, label: Option<&str>) -> Option<Identifier> {
    primary_candidate(value, label).and_then(|c| Identifier::parse(&c))
}

fn primary_candidate(value: &str, label: Option<&str>) -> Option<String> {
    if PRIMARY_PREFIXES.iter().any(|p| value.contains(p)) {
        let mut stripped = value.to_string();
        for prefix in PRIMARY_PREFIXES {
            stripped = stripped.replace(prefix, "");
        }
        Some(stripped)
    } else if label.is_some_and(|l| l.contains(AUTHORITY_LABEL)) {
        Some(value.to_string())
    } else {
        None
    }
}

/// Candidate from one secondary `$a` value, if it names the authority
pub fn secondary_identifier(value: &str) -> Option<Identifier> {
    if !value.contains(AUTHORITY_LABEL) {
        return None;
    }
    Identifier::parse(&SECONDARY_WRAPPER.replace_all(value, ""))
}

/// Scan a record for its authority identifier
pub fn extract(record: &TaggedRecord) -> Extraction {
    let mut extraction = Extraction::default();

    let primaries: Vec<_> = record.fields_with_tag(PRIMARY_TAG).collect();
    match primaries.len() {
        0 => {}
        1 => {
            let value = primaries[0].value();
            let label = record.control_value(LABEL_TAG);
            if let Some(candidate) = primary_candidate(&value, label) {
                match Identifier::parse(&candidate) {
                    Some(id) => {
                        extraction.identifier = Some(id);
                        extraction.source = Some(IdentifierSource::Primary);
                        return extraction;
                    }
                    None => extraction.defects.push(ExtractionDefect::MalformedPrimary { value }),
                }
            }
        }
        count => extraction
            .defects
            .push(ExtractionDefect::DuplicatePrimary { count }),
    }

    // Any occurrence with a repeated $a makes every secondary value untrustworthy
    let mut ambiguous = false;
    for field in record.fields_with_tag(SECONDARY_TAG) {
        let values = field.subfield_values('a');
        if values.len() > 1 {
            ambiguous = true;
            extraction
                .defects
                .push(ExtractionDefect::DuplicateSecondarySubfield {
                    values: values.iter().map(|v| v.to_string()).collect(),
                });
        }
    }

    if !ambiguous {
        for field in record.fields_with_tag(SECONDARY_TAG) {
            let Some(value) = field.subfield('a') else {
                continue;
            };
            if !value.contains(AUTHORITY_LABEL) {
                continue;
            }
            match secondary_identifier(value) {
                Some(id) => {
                    extraction.identifier = Some(id);
                    extraction.source = Some(IdentifierSource::Secondary);
                    break;
                }
                None => extraction.defects.push(ExtractionDefect::MalformedSecondary {
                    value: value.to_string(),
                }),
            }
        }
    }

    for defect in &extraction.defects {
        warn!(defect = %defect, "Identifier defect in local record");
    }
    extraction
}

/// Cancelled, missing and duplicate secondary values worth auditing
pub fn secondary_notes(record: &TaggedRecord) -> Vec<SecondaryNote> {
    let mut notes = Vec::new();
    for field in record.fields_with_tag(SECONDARY_TAG) {
        notes.extend(
            field
                .subfield_values('z')
                .into_iter()
                .filter_map(secondary_identifier)
                .map(SecondaryNote::Cancelled),
        );

        let values = field.subfield_values('a');
        if values.is_empty() {
            notes.push(SecondaryNote::MissingValue);
        } else if values.len() > 1 {
            notes.extend(
                values
                    .into_iter()
                    .filter_map(secondary_identifier)
                    .map(SecondaryNote::DuplicateValue),
            );
        }
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use catmig_common::{Leader, Subfield, TaggedField};

    fn record(fields: Vec<TaggedField>) -> TaggedRecord {
        TaggedRecord::with_fields(Leader::default(), fields)
    }

    fn secondary(values: &[(char, &str)]) -> TaggedField {
        TaggedField::data(
            SECONDARY_TAG,
            [' ', ' '],
            values.iter().map(|(c, v)| Subfield::new(*c, *v)).collect(),
        )
    }

    #[test]
    fn test_prefix_stripped() {
        let r = record(vec![TaggedField::control("001", "ocm01234567")]);
        let extraction = extract(&r);
        assert_eq!(extraction.identifier.unwrap().as_str(), "1234567");
        assert_eq!(extraction.source, Some(IdentifierSource::Primary));
    }

    #[test]
    fn test_every_prefix_variant() {
        for raw in ["ocn987654321", "on1234567890", "ocm00012345"] {
            let id = primary_identifier(raw, None).unwrap();
            assert!(id.as_str().chars().all(|c| c.is_ascii_digit()), "{raw}");
        }
    }

    #[test]
    fn test_unprefixed_needs_label() {
        assert_eq!(primary_identifier("12345", None), None);
        assert_eq!(primary_identifier("12345", Some("DLC")), None);
        assert_eq!(
            primary_identifier("12345", Some("OCoLC")).unwrap().as_str(),
            "12345"
        );
    }

    #[test]
    fn test_trailing_artifacts_trimmed() {
        let id = primary_identifier("ocm01234567 \u{1e}", None).unwrap();
        assert_eq!(id.as_str(), "1234567");
    }

    #[test]
    fn test_malformed_primary_falls_through_to_secondary() {
        let r = record(vec![
            TaggedField::control("001", "ocmABC"),
            secondary(&[('a', "(OCoLC)555")]),
        ]);
        let extraction = extract(&r);
        assert_eq!(extraction.identifier.unwrap().as_str(), "555");
        assert_eq!(extraction.source, Some(IdentifierSource::Secondary));
        assert_eq!(extraction.defects.len(), 1);
    }

    #[test]
    fn test_primary_wins_over_secondary() {
        let r = record(vec![
            TaggedField::control("001", "ocm111"),
            secondary(&[('a', "(OCoLC)222")]),
        ]);
        assert_eq!(extract(&r).identifier.unwrap().as_str(), "111");
    }

    #[test]
    fn test_duplicate_secondary_subfield_is_defect() {
        let r = record(vec![secondary(&[('a', "(OCoLC)1"), ('a', "(OCoLC)2")])]);
        let extraction = extract(&r);
        assert!(extraction.identifier.is_none());
        assert_eq!(extraction.defects.len(), 1);
        assert!(matches!(
            extraction.defects[0],
            ExtractionDefect::DuplicateSecondarySubfield { .. }
        ));
    }

    #[test]
    fn test_duplicate_secondary_blocks_in_any_order() {
        let single = secondary(&[('a', "(OCoLC)1")]);
        let doubled = secondary(&[('a', "(OCoLC)2"), ('a', "(OCoLC)3")]);
        for fields in [
            vec![single.clone(), doubled.clone()],
            vec![doubled.clone(), single.clone()],
        ] {
            let extraction = extract(&record(fields));
            assert!(extraction.identifier.is_none());
            assert_eq!(extraction.defects.len(), 1);
        }

        let with_primary = record(vec![
            TaggedField::control("001", "ocm77"),
            doubled,
            single,
        ]);
        assert_eq!(extract(&with_primary).identifier.unwrap().as_str(), "77");
    }

    #[test]
    fn test_zero_padding_dropped() {
        assert_eq!(Identifier::parse("0001234567").unwrap().as_str(), "1234567");
        assert_eq!(Identifier::parse("000").unwrap().as_str(), "0");
        assert_eq!(secondary_identifier("(OCoLC)00042").unwrap().as_str(), "42");
        assert_eq!(Identifier::parse("0012a"), None);
    }

    #[test]
    fn test_unlabelled_secondary_ignored() {
        let r = record(vec![secondary(&[('a', "(DLC)12345")])]);
        let extraction = extract(&r);
        assert!(extraction.identifier.is_none());
        assert!(extraction.defects.is_empty());
    }

    #[test]
    fn test_secondary_notes() {
        let r = record(vec![
            secondary(&[('a', "(OCoLC)1"), ('z', "(OCoLC)9")]),
            secondary(&[('z', "(OCoLC)8")]),
            secondary(&[('a', "(OCoLC)2"), ('a', "(OCoLC)3")]),
        ]);
        let notes = secondary_notes(&r);
        assert_eq!(
            notes,
            vec![
                SecondaryNote::Cancelled(Identifier::parse("9").unwrap()),
                SecondaryNote::Cancelled(Identifier::parse("8").unwrap()),
                SecondaryNote::MissingValue,
                SecondaryNote::DuplicateValue(Identifier::parse("2").unwrap()),
                SecondaryNote::DuplicateValue(Identifier::parse("3").unwrap()),
            ]
        );
    }
}
