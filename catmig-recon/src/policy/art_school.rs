//! Art-school library migration policy
//!
//! Local conventions of the source catalog:
//! - online holdings are flagged by `900 $a` (streaming video, ebooks, periodicals)
//! - general and contents notes are kept locally as `591`/`590` when the authority
//!   does not supply them
//! - holdings notes packed into `852 $1` are split out as inventory and fund notes
//! - local fields carry `$9 local` so the next system keeps them on import
//! - placeholder control numbers are replaced by a local sequence

use catmig_common::{Subfield, TaggedField, TaggedRecord};
use once_cell::sync::Lazy;
use regex::Regex;

use super::PolicyExtension;
use crate::identifier::{primary_identifier, Identifier, LABEL_TAG, PRIMARY_TAG, AUTHORITY_LABEL};
use crate::substitution::ConditionalMove;

/// Label written to `003` for locally numbered records
pub const LOCAL_LABEL: &str = "ARTLIB";

/// Local sequence starts after this value
const FIRST_LOCAL_ID: u64 = 100;

/// `003` values that never identify a trustworthy source
const PLACEHOLDER_LABELS: &[&str] = &["COMPanion", "CStRLIN", "DSS", "DLC", ""];

/// Fields preserved on import by a `$9 local` marker
const LOCAL_FIELDS: &[&str] = &[
    "590", "591", "592", "690", "852", "900", "901", "902", "909", "910", "913", "917", "918",
    "921", "936", "938", "940", "945", "962", "966", "970", "971", "975", "987", "989", "991",
    "994", "995", "998", "999",
];

const HOLDINGS_TAG: &str = "852";
const ONLINE_FLAG_TAG: &str = "900";

static CD_CALL_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^cd\s").expect("static pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnlineKind {
    StreamingVideo,
    Ebook,
    OnlinePeriodical,
}

impl OnlineKind {
    fn classify(flag: &str) -> Option<Self> {
        if flag.contains("STREAMING VIDEO") {
            Some(Self::StreamingVideo)
        } else if flag.contains("EBOOK") {
            Some(Self::Ebook)
        } else if flag.contains("ONLINE PERIODICAL") {
            Some(Self::OnlinePeriodical)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtSchoolPolicy {
    streaming_video: u64,
    ebooks: u64,
    online_periodicals: u64,
    last_local_id: u64,
}

impl Default for ArtSchoolPolicy {
    fn default() -> Self {
        Self {
            streaming_video: 0,
            ebooks: 0,
            online_periodicals: 0,
            last_local_id: FIRST_LOCAL_ID,
        }
    }
}

impl ArtSchoolPolicy {
    pub fn total_online(&self) -> u64 {
        self.streaming_video + self.ebooks + self.online_periodicals
    }

    fn next_local_id(&mut self) -> u64 {
        self.last_local_id += 1;
        self.last_local_id
    }
}

impl PolicyExtension for ArtSchoolPolicy {
    fn name(&self) -> &'static str {
        "art-school"
    }

    fn execute(&mut self, record: &mut TaggedRecord, _identifier: Option<&Identifier>) {
        split_holdings_notes(record);
        merge_language_entry(record);
        mark_local_fields(record);
    }

    fn is_online(&mut self, record: &TaggedRecord) -> bool {
        let kind = record
            .fields_with_tag(ONLINE_FLAG_TAG)
            .filter_map(|f| f.subfield('a'))
            .find_map(OnlineKind::classify);
        match kind {
            Some(OnlineKind::StreamingVideo) => self.streaming_video += 1,
            Some(OnlineKind::Ebook) => self.ebooks += 1,
            Some(OnlineKind::OnlinePeriodical) => self.online_periodicals += 1,
            None => return false,
        }
        true
    }

    fn conditional_moves(&self) -> Vec<ConditionalMove> {
        vec![
            ConditionalMove::new("500", "591"),
            ConditionalMove::new("505", "590"),
        ]
    }

    fn set_local_identifier(&mut self, record: &mut TaggedRecord) {
        let label = record.control_value(LABEL_TAG).map(str::to_string);
        let primary = record.control_value(PRIMARY_TAG).map(str::to_string);

        let relabel = match (label.as_deref(), primary.as_deref()) {
            (None, _) => true,
            (Some(l), _) if PLACEHOLDER_LABELS.contains(&l) => true,
            (Some(l), Some(value)) if l == AUTHORITY_LABEL => {
                // Keep a plausible authority number where a cataloger can find it
                if primary_identifier(value, Some(l)).is_some() {
                    record.insert_ordered(TaggedField::data(
                        "592",
                        [' ', ' '],
                        vec![Subfield::new('a', format!("Candidate OCLC number: {value}"))],
                    ));
                }
                true
            }
            _ => false,
        };

        if relabel {
            let id = self.next_local_id();
            record.remove_tag(PRIMARY_TAG);
            record.remove_tag(LABEL_TAG);
            record.insert_ordered(TaggedField::control(PRIMARY_TAG, id.to_string()));
            record.insert_ordered(TaggedField::control(LABEL_TAG, LOCAL_LABEL));
        }
    }

    fn analyze_type(&mut self, record: &TaggedRecord, outcome: &str) -> Vec<String> {
        let (Some(call_number), Some(extent)) = (call_number(record), extent(record)) else {
            return Vec::new();
        };
        let title = record.title().unwrap_or_default();
        type_mismatches(&call_number.to_lowercase(), &extent.to_lowercase())
            .into_iter()
            .map(|_| format!("{call_number}\t{extent}\t{outcome}\t{title}"))
            .collect()
    }

    fn counters(&self) -> Vec<(String, u64)> {
        vec![
            ("ebook records".to_string(), self.ebooks),
            ("online periodical records".to_string(), self.online_periodicals),
            ("streaming video records".to_string(), self.streaming_video),
            ("total electronic records".to_string(), self.total_online()),
        ]
    }
}

/// Copy `Inventory…` and `Fund…` notes from `852 $1` into `$i` and `$f`
fn split_holdings_notes(record: &mut TaggedRecord) {
    for field in record.fields_with_tag_mut(HOLDINGS_TAG) {
        let notes: Vec<String> = field
            .subfield_values('1')
            .into_iter()
            .flat_map(|s| s.split('|'))
            .map(str::to_string)
            .collect();
        for item in &notes {
            if item.starts_with("Inventory") {
                field.add_subfield('i', item.as_str());
            }
        }
        for item in &notes {
            if item.starts_with("Fund") {
                field.add_subfield('f', format!("{LOCAL_LABEL} {item}"));
            }
        }
    }
}

/// Fold a `130 $l` language into `100` and drop the redundant `130`
fn merge_language_entry(record: &mut TaggedRecord) {
    if !record.has_tag("100") {
        return;
    }
    let Some(language) = record
        .first("130")
        .and_then(|f| f.subfield('l'))
        .map(str::to_string)
    else {
        return;
    };
    if let Some(main_entry) = record.fields_with_tag_mut("100").next() {
        if main_entry.subfield('l').is_none() {
            main_entry.add_subfield('l', language);
        }
    }
    record.remove_tag("130");
}

fn mark_local_fields(record: &mut TaggedRecord) {
    for tag in LOCAL_FIELDS {
        for field in record.fields_with_tag_mut(tag) {
            field.add_subfield('9', "local");
        }
    }
}

/// Last single-valued `852 $h`
fn call_number(record: &TaggedRecord) -> Option<String> {
    record
        .fields_with_tag(HOLDINGS_TAG)
        .filter_map(|f| match f.subfield_values('h').as_slice() {
            [h] => Some(h.to_string()),
            _ => None,
        })
        .last()
}

/// First `300 $a`
fn extent(record: &TaggedRecord) -> Option<String> {
    record.first("300")?.subfield('a').map(str::to_string)
}

/// Rules violated by a (call number, physical extent) pair, both lowercased
fn type_mismatches(call_number: &str, extent: &str) -> Vec<&'static str> {
    let has_any = |s: &str, needles: &[&str]| needles.iter().any(|n| s.contains(n));
    let mut rules = Vec::new();

    if extent.contains("audio")
        && !has_any(call_number, &["cdrom", "cd-rom"])
        && !CD_CALL_NUMBER.is_match(call_number)
    {
        rules.push("audio");
    }
    if call_number.contains("video") && !has_any(extent, &["videocassette", "videorecording"]) {
        rules.push("video");
    }
    if call_number.contains("dvd") && !has_any(extent, &["videodisc", "dvd"]) {
        rules.push("dvd");
    }
    if has_any(call_number, &["cdrom", "cd-rom"])
        && !has_any(extent, &["cd-rom", "cdrom", "optical"])
    {
        rules.push("cdrom");
    }
    rules
}
