//! Record fixtures

use catmig_common::marc::marcxml;
use catmig_common::{Leader, Subfield, TaggedField, TaggedRecord};

pub const LOCAL_LEADER: &str = "00000nam  2200000   4500";
pub const AUTHORITY_LEADER: &str = "00000cam a2200000 i 4500";

/// Data field with blank indicators
pub fn data(tag: &str, subfields: &[(char, &str)]) -> TaggedField {
    TaggedField::data(
        tag,
        [' ', ' '],
        subfields
            .iter()
            .map(|(code, value)| Subfield::new(*code, *value))
            .collect(),
    )
}

/// Local record with a primary identifier (and optional label) plus extra fields
pub fn local_record(primary: Option<&str>, label: Option<&str>, rest: Vec<TaggedField>) -> TaggedRecord {
    let mut fields = Vec::new();
    if let Some(primary) = primary {
        fields.push(TaggedField::control("001", primary));
    }
    if let Some(label) = label {
        fields.push(TaggedField::control("003", label));
    }
    fields.extend(rest);
    TaggedRecord::with_fields(Leader::new(LOCAL_LEADER), fields)
}

/// Authority record with the given identifier and title
pub fn authority_record(id: Option<&str>, title: &str, rest: Vec<TaggedField>) -> TaggedRecord {
    let mut fields = Vec::new();
    if let Some(id) = id {
        fields.push(TaggedField::control("001", id));
    }
    fields.push(TaggedField::control("008", "850101s1951    nyu           000 1 eng  "));
    fields.push(data("245", &[('a', title)]));
    fields.extend(rest);
    TaggedRecord::with_fields(Leader::new(AUTHORITY_LEADER), fields)
}

/// MARCXML payload, as the authority service would return it
pub fn authority_payload(id: &str, title: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}",
        marcxml::to_marcxml(&authority_record(Some(id), title, Vec::new()))
    )
}
