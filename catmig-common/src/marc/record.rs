//! In-memory tagged bibliographic record
//!
//! A record is a leader plus an ordered list of tagged fields. Field order is the
//! on-the-wire order and is preserved by every codec.

use std::fmt;

/// Length of a well-formed leader
pub const LEADER_LEN: usize = 24;

/// Title field tag
pub const TITLE_TAG: &str = "245";

/// Fixed-format record-level metadata string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leader(String);

impl Leader {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Leader {
    /// Blank leader with the ISO 2709 entry map filled in
    fn default() -> Self {
        Self("00000nam a2200000   4500".to_string())
    }
}

impl fmt::Display for Leader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One (code, value) pair of a data field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    pub code: char,
    pub value: String,
}

impl Subfield {
    pub fn new(code: char, value: impl Into<String>) -> Self {
        Self {
            code,
            value: value.into(),
        }
    }
}

/// Tags below `010` are control fields; every other tag is a data field.
pub fn is_control_tag(tag: &str) -> bool {
    tag.starts_with("00")
}

/// A single tagged field
///
/// The tag decides the variant; constructors check the convention in debug builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedField {
    /// Scalar value, no indicators or subfields
    Control { tag: String, value: String },
    /// Two indicators plus ordered subfields (codes may repeat)
    Data {
        tag: String,
        indicators: [char; 2],
        subfields: Vec<Subfield>,
    },
}

impl TaggedField {
    pub fn control(tag: impl Into<String>, value: impl Into<String>) -> Self {
        let tag = tag.into();
        debug_assert!(is_control_tag(&tag), "control field with data tag {tag}");
        Self::Control {
            tag,
            value: value.into(),
        }
    }

    pub fn data(tag: impl Into<String>, indicators: [char; 2], subfields: Vec<Subfield>) -> Self {
        let tag = tag.into();
        debug_assert!(!is_control_tag(&tag), "data field with control tag {tag}");
        Self::Data {
            tag,
            indicators,
            subfields,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Control { tag, .. } | Self::Data { tag, .. } => tag,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Control { .. })
    }

    pub fn indicators(&self) -> Option<[char; 2]> {
        match self {
            Self::Control { .. } => None,
            Self::Data { indicators, .. } => Some(*indicators),
        }
    }

    pub fn subfields(&self) -> &[Subfield] {
        match self {
            Self::Control { .. } => &[],
            Self::Data { subfields, .. } => subfields,
        }
    }

    /// Values of every subfield with the given code, in field order
    pub fn subfield_values(&self, code: char) -> Vec<&str> {
        self.subfields()
            .iter()
            .filter(|s| s.code == code)
            .map(|s| s.value.as_str())
            .collect()
    }

    /// First value for a subfield code
    pub fn subfield(&self, code: char) -> Option<&str> {
        self.subfields()
            .iter()
            .find(|s| s.code == code)
            .map(|s| s.value.as_str())
    }

    /// Append a subfield (no-op on control fields)
    pub fn add_subfield(&mut self, code: char, value: impl Into<String>) {
        if let Self::Data { subfields, .. } = self {
            subfields.push(Subfield::new(code, value));
        }
    }

    /// Insert a subfield at a position, clamped to the subfield count
    pub fn insert_subfield(&mut self, pos: usize, code: char, value: impl Into<String>) {
        if let Self::Data { subfields, .. } = self {
            let pos = pos.min(subfields.len());
            subfields.insert(pos, Subfield::new(code, value));
        }
    }

    /// Remove every subfield with the given code
    pub fn remove_subfields(&mut self, code: char) {
        if let Self::Data { subfields, .. } = self {
            subfields.retain(|s| s.code != code);
        }
    }

    /// Same content under a different tag
    ///
    /// Control content moved to a data tag becomes a single `$a`.
    pub fn retagged(&self, new_tag: &str) -> Self {
        match (self, is_control_tag(new_tag)) {
            (Self::Control { value, .. }, true) => Self::control(new_tag, value.clone()),
            (Self::Control { value, .. }, false) => {
                Self::data(new_tag, [' ', ' '], vec![Subfield::new('a', value.clone())])
            }
            (Self::Data { subfields, .. }, true) => Self::control(new_tag, join_values(subfields)),
            (
                Self::Data {
                    indicators,
                    subfields,
                    ..
                },
                false,
            ) => Self::data(new_tag, *indicators, subfields.clone()),
        }
    }

    /// Human-readable value: control content, or subfield values joined by spaces
    pub fn value(&self) -> String {
        match self {
            Self::Control { value, .. } => value.clone(),
            Self::Data { subfields, .. } => join_values(subfields),
        }
    }
}

fn join_values(subfields: &[Subfield]) -> String {
    subfields
        .iter()
        .map(|s| s.value.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A bibliographic record: leader plus ordered fields
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaggedRecord {
    leader: Leader,
    fields: Vec<TaggedField>,
}

impl TaggedRecord {
    pub fn new(leader: Leader) -> Self {
        Self {
            leader,
            fields: Vec::new(),
        }
    }

    pub fn with_fields(leader: Leader, fields: Vec<TaggedField>) -> Self {
        Self { leader, fields }
    }

    pub fn leader(&self) -> &Leader {
        &self.leader
    }

    pub fn set_leader(&mut self, leader: Leader) {
        self.leader = leader;
    }

    pub fn fields(&self) -> &[TaggedField] {
        &self.fields
    }

    /// Replace the whole field list
    pub fn set_fields(&mut self, fields: Vec<TaggedField>) {
        self.fields = fields;
    }

    /// Take the field list out, leaving the record empty of fields
    pub fn take_fields(&mut self) -> Vec<TaggedField> {
        std::mem::take(&mut self.fields)
    }

    pub fn into_parts(self) -> (Leader, Vec<TaggedField>) {
        (self.leader, self.fields)
    }

    pub fn fields_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a TaggedField> + 'a {
        self.fields.iter().filter(move |f| f.tag() == tag)
    }

    pub fn fields_with_tag_mut<'a>(
        &'a mut self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a mut TaggedField> + 'a {
        self.fields.iter_mut().filter(move |f| f.tag() == tag)
    }

    pub fn first(&self, tag: &str) -> Option<&TaggedField> {
        self.fields.iter().find(|f| f.tag() == tag)
    }

    pub fn count(&self, tag: &str) -> usize {
        self.fields_with_tag(tag).count()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.first(tag).is_some()
    }

    /// Value of the first control field with this tag
    pub fn control_value(&self, tag: &str) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            TaggedField::Control { tag: t, value } if t == tag => Some(value.as_str()),
            _ => None,
        })
    }

    /// Append at the end, ignoring tag order
    pub fn push(&mut self, field: TaggedField) {
        self.fields.push(field);
    }

    /// Insert before the first field with a greater numeric tag
    pub fn insert_ordered(&mut self, field: TaggedField) {
        let pos = position_for(&self.fields, field.tag());
        self.fields.insert(pos, field);
    }

    /// Remove every field carrying the tag, returning them in record order
    pub fn remove_tag(&mut self, tag: &str) -> Vec<TaggedField> {
        let (removed, kept) = std::mem::take(&mut self.fields)
            .into_iter()
            .partition(|f| f.tag() == tag);
        self.fields = kept;
        removed
    }

    /// Title derived from `245 $a` and `$b`
    pub fn title(&self) -> Option<String> {
        let field = self.first(TITLE_TAG)?;
        let a = field.subfield('a')?;
        let mut title = a.trim().to_string();
        if let Some(b) = field.subfield('b') {
            title.push(' ');
            title.push_str(b.trim());
        }
        Some(title)
    }
}

/// Ordered insertion point used by [`TaggedRecord::insert_ordered`]
pub fn position_for(fields: &[TaggedField], tag: &str) -> usize {
    if !tag.chars().all(|c| c.is_ascii_digit()) {
        return fields.len();
    }
    fields
        .iter()
        .position(|f| f.tag().chars().all(|c| c.is_ascii_digit()) && tag < f.tag())
        .unwrap_or(fields.len())
}
