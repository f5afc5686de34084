//! Pure operations over ordered field lists
//!
//! Each function consumes a field list and returns the new list plus whatever was
//! taken out, so the engine can audit removals without reaching into the record.

use catmig_common::marc::record::position_for;
use catmig_common::TaggedField;

/// Main-entry tags; a record carries at most one of them
pub const MAIN_ENTRY_TAGS: &[&str] = &["100", "110", "111", "130"];

/// Tags removed when `tag` is replaced
///
/// Replacing any main entry clears the whole class so the authority's main entry
/// never sits beside a stale local one.
pub fn replacement_class(tag: &str) -> Vec<&str> {
    if MAIN_ENTRY_TAGS.contains(&tag) {
        MAIN_ENTRY_TAGS.to_vec()
    } else {
        vec![tag]
    }
}

/// Insert keeping numeric tag order; equal tags keep insertion order
pub fn insert_ordered(fields: &mut Vec<TaggedField>, field: TaggedField) {
    let pos = position_for(fields, field.tag());
    fields.insert(pos, field);
}

/// Remove every field whose tag is in `remove`, then add `additions` in order
pub fn replace_fields(
    fields: Vec<TaggedField>,
    remove: &[&str],
    additions: &[TaggedField],
) -> (Vec<TaggedField>, Vec<TaggedField>) {
    let (removed, mut kept): (Vec<_>, Vec<_>) = fields
        .into_iter()
        .partition(|f| remove.contains(&f.tag()));
    for field in additions {
        insert_ordered(&mut kept, field.clone());
    }
    (kept, removed)
}

/// Set a control value in place of the first occurrence, dropping any others
///
/// Inserted in tag order when the tag is absent.
pub fn replace_control(
    fields: Vec<TaggedField>,
    tag: &str,
    value: &str,
) -> (Vec<TaggedField>, Vec<TaggedField>) {
    let mut kept = Vec::with_capacity(fields.len() + 1);
    let mut removed = Vec::new();
    let mut placed = false;
    for field in fields {
        if field.tag() != tag {
            kept.push(field);
        } else if !placed {
            removed.push(field);
            kept.push(TaggedField::control(tag, value));
            placed = true;
        } else {
            removed.push(field);
        }
    }
    if !placed {
        insert_ordered(&mut kept, TaggedField::control(tag, value));
    }
    (kept, removed)
}

/// Retag every `from` field as `to`, re-inserted in tag order
///
/// Returns the new list and the number of fields moved.
pub fn move_fields(fields: Vec<TaggedField>, from: &str, to: &str) -> (Vec<TaggedField>, usize) {
    let (moving, mut kept): (Vec<_>, Vec<_>) = fields.into_iter().partition(|f| f.tag() == from);
    let moved = moving.len();
    for field in moving {
        insert_ordered(&mut kept, field.retagged(to));
    }
    (kept, moved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catmig_common::Subfield;

    fn data(tag: &str, a: &str) -> TaggedField {
        TaggedField::data(tag, [' ', ' '], vec![Subfield::new('a', a)])
    }

    fn tags(fields: &[TaggedField]) -> Vec<&str> {
        fields.iter().map(|f| f.tag()).collect()
    }

    #[test]
    fn test_main_entry_class() {
        assert_eq!(replacement_class("110"), MAIN_ENTRY_TAGS.to_vec());
        assert_eq!(replacement_class("245"), vec!["245"]);
    }

    #[test]
    fn test_replace_fields_keeps_order() {
        let fields = vec![
            TaggedField::control("001", "1"),
            data("100", "Local author"),
            data("245", "Title"),
            data("650", "Subject"),
        ];
        let (fields, removed) = replace_fields(
            fields,
            &replacement_class("110"),
            &[data("110", "Corporate body")],
        );
        assert_eq!(tags(&fields), vec!["001", "110", "245", "650"]);
        assert_eq!(removed, vec![data("100", "Local author")]);
    }

    #[test]
    fn test_repeated_additions_stay_in_authority_order() {
        let fields = vec![data("245", "T"), data("650", "Old"), data("700", "X")];
        let (fields, _) = replace_fields(fields, &["650"], &[data("650", "A"), data("650", "B")]);
        let values: Vec<_> = fields.iter().map(|f| f.value()).collect();
        assert_eq!(values, vec!["T", "A", "B", "X"]);
    }

    #[test]
    fn test_replace_control_in_place() {
        let fields = vec![
            TaggedField::control("001", "1"),
            data("245", "T"),
            TaggedField::control("008", "misplaced"),
        ];
        let (fields, removed) = replace_control(fields, "008", "new");
        assert_eq!(tags(&fields), vec!["001", "245", "008"]);
        assert_eq!(fields[2], TaggedField::control("008", "new"));
        assert_eq!(removed.len(), 1);

        let (fields, removed) = replace_control(fields, "005", "stamp");
        assert_eq!(tags(&fields), vec!["001", "005", "245", "008"]);
        assert!(removed.is_empty());
    }

    #[test]
    fn test_move_fields() {
        let fields = vec![data("245", "T"), data("500", "Note"), data("650", "S")];
        let (fields, moved) = move_fields(fields, "500", "591");
        assert_eq!(moved, 1);
        assert_eq!(tags(&fields), vec!["245", "591", "650"]);
        assert_eq!(fields[1].subfield('a'), Some("Note"));
    }
}
