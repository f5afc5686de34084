//! MARCXML parsing and serialization
//!
//! Namespace prefixes are ignored: elements are matched on their local names, so
//! `<record>`, `<marc:record>` and namespaced authority responses all parse the same.

use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::record::{is_control_tag, Leader, Subfield, TaggedField, TaggedRecord};
use crate::{Error, Result};

pub const MARCXML_NS: &str = "http://www.loc.gov/MARC21/slim";

/// Opening of a MARCXML collection document
pub const COLLECTION_HEADER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?>"#,
    "\n",
    r#"<collection xmlns="http://www.loc.gov/MARC21/slim" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xsi:schemaLocation="http://www.loc.gov/standards/marcxml/schema/MARC21slim.xsd">"#,
    "\n"
);

pub const COLLECTION_FOOTER: &str = "</collection>\n";

#[derive(Default)]
struct RecordBuilder {
    leader: Option<String>,
    fields: Vec<TaggedField>,
    datafield: Option<(String, [char; 2], Vec<Subfield>)>,
}

impl RecordBuilder {
    fn finish(mut self) -> TaggedRecord {
        self.close_datafield();
        let leader = self.leader.map(Leader::new).unwrap_or_default();
        TaggedRecord::with_fields(leader, self.fields)
    }

    fn push_control(&mut self, tag: String, value: String) {
        let field = TaggedField::Control {
            tag: tag.clone(),
            value,
        };
        self.fields.push(if is_control_tag(&tag) {
            field
        } else {
            field.retagged(&tag)
        });
    }

    fn close_datafield(&mut self) {
        if let Some((tag, indicators, subfields)) = self.datafield.take() {
            let field = TaggedField::Data {
                tag: tag.clone(),
                indicators,
                subfields,
            };
            self.fields.push(if is_control_tag(&tag) {
                field.retagged(&tag)
            } else {
                field
            });
        }
    }
}

enum Capture {
    Nothing,
    Leader,
    Control(String),
    Subfield(char),
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() == name {
            let raw = String::from_utf8_lossy(&attr.value).into_owned();
            Some(unescape(&raw).map(|s| s.into_owned()).unwrap_or(raw))
        } else {
            None
        }
    })
}

fn indicators(e: &BytesStart<'_>) -> [char; 2] {
    let first = |name: &[u8]| {
        attribute(e, name)
            .and_then(|v| v.chars().next())
            .unwrap_or(' ')
    };
    [first(b"ind1"), first(b"ind2")]
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Parse every `<record>` element in a document
pub fn parse_records(xml: &str) -> Result<Vec<TaggedRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut records = Vec::new();
    let mut builder: Option<RecordBuilder> = None;
    let mut capture = Capture::Nothing;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"record" => builder = Some(RecordBuilder::default()),
                b"leader" => {
                    capture = Capture::Leader;
                    text.clear();
                }
                b"controlfield" => {
                    capture = Capture::Control(attribute(e, b"tag").unwrap_or_default());
                    text.clear();
                }
                b"datafield" => {
                    if let Some(rb) = builder.as_mut() {
                        rb.close_datafield();
                        rb.datafield = Some((attribute(e, b"tag").unwrap_or_default(), indicators(e), Vec::new()));
                    }
                }
                b"subfield" => {
                    let code = attribute(e, b"code").and_then(|c| c.chars().next()).unwrap_or(' ');
                    capture = Capture::Subfield(code);
                    text.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match (e.local_name().as_ref(), builder.as_mut()) {
                (b"record", None) => records.push(TaggedRecord::default()),
                (b"leader", Some(rb)) => rb.leader = Some(String::new()),
                (b"controlfield", Some(rb)) => {
                    rb.push_control(attribute(e, b"tag").unwrap_or_default(), String::new())
                }
                (b"datafield", Some(rb)) => {
                    rb.close_datafield();
                    rb.datafield = Some((attribute(e, b"tag").unwrap_or_default(), indicators(e), Vec::new()));
                    rb.close_datafield();
                }
                (b"subfield", Some(rb)) => {
                    let code = attribute(e, b"code").and_then(|c| c.chars().next()).unwrap_or(' ');
                    if let Some((_, _, subfields)) = rb.datafield.as_mut() {
                        subfields.push(Subfield::new(code, ""));
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if !matches!(capture, Capture::Nothing) {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(ref e)) => {
                if !matches!(capture, Capture::Nothing) {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if !matches!(capture, Capture::Nothing) {
                    let name = String::from_utf8_lossy(e.as_ref()).into_owned();
                    match resolve_entity(&name) {
                        Some(c) => text.push(c),
                        None => {
                            text.push('&');
                            text.push_str(&name);
                            text.push(';');
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                let current = std::mem::replace(&mut capture, Capture::Nothing);
                let name = e.local_name();
                if name.as_ref() == b"record" {
                    if let Some(rb) = builder.take() {
                        records.push(rb.finish());
                    }
                } else if let Some(rb) = builder.as_mut() {
                    match (name.as_ref(), current) {
                        (b"leader", _) => rb.leader = Some(std::mem::take(&mut text)),
                        (b"controlfield", Capture::Control(tag)) => {
                            rb.push_control(tag, std::mem::take(&mut text));
                        }
                        (b"subfield", Capture::Subfield(code)) => {
                            if let Some((_, _, subfields)) = rb.datafield.as_mut() {
                                subfields.push(Subfield::new(code, std::mem::take(&mut text)));
                            }
                        }
                        (b"datafield", _) => rb.close_datafield(),
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Decode(format!(
                    "MARCXML parse error at position {}: {e}",
                    reader.error_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

/// Parse the first `<record>` of a document
///
/// A document with no record element (for example an API diagnostic) is an error.
pub fn parse_record(xml: &str) -> Result<TaggedRecord> {
    parse_records(xml)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Decode("no <record> element in document".to_string()))
}

/// Serialize a record as a standalone MARCXML `<record>` element
pub fn to_marcxml(record: &TaggedRecord) -> String {
    let mut out = format!(r#"<record xmlns="{MARCXML_NS}">"#);
    out.push_str(&format!("<leader>{}</leader>", escape(record.leader().as_str())));
    for field in record.fields() {
        match field {
            TaggedField::Control { tag, value } => {
                out.push_str(&format!(
                    r#"<controlfield tag="{}">{}</controlfield>"#,
                    escape(tag.as_str()),
                    escape(value.as_str())
                ));
            }
            TaggedField::Data {
                tag,
                indicators,
                subfields,
            } => {
                out.push_str(&format!(
                    r#"<datafield tag="{}" ind1="{}" ind2="{}">"#,
                    escape(tag.as_str()),
                    escape(indicators[0].to_string().as_str()),
                    escape(indicators[1].to_string().as_str())
                ));
                for subfield in subfields {
                    out.push_str(&format!(
                        r#"<subfield code="{}">{}</subfield>"#,
                        escape(subfield.code.to_string().as_str()),
                        escape(subfield.value.as_str())
                    ));
                }
                out.push_str("</datafield>");
            }
        }
    }
    out.push_str("</record>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<record xmlns="http://www.loc.gov/MARC21/slim">
  <leader>00000cam a2200000 a 4500</leader>
  <controlfield tag="001">1234567</controlfield>
  <controlfield tag="008">750101s1951    nyu           000 1 eng  </controlfield>
  <datafield tag="245" ind1="1" ind2="0">
    <subfield code="a">Catcher in the rye /</subfield>
    <subfield code="c">J.D. Salinger &amp; co.</subfield>
  </datafield>
</record>"#;

    #[test]
    fn test_parse_authority_response() {
        let record = parse_record(RESPONSE).unwrap();
        assert_eq!(record.leader().as_str(), "00000cam a2200000 a 4500");
        assert_eq!(record.control_value("001"), Some("1234567"));
        assert_eq!(
            record.control_value("008"),
            Some("750101s1951    nyu           000 1 eng  ")
        );
        let title = record.first("245").unwrap();
        assert_eq!(title.indicators(), Some(['1', '0']));
        assert_eq!(title.subfield('a'), Some("Catcher in the rye /"));
        assert_eq!(title.subfield('c'), Some("J.D. Salinger & co."));
    }

    #[test]
    fn test_prefixed_collection() {
        let xml = r#"<marc:collection xmlns:marc="http://www.loc.gov/MARC21/slim">
<marc:record><marc:leader>x</marc:leader><marc:controlfield tag="001">1</marc:controlfield></marc:record>
<marc:record><marc:leader>y</marc:leader><marc:controlfield tag="001">2</marc:controlfield></marc:record>
</marc:collection>"#;
        let records = parse_records(xml).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].control_value("001"), Some("2"));
    }

    #[test]
    fn test_diagnostic_document_has_no_record() {
        let xml = r#"<diagnostics xmlns="http://www.loc.gov/zing/srw/diagnostic/">
<diagnostic><message>Record does not exist</message></diagnostic></diagnostics>"#;
        assert!(parse_record(xml).is_err());
    }

    #[test]
    fn test_serialized_record_parses_back() {
        let record = parse_record(RESPONSE).unwrap();
        let xml = to_marcxml(&record);
        assert!(xml.contains("&amp;"));
        assert_eq!(parse_record(&xml).unwrap(), record);
    }
}
