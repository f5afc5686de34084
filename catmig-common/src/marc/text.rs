//! Human-readable "pretty" record output
//!
//! One line per field, blank line between records:
//!
//! ```text
//! =LDR  00000cam a2200000 a 4500
//! =001  1234567
//! =245  14$aThe catcher in the rye /$cJ.D. Salinger.
//! ```

use std::io::Write;

use super::record::{TaggedField, TaggedRecord};
use crate::Result;

fn indicator(c: char) -> char {
    if c == ' ' {
        '\\'
    } else {
        c
    }
}

/// Render a record in the pretty text form (without the trailing blank line)
pub fn to_text(record: &TaggedRecord) -> String {
    let mut out = format!("=LDR  {}\n", record.leader());
    for field in record.fields() {
        match field {
            TaggedField::Control { tag, value } => {
                out.push_str(&format!("={tag}  {}\n", value.replace(' ', "\\")));
            }
            TaggedField::Data {
                tag,
                indicators,
                subfields,
            } => {
                out.push_str(&format!("={tag}  {}{}", indicator(indicators[0]), indicator(indicators[1])));
                for subfield in subfields {
                    out.push('$');
                    out.push(subfield.code);
                    out.push_str(&subfield.value);
                }
                out.push('\n');
            }
        }
    }
    out
}

/// Writes pretty records to any byte sink
pub struct TextWriter<W> {
    inner: W,
}

impl<W: Write> TextWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write(&mut self, record: &TaggedRecord) -> Result<()> {
        self.inner.write_all(to_text(record).as_bytes())?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
