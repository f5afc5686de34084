//! Tagged bibliographic records and the thin codecs around them

pub mod iso2709;
pub mod marcxml;
pub mod record;
pub mod text;

pub use iso2709::{DecodeFailure, Decoded, Iso2709Reader, Iso2709Writer};
pub use record::{is_control_tag, Leader, Subfield, TaggedField, TaggedRecord};
pub use text::TextWriter;
