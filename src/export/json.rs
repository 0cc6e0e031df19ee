//! Sidecar payload encoding
//!
//! ```text
//! [{"timestamp":1700000000000,"type":"counter","name":"spark.jobs",
//!   "tags":{"appId":"a1","statistic":"count","type":"counter"},"value":5.0}]
//! ```
//!
//! Keys are written in exactly that order and tags keep the order they were
//! added to the id. Strings escape `"`, `\` and `\b \f \n \r \t`; every other
//! character, including other control characters, is written as-is.

use std::io;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::ser::{CharEscape, Formatter};

use crate::api::{Measurement, Tag};
use crate::error::Result;

/// Compact formatter with the sidecar's escaping rules.
#[derive(Debug, Clone, Copy, Default)]
struct SidecarFormatter;

impl Formatter for SidecarFormatter {
    fn write_char_escape<W>(&mut self, writer: &mut W, char_escape: CharEscape) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let escaped: &[u8] = match char_escape {
            CharEscape::Quote => b"\\\"",
            CharEscape::ReverseSolidus => b"\\\\",
            CharEscape::Solidus => b"/",
            CharEscape::Backspace => b"\\b",
            CharEscape::FormFeed => b"\\f",
            CharEscape::LineFeed => b"\\n",
            CharEscape::CarriageReturn => b"\\r",
            CharEscape::Tab => b"\\t",
            CharEscape::AsciiControl(byte) => return writer.write_all(&[byte]),
        };
        writer.write_all(escaped)
    }
}

struct Tags<'a>(&'a [Tag]);

impl Serialize for Tags<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|t| (t.key(), t.value())))
    }
}

struct Entry<'a>(&'a Measurement);

impl Serialize for Entry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let m = self.0;
        let mut entry = serializer.serialize_struct("Measurement", 5)?;
        entry.serialize_field("timestamp", &m.timestamp())?;
        entry.serialize_field("type", m.data_type())?;
        entry.serialize_field("name", m.id().name())?;
        entry.serialize_field("tags", &Tags(m.id().tags()))?;
        entry.serialize_field("value", &m.value())?;
        entry.end()
    }
}

struct Payload<'a>(&'a [Measurement]);

impl Serialize for Payload<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().filter(|m| m.is_finite()).map(Entry))
    }
}

/// Stream `measurements` as a JSON array. Non-finite values are skipped.
pub fn write_payload<W: io::Write>(writer: W, measurements: &[Measurement]) -> Result<()> {
    let mut serializer = serde_json::Serializer::with_formatter(writer, SidecarFormatter);
    Payload(measurements).serialize(&mut serializer)?;
    Ok(())
}

/// Encode `measurements` into a new buffer.
pub fn to_payload(measurements: &[Measurement]) -> Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(64 + measurements.len() * 128);
    write_payload(&mut buffer, measurements)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Id;

    fn encode(measurements: &[Measurement]) -> String {
        let payload = to_payload(measurements).unwrap();
        String::from_utf8(payload).unwrap()
    }

    #[test]
    fn test_field_order() {
        let id = Id::new("spark.jobs")
            .with_tag("appId", "a1")
            .with_tag("type", "counter");
        let out = encode(&[Measurement::new(id, 1_700_000_000_000, 5.0)]);

        assert_eq!(
            out,
            r#"[{"timestamp":1700000000000,"type":"counter","name":"spark.jobs","tags":{"appId":"a1","type":"counter"},"value":5.0}]"#
        );
    }

    #[test]
    fn test_type_defaults_to_gauge() {
        let out = encode(&[Measurement::new(Id::new("heap"), 7, 0.25)]);
        assert_eq!(
            out,
            r#"[{"timestamp":7,"type":"gauge","name":"heap","tags":{},"value":0.25}]"#
        );
    }

    #[test]
    fn test_custom_type_passes_through() {
        let id = Id::new("x").with_tag("type", "percentile");
        let out = encode(&[Measurement::new(id, 0, 1.0)]);
        assert!(out.contains(r#""type":"percentile""#));
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(encode(&[]), "[]");
    }

    #[test]
    fn test_non_finite_values_skipped() {
        let out = encode(&[
            Measurement::new(Id::new("nan"), 1, f64::NAN),
            Measurement::new(Id::new("ok"), 1, 2.0),
            Measurement::new(Id::new("inf"), 1, f64::INFINITY),
            Measurement::new(Id::new("neg"), 1, f64::NEG_INFINITY),
        ]);

        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        let entries = parsed.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "ok");
    }

    #[test]
    fn test_escaping() {
        let id = Id::new("a\"b\\c/d").with_tag("k", "\u{8}\u{c}\n\r\t");
        let out = encode(&[Measurement::new(id, 0, 1.0)]);

        assert!(out.contains(r#""name":"a\"b\\c/d""#));
        assert!(out.contains(r#""tags":{"k":"\b\f\n\r\t"}"#));
    }

    #[test]
    fn test_other_control_and_unicode_verbatim() {
        let id = Id::new("bell\u{7}").with_tag("city", "Zürich ☃");
        let out = to_payload(&[Measurement::new(id, 0, 1.0)]).unwrap();

        assert!(out.windows(5).any(|w| w == b"bell\x07"));
        assert!(String::from_utf8(out).unwrap().contains("Zürich ☃"));
    }

    #[test]
    fn test_write_to_writer() {
        let mut buffer = Vec::new();
        let measurements = [Measurement::new(Id::new("a"), 3, -1.5)];
        write_payload(&mut buffer, &measurements).unwrap();
        assert_eq!(
            buffer,
            br#"[{"timestamp":3,"type":"gauge","name":"a","tags":{},"value":-1.5}]"#.to_vec()
        );
    }
}
