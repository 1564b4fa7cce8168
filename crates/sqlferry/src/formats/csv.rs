//! Delimited-text framing.
//!
//! NULL is framed as the unquoted marker `\N` (the convention of textual
//! SQL dumps); a value whose text begins with a backslash gets one extra
//! leading backslash so a literal `\N` survives the trip.

use std::io::{Read, Write};

use crate::backup::CatalogColumn;
use crate::error::Result;

use super::{FormatReader, FormatWriter};

const NULL_MARKER: &str = "\\N";

/// CSV chunk writer.
pub struct CsvWriter {
    inner: csv::Writer<Box<dyn Write + Send>>,
}

impl CsvWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            inner: csv::WriterBuilder::new().has_headers(false).from_writer(sink),
        }
    }
}

impl FormatWriter for CsvWriter {
    fn write_begin(&mut self, _columns: &[CatalogColumn]) -> Result<()> {
        Ok(())
    }

    fn write_row(&mut self, values: &[Option<String>]) -> Result<()> {
        let fields: Vec<String> = values.iter().map(|v| encode_field(v.as_deref())).collect();
        self.inner.write_record(&fields)?;
        Ok(())
    }

    fn write_end(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// CSV chunk reader.
pub struct CsvReader {
    inner: csv::Reader<Box<dyn Read + Send>>,
}

impl CsvReader {
    pub fn new(source: Box<dyn Read + Send>) -> Self {
        Self {
            inner: csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(source),
        }
    }
}

impl FormatReader for CsvReader {
    fn read_begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_row(&mut self) -> Result<Option<Vec<Option<String>>>> {
        let mut record = csv::StringRecord::new();
        if !self.inner.read_record(&mut record)? {
            return Ok(None);
        }
        Ok(Some(record.iter().map(decode_field).collect()))
    }

    fn read_end(&mut self) -> Result<()> {
        Ok(())
    }
}

fn encode_field(value: Option<&str>) -> String {
    match value {
        None => NULL_MARKER.to_string(),
        Some(text) if text.starts_with('\\') => format!("\\{}", text),
        Some(text) => text.to_string(),
    }
}

fn decode_field(field: &str) -> Option<String> {
    if field == NULL_MARKER {
        None
    } else if let Some(stripped) = field.strip_prefix('\\') {
        Some(stripped.to_string())
    } else {
        Some(field.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_escaping() {
        assert_eq!(encode_field(None), "\\N");
        assert_eq!(encode_field(Some("\\N")), "\\\\N");
        assert_eq!(encode_field(Some("plain")), "plain");

        assert_eq!(decode_field("\\N"), None);
        assert_eq!(decode_field("\\\\N"), Some("\\N".to_string()));
        assert_eq!(decode_field(""), Some(String::new()));
    }
}
