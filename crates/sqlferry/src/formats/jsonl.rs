//! JSON-lines framing: one JSON array of nullable strings per row.
//!
//! The default dump format. JSON distinguishes `null` from `""` natively,
//! so no marker convention is needed.

use std::io::{BufRead, BufReader, Read, Write};

use crate::backup::CatalogColumn;
use crate::error::Result;

use super::{FormatReader, FormatWriter};

/// JSONL chunk writer.
pub struct JsonlWriter {
    sink: Box<dyn Write + Send>,
}

impl JsonlWriter {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self { sink }
    }
}

impl FormatWriter for JsonlWriter {
    fn write_begin(&mut self, _columns: &[CatalogColumn]) -> Result<()> {
        Ok(())
    }

    fn write_row(&mut self, values: &[Option<String>]) -> Result<()> {
        serde_json::to_writer(&mut self.sink, values)?;
        self.sink.write_all(b"\n")?;
        Ok(())
    }

    fn write_end(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

/// JSONL chunk reader.
pub struct JsonlReader {
    source: BufReader<Box<dyn Read + Send>>,
    line: String,
}

impl JsonlReader {
    pub fn new(source: Box<dyn Read + Send>) -> Self {
        Self {
            source: BufReader::new(source),
            line: String::new(),
        }
    }
}

impl FormatReader for JsonlReader {
    fn read_begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_row(&mut self) -> Result<Option<Vec<Option<String>>>> {
        self.line.clear();
        if self.source.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        let trimmed = self.line.trim_end_matches('\n');
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }

    fn read_end(&mut self) -> Result<()> {
        Ok(())
    }
}
