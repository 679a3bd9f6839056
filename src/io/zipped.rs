//! Gzip-compressed record archives.
//!
//! An archive is a gzip stream of newline-delimited JSON, one record per
//! line; blank lines are ignored. The position is the number of records read,
//! so a resumed source reopens the archive and skips that many lines.

use crate::builder::DataPipelineBuilder;
use crate::data::Data;
use crate::error::{Error, Result};
use crate::source::DataSource;
use crate::tape::Tape;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;

type ArchiveLines = Lines<BufReader<GzDecoder<File>>>;

pub struct ZippedRecordsDataSource {
    path: PathBuf,
    lines: Option<ArchiveLines>,
    consumed: usize,
}

impl ZippedRecordsDataSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: None,
            consumed: 0,
        }
    }

    fn open(&self) -> Result<ArchiveLines> {
        let file = File::open(&self.path).map_err(|e| {
            Error::stream(format!("`{}` cannot be opened.", self.path.display()), e)
        })?;
        Ok(BufReader::new(GzDecoder::new(file)).lines())
    }

    /// Read the next non-blank line, opening the archive on first use.
    fn next_line(&mut self) -> Result<Option<String>> {
        if self.lines.is_none() {
            self.lines = Some(self.open()?);
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };

        for line in lines {
            let line = line.map_err(|e| {
                Error::stream(
                    format!("`{}` cannot be decompressed or read.", self.path.display()),
                    e,
                )
            })?;
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }
}

impl DataSource for ZippedRecordsDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        let Some(line) = self.next_line()? else {
            return Ok(None);
        };
        self.consumed += 1;

        let value: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
            Error::from_user(
                format!(
                    "Record {} in `{}` is not valid JSON.",
                    self.consumed,
                    self.path.display()
                ),
                e.into(),
            )
        })?;
        Data::try_from(value).map(Some)
    }

    fn reset(&mut self) -> Result<()> {
        self.lines = None;
        self.consumed = 0;
        Ok(())
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        tape.record(&self.consumed);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        let target: usize = tape.read()?;

        self.reset()?;
        while self.consumed < target {
            if self.next_line()?.is_none() {
                return Err(Error::pipeline(format!(
                    "The tape points at record {target}, but `{}` holds only {} records.",
                    self.path.display(),
                    self.consumed
                )));
            }
            self.consumed += 1;
        }
        Ok(())
    }
}

/// Start a pipeline that reads the records of a gzip-compressed JSONL archive.
pub fn read_zipped_records(pathname: impl Into<PathBuf>) -> DataPipelineBuilder {
    DataPipelineBuilder::from_source(Box::new(ZippedRecordsDataSource::new(pathname)))
}
