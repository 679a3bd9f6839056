//! Leaf sources: the roots a pipeline is built from.
//!
//! Each factory returns a [`DataPipelineBuilder`] so operators can be chained
//! straight onto it:
//!
//! ```
//! use datapipe::{read_sequence, Data};
//!
//! let mut pipeline = read_sequence(vec![Data::from("a"), Data::from("b")])
//!     .take(1)
//!     .and_return()
//!     .unwrap();
//!
//! assert_eq!(pipeline.next().unwrap(), Some(Data::from("a")));
//! assert_eq!(pipeline.next().unwrap(), None);
//! ```

pub mod glob;

#[cfg_attr(docsrs, doc(cfg(feature = "compression-gzip")))]
#[cfg(feature = "compression-gzip")]
pub mod zipped;

pub use self::glob::list_files;
#[cfg(feature = "compression-gzip")]
pub use self::zipped::read_zipped_records;

use crate::builder::DataPipelineBuilder;
use crate::data::Data;
use crate::error::{Error, Result};
use crate::source::DataSource;
use crate::tape::Tape;

/// Emits the records of an in-memory list, in order.
pub struct SequenceDataSource {
    records: Vec<Data>,
    idx: usize,
}

impl SequenceDataSource {
    #[must_use]
    pub const fn new(records: Vec<Data>) -> Self {
        Self { records, idx: 0 }
    }
}

impl DataSource for SequenceDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        let Some(data) = self.records.get(self.idx) else {
            return Ok(None);
        };
        self.idx += 1;
        Ok(Some(data.clone()))
    }

    fn reset(&mut self) -> Result<()> {
        self.idx = 0;
        Ok(())
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        tape.record(&self.idx);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        let idx: usize = tape.read()?;
        if idx > self.records.len() {
            return Err(Error::pipeline(format!(
                "The tape points at record {idx}, but the sequence holds only {} records.",
                self.records.len()
            )));
        }
        self.idx = idx;
        Ok(())
    }
}

/// Start a pipeline that reads `records` from memory.
pub fn read_sequence(records: Vec<Data>) -> DataPipelineBuilder {
    DataPipelineBuilder::from_source(Box::new(SequenceDataSource::new(records)))
}
