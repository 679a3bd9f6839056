//! `zip`: join several pipelines positionally, one record from each per pull.

use crate::data::Data;
use crate::error::{Error, Result};
use crate::pipeline::DataPipeline;
use crate::source::DataSource;
use crate::tape::Tape;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Options controlling how [`DataPipeline::zip`] joins its inputs.
#[derive(Clone, Debug, Default)]
pub struct ZipOptions {
    /// Emit a dict keyed by these names instead of a list. One per pipeline.
    pub names: Option<Vec<String>>,
    /// Merge dict records, or splice list records, into a single record.
    pub flatten: bool,
    /// Stop with a warning, instead of failing, when the inputs have unequal lengths.
    pub warn_only: bool,
    /// Pull the inputs one after another instead of concurrently.
    pub disable_parallelism: bool,
}

impl ZipOptions {
    #[must_use]
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    #[must_use]
    pub fn warn_only(mut self, warn_only: bool) -> Self {
        self.warn_only = warn_only;
        self
    }

    #[must_use]
    pub fn disable_parallelism(mut self, disable: bool) -> Self {
        self.disable_parallelism = disable;
        self
    }
}

pub struct ZippedDataSource {
    pipelines: Vec<DataPipeline>,
    options: ZipOptions,
    is_eod: bool,
}

impl ZippedDataSource {
    pub(crate) fn new(pipelines: Vec<DataPipeline>, options: ZipOptions) -> Result<Self> {
        if let Some(names) = &options.names {
            if options.flatten {
                return Err(Error::invalid_argument(
                    "`names` and `flatten` are mutually exclusive and cannot be specified at the same time.",
                ));
            }
            if names.len() != pipelines.len() {
                return Err(Error::invalid_argument(format!(
                    "The number of `pipelines` and the number of `names` must be equal, but are {} and {} instead.",
                    pipelines.len(),
                    names.len()
                )));
            }
            let mut seen = HashSet::with_capacity(names.len());
            if let Some(dup) = names.iter().find(|name| !seen.insert(name.as_str())) {
                return Err(Error::invalid_argument(format!(
                    "The names must be unique, but `{dup}` appears more than once."
                )));
            }
        }

        Ok(Self {
            pipelines,
            options,
            is_eod: false,
        })
    }

    /// Pull one record from every pipeline.
    ///
    /// Concurrent pulls all run to completion; the first error in pipeline
    /// order is reported afterwards.
    fn pull_all(&mut self) -> Result<Vec<Option<Data>>> {
        if self.options.disable_parallelism || self.pipelines.len() < 2 {
            return self.pipelines.iter_mut().map(DataPipeline::next).collect();
        }

        let results: Vec<Result<Option<Data>>> =
            self.pipelines.par_iter_mut().map(DataPipeline::next).collect();
        results.into_iter().collect()
    }

    fn compose(&self, records: Vec<Data>) -> Result<Data> {
        if let Some(names) = &self.options.names {
            return Ok(Data::Dict(names.iter().cloned().zip(records).collect()));
        }

        if !self.options.flatten {
            return Ok(Data::List(records));
        }

        if records.iter().all(|r| matches!(r, Data::Dict(_))) {
            let mut merged = BTreeMap::new();
            for record in records {
                let Data::Dict(map) = record else { continue };
                for (key, value) in map {
                    if merged.contains_key(&key) {
                        return Err(Error::record(format!(
                            "The zipped records cannot be flattened because the key `{key}` appears in more than one of them."
                        )));
                    }
                    merged.insert(key, value);
                }
            }
            return Ok(Data::Dict(merged));
        }

        let mut flat = Vec::with_capacity(records.len());
        for record in records {
            match record {
                Data::List(items) => flat.extend(items),
                other => flat.push(other),
            }
        }
        Ok(Data::List(flat))
    }
}

impl DataSource for ZippedDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        if self.is_eod || self.pipelines.is_empty() {
            return Ok(None);
        }

        let pulled = self.pull_all()?;

        let ended: Vec<usize> = pulled
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_none().then_some(i))
            .collect();

        if ended.is_empty() {
            let records = pulled.into_iter().flatten().collect();
            return self.compose(records).map(Some);
        }

        self.is_eod = true;
        if ended.len() == self.pipelines.len() {
            return Ok(None);
        }

        if self.options.warn_only {
            warn!(
                "The zipped data pipelines have unequal lengths; pipelines {ended:?} ended first. Stopping the zip."
            );
            return Ok(None);
        }

        Err(Error::pipeline(format!(
            "The zipped data pipelines must all have the same length, but pipelines {ended:?} ended before the others."
        )))
    }

    fn reset(&mut self) -> Result<()> {
        self.is_eod = false;

        let mut first_err = None;
        for pipeline in &mut self.pipelines {
            if let Err(e) = pipeline.reset() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn record_position(&mut self, tape: &mut Tape) -> Result<()> {
        for pipeline in &mut self.pipelines {
            pipeline.record_position(tape)?;
        }
        tape.record(&self.is_eod);
        Ok(())
    }

    fn reload_position(&mut self, tape: &mut Tape) -> Result<()> {
        for pipeline in &mut self.pipelines {
            pipeline.reload_position(tape)?;
        }
        self.is_eod = tape.read()?;
        Ok(())
    }
}
