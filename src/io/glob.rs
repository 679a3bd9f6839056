//! File listing for pipelines that read one file per record.
//!
//! [`list_files`] walks a directory tree with the `glob` crate and yields every
//! file beneath it, optionally filtered by a file name pattern. Paths are
//! sorted so every pass, and every resumed pass, sees the same order.
//!
//! ```no_run
//! use datapipe::list_files;
//!
//! let mut files = list_files("corpus/", Some("*.jsonl.gz")).and_return()?;
//! while let Some(path) = files.next()? {
//!     println!("{path}");
//! }
//! # Ok::<(), datapipe::Error>(())
//! ```

use crate::builder::DataPipelineBuilder;
use crate::data::Data;
use crate::error::{Error, Result};
use crate::source::{BoxedSource, DataSource};
use crate::tape::Tape;
use glob::{MatchOptions, Pattern, glob_with};
use std::path::{Path, PathBuf};

/// Expand `pathname` into a sorted list of files.
///
/// A file yields itself; a directory yields every file beneath it, at any
/// depth, whose file name matches `pattern`.
///
/// # Errors
///
/// Returns a stream error if `pathname` does not exist or the directory tree
/// cannot be read.
pub fn expand_files(pathname: &Path, pattern: Option<&Pattern>) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(pathname).map_err(|e| {
        Error::stream(format!("`{}` cannot be accessed.", pathname.display()), e)
    })?;

    if metadata.is_file() {
        return Ok(vec![pathname.to_path_buf()]);
    }

    let root = Pattern::escape(&pathname.to_string_lossy());
    let walk = format!("{}/**/*", root.trim_end_matches('/'));
    let entries = glob_with(&walk, MatchOptions::new()).map_err(|e| {
        Error::Internal(format!("the directory walk pattern `{walk}` is invalid: {e}"))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| {
            let message = format!("`{}` cannot be listed.", e.path().display());
            Error::stream(message, e.into_error())
        })?;

        // Only include actual files, not directories
        if !path.is_file() {
            continue;
        }
        let matches = match pattern {
            Some(pattern) => path
                .file_name()
                .is_some_and(|name| pattern.matches(&name.to_string_lossy())),
            None => true,
        };
        if matches {
            files.push(path);
        }
    }

    // Sort for deterministic order
    files.sort();

    Ok(files)
}

/// Yields the paths of the files under a directory as strings.
///
/// The listing is taken on the first pull and kept for the life of the
/// source, so `reset` replays the same files.
pub struct FileListDataSource {
    pathname: PathBuf,
    pattern: Option<Pattern>,
    files: Option<Vec<PathBuf>>,
    idx: usize,
}

impl FileListDataSource {
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `pattern` is not a valid glob.
    pub fn new(pathname: impl Into<PathBuf>, pattern: Option<&str>) -> Result<Self> {
        let pattern = pattern
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    Error::invalid_argument(format!("`{p}` is not a valid file pattern: {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            pathname: pathname.into(),
            pattern,
            files: None,
            idx: 0,
        })
    }

    fn files(&mut self) -> Result<&[PathBuf]> {
        if self.files.is_none() {
            self.files = Some(expand_files(&self.pathname, self.pattern.as_ref())?);
        }
        Ok(self.files.as_deref().unwrap_or_default())
    }
}

impl DataSource for FileListDataSource {
    fn next(&mut self) -> Result<Option<Data>> {
        let idx = self.idx;
        let Some(path) = self.files()?.get(idx) else {
            return Ok(None);
        };
        let path = path.to_string_lossy().into_owned();
        self.idx += 1;
        Ok(Some(Data::String(path)))
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
        let len = self.files()?.len();
        if idx > len {
            return Err(Error::pipeline(format!(
                "The tape points at file {idx}, but the listing holds only {len} files."
            )));
        }
        self.idx = idx;
        Ok(())
    }
}

/// Start a pipeline that yields the files under `pathname`, filtered by an
/// optional file name glob such as `*.jsonl`.
pub fn list_files(pathname: impl Into<PathBuf>, pattern: Option<&str>) -> DataPipelineBuilder {
    DataPipelineBuilder::from_result(
        FileListDataSource::new(pathname, pattern).map(|s| Box::new(s) as BoxedSource),
    )
}
