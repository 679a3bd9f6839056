//! Testing utilities for datapipe pipelines.
//!
//! Helpers for end-users writing tests against their own pipelines:
//!
//! - [`drain`]: pull a pipeline to the end of its current pass
//! - [`ints`] and [`as_ints`]: move between integer ranges and records
//! - [`assert_records_equal`]: order-dependent comparison with a readable diff
//! - [`assert_resumes_from_checkpoint`]: check that a pipeline resumes exactly
//!   from a state dict taken at any point
//! - [`assert_reset_repeats`]: check that a reset pipeline replays its first pass
//!
//! # Quick Start
//!
//! ```
//! use datapipe::read_sequence;
//! use datapipe::testing::{assert_resumes_from_checkpoint, ints};
//!
//! let factory = || read_sequence(ints(0..20)).bucket(3, false).and_return();
//! for prefix in 0..8 {
//!     assert_resumes_from_checkpoint(factory, prefix).unwrap();
//! }
//! ```

use crate::data::Data;
use crate::error::Result;
use crate::pipeline::DataPipeline;

/// Pull every remaining record of the current pass.
///
/// # Errors
///
/// Returns the first error raised by the pipeline.
pub fn drain(pipeline: &mut DataPipeline) -> Result<Vec<Data>> {
    pipeline.iter().collect()
}

/// Integer records for each value of `range`.
pub fn ints(range: impl IntoIterator<Item = i64>) -> Vec<Data> {
    range.into_iter().map(Data::Int).collect()
}

/// The integer values of `records`.
///
/// # Panics
///
/// Panics if a record is not an integer.
#[must_use]
pub fn as_ints(records: &[Data]) -> Vec<i64> {
    records
        .iter()
        .map(|d| {
            d.as_int()
                .unwrap_or_else(|| panic!("Expected an integer record, found {d}"))
        })
        .collect()
}

/// Assert that two record lists are equal in order and content.
///
/// # Panics
///
/// Panics if the lists differ in length or content.
pub fn assert_records_equal(actual: &[Data], expected: &[Data]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Record count mismatch:\n  Expected count: {}\n  Actual count: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            a, e,
            "Record mismatch at index {i}:\n  Expected: {e}\n  Actual: {a}"
        );
    }
}

/// Assert that resetting `pipeline` replays the same records, both after a
/// full pass and after a partial one of `prefix` records.
///
/// # Errors
///
/// Returns any error raised while pulling or resetting.
///
/// # Panics
///
/// Panics if a replayed pass differs from the first one.
pub fn assert_reset_repeats(pipeline: &mut DataPipeline, prefix: usize) -> Result<()> {
    let first = drain(pipeline)?;

    pipeline.reset()?;
    assert_records_equal(&drain(pipeline)?, &first);

    pipeline.reset()?;
    for _ in 0..prefix {
        if pipeline.next()?.is_none() {
            break;
        }
    }
    pipeline.reset()?;
    assert_records_equal(&drain(pipeline)?, &first);
    Ok(())
}

/// Assert that a pipeline resumes exactly after `prefix` records.
///
/// `factory` must build the same pipeline on every call. The records a fresh
/// pipeline produces after loading a state dict taken at `prefix` must equal
/// the records after `prefix` in an uninterrupted pass, and also the records
/// the checkpointed pipeline itself goes on to produce.
///
/// # Errors
///
/// Returns any error raised while building, pulling or checkpointing.
///
/// # Panics
///
/// Panics if a resumed pass differs from the uninterrupted one.
pub fn assert_resumes_from_checkpoint<F>(factory: F, prefix: usize) -> Result<()>
where
    F: Fn() -> Result<DataPipeline>,
{
    let full = drain(&mut factory()?)?;

    let mut original = factory()?;
    for _ in 0..prefix {
        if original.next()?.is_none() {
            break;
        }
    }
    let state = original.state_dict()?;

    let mut resumed = factory()?;
    resumed.load_state_dict(&state, true)?;

    let expected = full.get(prefix..).unwrap_or_default();
    assert_records_equal(&drain(&mut resumed)?, expected);
    assert_records_equal(&drain(&mut original)?, expected);
    Ok(())
}
