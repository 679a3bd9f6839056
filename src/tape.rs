//! The position tape used to checkpoint a data source graph.
//!
//! A [`Tape`] is a flat, ordered list of [`Data`] values. Sources append their
//! state with [`Tape::record`] and read it back with [`Tape::read`] in exactly
//! the same order. Upstream sources record before the operators wrapping them,
//! so a tape is a depth-first preorder of the graph.

use crate::data::Data;
use crate::error::{Error, Result};
use std::collections::VecDeque;

/// Conversion between a Rust value and its tape representation.
pub trait TapeValue: Sized {
    /// Encode the value.
    fn to_data(&self) -> Data;

    /// Decode a value written by [`TapeValue::to_data`].
    ///
    /// Returns `None` if `data` has the wrong shape.
    fn from_data(data: Data) -> Option<Self>;
}

impl TapeValue for Data {
    fn to_data(&self) -> Data {
        self.clone()
    }

    fn from_data(data: Data) -> Option<Self> {
        Some(data)
    }
}

impl TapeValue for bool {
    fn to_data(&self) -> Data {
        Data::Bool(*self)
    }

    fn from_data(data: Data) -> Option<Self> {
        data.as_bool()
    }
}

impl TapeValue for i64 {
    fn to_data(&self) -> Data {
        Data::Int(*self)
    }

    fn from_data(data: Data) -> Option<Self> {
        data.as_int()
    }
}

// Goes through `u64` so values above `i64::MAX` keep every bit.
impl TapeValue for usize {
    fn to_data(&self) -> Data {
        (*self as u64).to_data()
    }

    fn from_data(data: Data) -> Option<Self> {
        u64::from_data(data).and_then(|v| usize::try_from(v).ok())
    }
}

// Stored bit-for-bit so the full range survives the signed representation.
impl TapeValue for u64 {
    #[allow(clippy::cast_possible_wrap)]
    fn to_data(&self) -> Data {
        Data::Int(*self as i64)
    }

    #[allow(clippy::cast_sign_loss)]
    fn from_data(data: Data) -> Option<Self> {
        data.as_int().map(|v| v as u64)
    }
}

impl<T: TapeValue> TapeValue for Vec<T> {
    fn to_data(&self) -> Data {
        Data::List(self.iter().map(TapeValue::to_data).collect())
    }

    fn from_data(data: Data) -> Option<Self> {
        data.into_list()?.into_iter().map(T::from_data).collect()
    }
}

impl<T: TapeValue> TapeValue for VecDeque<T> {
    fn to_data(&self) -> Data {
        Data::List(self.iter().map(TapeValue::to_data).collect())
    }

    fn from_data(data: Data) -> Option<Self> {
        data.into_list()?.into_iter().map(T::from_data).collect()
    }
}

impl<T: TapeValue> TapeValue for Option<T> {
    fn to_data(&self) -> Data {
        match self {
            Some(v) => Data::List(vec![v.to_data()]),
            None => Data::List(Vec::new()),
        }
    }

    fn from_data(data: Data) -> Option<Self> {
        let mut items = data.into_list()?;
        match items.len() {
            0 => Some(None),
            1 => T::from_data(items.pop()?).map(Some),
            _ => None,
        }
    }
}

/// Serialized traversal position of a data source graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tape {
    storage: Vec<Data>,
    pos: usize,
}

impl Tape {
    /// Create an empty tape, ready for recording.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tape over previously recorded storage, ready for reading.
    #[must_use]
    pub const fn from_storage(storage: Vec<Data>) -> Self {
        Self { storage, pos: 0 }
    }

    /// Append a value.
    pub fn record<T: TapeValue>(&mut self, value: &T) {
        self.storage.push(value.to_data());
    }

    /// Read the next value.
    ///
    /// # Errors
    ///
    /// Returns a pipeline error if the tape is exhausted or the next value does
    /// not have the expected shape.
    pub fn read<T: TapeValue>(&mut self) -> Result<T> {
        let Some(slot) = self.storage.get_mut(self.pos) else {
            return Err(Error::pipeline(
                "The tape is corrupt: it ended before the position was fully restored.",
            ));
        };
        // Values are read once, so move them out instead of cloning.
        let data = std::mem::replace(slot, Data::Bool(false));
        self.pos += 1;

        T::from_data(data).ok_or_else(|| {
            Error::pipeline(format!(
                "The tape is corrupt: the value at index {} has an unexpected shape.",
                self.pos - 1
            ))
        })
    }

    /// Append a failure an operator holds but has not delivered yet, if any.
    pub fn record_failure(&mut self, failure: Option<&Error>) {
        self.record(&failure.map(Error::to_pending));
    }

    /// Read back a value written by [`Tape::record_failure`].
    ///
    /// # Errors
    ///
    /// Returns a pipeline error if the next value is not a recorded failure.
    pub fn read_failure(&mut self) -> Result<Option<Error>> {
        let Some(data) = self.read::<Option<Data>>()? else {
            return Ok(None);
        };
        Error::from_pending(&data)
            .map(Some)
            .ok_or_else(|| Error::pipeline("The tape is corrupt: a pending failure cannot be decoded."))
    }

    /// Whether every recorded value has been read.
    #[must_use]
    pub fn is_eod(&self) -> bool {
        self.pos >= self.storage.len()
    }

    /// The recorded values.
    #[must_use]
    pub fn storage(&self) -> &[Data] {
        &self.storage
    }

    /// Consume the tape and return its storage.
    #[must_use]
    pub fn into_storage(self) -> Vec<Data> {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_in_recording_order() {
        let mut tape = Tape::new();
        tape.record(&3usize);
        tape.record(&true);
        tape.record(&u64::MAX);
        tape.record(&vec![Data::Int(1), Data::from("a")]);
        tape.record(&Some(5usize));
        tape.record(&None::<usize>);

        let mut tape = Tape::from_storage(tape.into_storage());
        assert_eq!(tape.read::<usize>().unwrap(), 3);
        assert!(tape.read::<bool>().unwrap());
        assert_eq!(tape.read::<u64>().unwrap(), u64::MAX);
        assert_eq!(
            tape.read::<Vec<Data>>().unwrap(),
            vec![Data::Int(1), Data::from("a")]
        );
        assert_eq!(tape.read::<Option<usize>>().unwrap(), Some(5));
        assert_eq!(tape.read::<Option<usize>>().unwrap(), None);
        assert!(tape.is_eod());
    }

    #[test]
    fn large_indices_survive() {
        let mut tape = Tape::new();
        tape.record(&usize::MAX);
        let mut tape = Tape::from_storage(tape.into_storage());
        assert_eq!(tape.read::<usize>().unwrap(), usize::MAX);
    }

    #[test]
    fn failures_round_trip() {
        let mut tape = Tape::new();
        tape.record_failure(Some(&Error::record("bad record")));
        tape.record_failure(None);

        let mut tape = Tape::from_storage(tape.into_storage());
        let failure = tape.read_failure().unwrap().unwrap();
        assert_eq!(failure.kind(), crate::error::ErrorKind::Record);
        assert_eq!(failure.to_string(), "bad record");
        assert!(tape.read_failure().unwrap().is_none());
    }

    #[test]
    fn shape_mismatch_is_a_pipeline_error() {
        let mut tape = Tape::from_storage(vec![Data::from("not a number")]);
        let err = tape.read::<usize>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Pipeline);
    }

    #[test]
    fn reading_past_the_end_fails() {
        let mut tape = Tape::new();
        assert!(tape.read::<bool>().is_err());
    }
}
