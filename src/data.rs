//! The record value flowing through a pipeline, and field-path selectors.
//!
//! [`Data`] is a small tagged union. Records are moved between stages; the
//! only places that clone them are restartable leaf sources and checkpoint
//! recording.
//!
//! A [`DataSelector`] addresses sub-fields of a structured record with a
//! path such as `src.tokens` or `pair[1].text`. Several paths may be given
//! at once, separated by commas.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single record (or a part of one).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Data {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Data>),
    Dict(BTreeMap<String, Data>),
}

impl Data {
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_dict(&self) -> Option<&BTreeMap<String, Data>> {
        match self {
            Self::Dict(v) => Some(v),
            _ => None,
        }
    }

    /// Consume the value and return the inner list, if it is one.
    #[must_use]
    pub fn into_list(self) -> Option<Vec<Data>> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// The natural length of a value: element count for lists and dicts,
    /// character count for strings, and the value itself for non-negative ints.
    #[must_use]
    pub fn len_hint(&self) -> Option<usize> {
        match self {
            Self::List(v) => Some(v.len()),
            Self::Dict(v) => Some(v.len()),
            Self::String(v) => Some(v.chars().count()),
            Self::Int(v) => usize::try_from(*v).ok(),
            Self::Bool(_) | Self::Float(_) => None,
        }
    }

    /// Name of the variant, for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }
}

impl From<bool> for Data {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Data {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Data {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Data {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Data {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Data {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<Data>> for Data {
    fn from(v: Vec<Data>) -> Self {
        Self::List(v)
    }
}

impl From<BTreeMap<String, Data>> for Data {
    fn from(v: BTreeMap<String, Data>) -> Self {
        Self::Dict(v)
    }
}

impl TryFrom<serde_json::Value> for Data {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => return Err(Error::record("JSON null has no record representation")),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => {
                Self::List(items.into_iter().map(Self::try_from).collect::<Result<_>>()?)
            }
            Value::Object(map) => Self::Dict(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Self::try_from(v)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Dict(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, ".{k}"),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// One or more parsed field paths into a structured record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSelector {
    source: String,
    paths: Vec<Vec<PathSegment>>,
}

impl DataSelector {
    /// Parse a selector string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if any path is empty or malformed.
    pub fn parse(selector: &str) -> Result<Self> {
        let paths = selector
            .split(',')
            .map(|p| parse_path(p.trim()).map_err(|reason| {
                Error::invalid_argument(format!("`{selector}` is not a valid selector: {reason}"))
            }))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: selector.to_string(),
            paths,
        })
    }

    /// The selector as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Visit every selected sub-field of `data` mutably, in selector order.
    ///
    /// # Errors
    ///
    /// Returns a record error if `data` does not contain one of the paths, or
    /// whatever error `f` returns.
    pub fn visit_mut<F>(&self, data: &mut Data, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Data) -> Result<()>,
    {
        for path in &self.paths {
            let target = resolve_mut(data, path)?;
            f(target)?;
        }
        Ok(())
    }

    /// Resolve the first path against `data`.
    ///
    /// # Errors
    ///
    /// Returns a record error if `data` does not contain the path.
    pub fn find<'a>(&self, data: &'a Data) -> Result<&'a Data> {
        let mut current = data;
        // `parse` never produces an empty selector.
        let path = self.paths.first().map_or(&[][..], Vec::as_slice);
        for segment in path {
            current = step(current, segment).ok_or_else(|| missing(path))?;
        }
        Ok(current)
    }
}

impl fmt::Display for DataSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_path(path: &str) -> std::result::Result<Vec<PathSegment>, String> {
    if path.is_empty() {
        return Err("empty path".into());
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => part.split_at(pos),
            None => (part, ""),
        };
        if key.is_empty() {
            return Err(format!("empty key in `{part}`"));
        }
        segments.push(PathSegment::Key(key.to_string()));

        while !rest.is_empty() {
            let Some(close) = rest.find(']') else {
                return Err(format!("unclosed `[` in `{part}`"));
            };
            let index = rest[1..close]
                .parse::<usize>()
                .map_err(|_| format!("`{}` is not a list index", &rest[1..close]))?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(format!("unexpected `{rest}` in `{part}`"));
            }
        }
    }
    Ok(segments)
}

fn step<'a>(data: &'a Data, segment: &PathSegment) -> Option<&'a Data> {
    match (data, segment) {
        (Data::Dict(map), PathSegment::Key(k)) => map.get(k),
        (Data::List(items), PathSegment::Index(i)) => items.get(*i),
        _ => None,
    }
}

fn resolve_mut<'a>(data: &'a mut Data, path: &[PathSegment]) -> Result<&'a mut Data> {
    let mut current = data;
    for segment in path {
        current = match (current, segment) {
            (Data::Dict(map), PathSegment::Key(k)) => map.get_mut(k),
            (Data::List(items), PathSegment::Index(i)) => items.get_mut(*i),
            _ => None,
        }
        .ok_or_else(|| missing(path))?;
    }
    Ok(current)
}

fn missing(path: &[PathSegment]) -> Error {
    let rendered: String = path.iter().map(ToString::to_string).collect();
    Error::record(format!(
        "The record does not contain an element at `{}`.",
        rendered.trim_start_matches('.')
    ))
}
