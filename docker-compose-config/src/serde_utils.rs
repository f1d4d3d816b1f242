use std::fmt::{self, Display};

use indexmap::IndexMap;
#[cfg(feature = "schemars")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scalar as it can appear in the value position of a compose mapping.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, PartialOrd)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum SingleValue {
	String(String),
	Bool(bool),
	Int(i64),
	Float(f64),
}

impl Display for SingleValue {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::String(s) => f.write_str(s),
			Self::Bool(b) => write!(f, "{b}"),
			Self::Int(i) => write!(f, "{i}"),
			Self::Float(fl) => write!(f, "{fl}"),
		}
	}
}

impl SingleValue {
	/// Returns true for `""`, which compose treats the same as an unset value in most places.
	pub fn is_empty_string(&self) -> bool {
		matches!(self, Self::String(s) if s.is_empty())
	}
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum StringOrNum {
	Num(i64),
	String(String),
}

impl Display for StringOrNum {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Num(n) => write!(f, "{n}"),
			Self::String(s) => write!(f, "{s}"),
		}
	}
}

/// A field that may be written as a single string or as a list, like `command` or `entrypoint`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum StringOrList {
	String(String),
	List(Vec<String>),
	/// Anything else is kept as-is so that it survives a round trip.
	Other(Value),
}

/// A field that may be written as a list of `KEY=VALUE` strings or as a mapping,
/// like `environment`, `labels` or `sysctls`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum ListOrMap {
	List(Vec<String>),
	Map(IndexMap<String, Option<SingleValue>>),
	/// Anything else is kept as-is so that it survives a round trip.
	Other(Value),
}

impl ListOrMap {
	/// Looks up the value for a key, regardless of the representation.
	///
	/// Entries without a value (`- KEY` or `KEY: null`) yield an empty string.
	pub fn get(&self, key: &str) -> Option<String> {
		match self {
			Self::List(list) => list.iter().find_map(|entry| {
				let (k, v) = split_key_value(entry);
				(k == key).then(|| v.unwrap_or_default().to_string())
			}),
			Self::Map(map) => map
				.get(key)
				.map(|v| v.as_ref().map(ToString::to_string).unwrap_or_default()),
			Self::Other(_) => None,
		}
	}
}

/// Splits `KEY=VALUE` on the first `=`. A missing `=` yields no value at all.
pub fn split_key_value(entry: &str) -> (&str, Option<&str>) {
	match entry.split_once('=') {
		Some((key, value)) => (key, Some(value)),
		None => (entry, None),
	}
}
