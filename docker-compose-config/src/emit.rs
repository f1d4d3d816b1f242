//! Deterministic serialization of compose documents.
//!
//! The document is first encoded with its default serde representation, then every mapping in
//! the resulting tree gets its keys sorted. Strings are never altered: the emitter writes
//! multi-line strings as literal blocks (`|`) when that form reproduces them exactly, and falls
//! back to double-quoted scalars otherwise (trailing whitespace, carriage returns).

use serde::Serialize;
use serde_yaml_ng::{Mapping, Value, value::TaggedValue};

use crate::ComposeError;

/// Serializes a document with sorted keys.
pub fn to_canonical_yaml<T: Serialize>(doc: &T) -> Result<String, ComposeError> {
	let tree = serde_yaml_ng::to_value(doc).map_err(ComposeError::Serialize)?;

	serde_yaml_ng::to_string(&canonicalize(tree)).map_err(ComposeError::Serialize)
}

/// Rewrites a serialized tree into its canonical form.
pub fn canonicalize(value: Value) -> Value {
	match value {
		Value::Mapping(mapping) => {
			let mut entries: Vec<(Value, Value)> = mapping
				.into_iter()
				.map(|(k, v)| (k, canonicalize(v)))
				.collect();

			entries.sort_by_cached_key(|(k, _)| key_text(k));

			let mut sorted = Mapping::with_capacity(entries.len());

			for (k, v) in entries {
				sorted.insert(k, v);
			}

			Value::Mapping(sorted)
		}
		Value::Sequence(items) => Value::Sequence(items.into_iter().map(canonicalize).collect()),
		Value::Tagged(tagged) => {
			let TaggedValue { tag, value } = *tagged;

			Value::Tagged(Box::new(TaggedValue {
				tag,
				value: canonicalize(value),
			}))
		}
		other => other,
	}
}

fn key_text(key: &Value) -> String {
	match key {
		Value::String(s) => s.clone(),
		other => serde_yaml_ng::to_string(other)
			.map(|s| s.trim_end().to_string())
			.unwrap_or_default(),
	}
}
