//! Two-way conversions between the union-typed compose fields and a single canonical form.
//!
//! Every pass that inspects or edits `environment`, `labels`, `sysctls`, `networks` or `command`
//! goes through the canonical form, and the result is written back in the shape that the
//! author originally used. Values that match none of the known shapes are left untouched.

use indexmap::IndexMap;
use tracing::warn;

use crate::{
	ListOrMap, NetworkEntry, Service, ServiceNetworks, SingleValue, StringOrList, split_key_value,
};

/// The representation used by a union-typed field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldShape {
	Absent,
	Scalar,
	List,
	Map,
	Unrecognized,
}

impl FieldShape {
	pub const fn of_list_or_map(field: Option<&ListOrMap>) -> Self {
		match field {
			None => Self::Absent,
			Some(ListOrMap::List(_)) => Self::List,
			Some(ListOrMap::Map(_)) => Self::Map,
			Some(ListOrMap::Other(_)) => Self::Unrecognized,
		}
	}

	pub const fn of_networks(field: Option<&ServiceNetworks>) -> Self {
		match field {
			None => Self::Absent,
			Some(ServiceNetworks::Single(_)) => Self::Scalar,
			Some(ServiceNetworks::List(_)) => Self::List,
			Some(ServiceNetworks::Map(_)) => Self::Map,
			Some(ServiceNetworks::Other(_)) => Self::Unrecognized,
		}
	}

	pub const fn of_command(field: Option<&StringOrList>) -> Self {
		match field {
			None => Self::Absent,
			Some(StringOrList::String(_)) => Self::Scalar,
			Some(StringOrList::List(_)) => Self::List,
			Some(StringOrList::Other(_)) => Self::Unrecognized,
		}
	}
}

/// Converts an environment-like field into an ordered list of `KEY=VALUE` entries.
///
/// Map entries without a value become a bare `KEY`, like they would in the list form.
pub fn env_to_canonical(field: Option<&ListOrMap>) -> Vec<String> {
	match field {
		None | Some(ListOrMap::Other(_)) => Vec::new(),
		Some(ListOrMap::List(list)) => list.clone(),
		Some(ListOrMap::Map(map)) => map
			.iter()
			.map(|(key, value)| match value {
				Some(value) => format!("{key}={value}"),
				None => key.clone(),
			})
			.collect(),
	}
}

/// Writes canonical `KEY=VALUE` entries back in the given shape. Absent fields become lists.
pub fn env_from_canonical(entries: &[String], hint: FieldShape) -> Option<ListOrMap> {
	if entries.is_empty() {
		return None;
	}

	match hint {
		FieldShape::Map => Some(ListOrMap::Map(
			entries
				.iter()
				.map(|entry| {
					let (key, value) = split_key_value(entry);
					(
						key.to_string(),
						value.map(|v| SingleValue::String(v.to_string())),
					)
				})
				.collect(),
		)),
		_ => Some(ListOrMap::List(entries.to_vec())),
	}
}

/// Converts a label-like field into a mapping, where keys must stay unique.
pub fn mapping_to_canonical(field: Option<&ListOrMap>) -> IndexMap<String, String> {
	match field {
		None | Some(ListOrMap::Other(_)) => IndexMap::new(),
		Some(ListOrMap::List(list)) => list
			.iter()
			.map(|entry| {
				let (key, value) = split_key_value(entry);
				(key.to_string(), value.unwrap_or_default().to_string())
			})
			.collect(),
		Some(ListOrMap::Map(map)) => map
			.iter()
			.map(|(key, value)| {
				(
					key.clone(),
					value.as_ref().map(ToString::to_string).unwrap_or_default(),
				)
			})
			.collect(),
	}
}

/// Writes a canonical mapping back in the given shape. Absent fields become mappings.
pub fn mapping_from_canonical(map: &IndexMap<String, String>, hint: FieldShape) -> Option<ListOrMap> {
	if map.is_empty() {
		return None;
	}

	match hint {
		FieldShape::List => Some(ListOrMap::List(
			map.iter().map(|(k, v)| format!("{k}={v}")).collect(),
		)),
		_ => Some(ListOrMap::Map(
			map.iter()
				.map(|(k, v)| (k.clone(), Some(SingleValue::String(v.clone()))))
				.collect(),
		)),
	}
}

/// Lists the names of the networks referenced by a service, in declaration order.
pub fn networks_to_canonical(field: Option<&ServiceNetworks>) -> Vec<String> {
	match field {
		None | Some(ServiceNetworks::Other(_)) => Vec::new(),
		Some(ServiceNetworks::Single(name)) => vec![name.clone()],
		Some(ServiceNetworks::List(entries)) => entries
			.iter()
			.flat_map(NetworkEntry::names)
			.map(str::to_string)
			.collect(),
		Some(ServiceNetworks::Map(map)) => map.keys().cloned().collect(),
	}
}

/// Writes a list of network names back in the given shape.
///
/// A scalar can only hold a single name, so more names turn it into a list.
pub fn networks_from_canonical(names: &[String], hint: FieldShape) -> Option<ServiceNetworks> {
	match (hint, names) {
		(_, []) => None,
		(FieldShape::Scalar, [single]) => Some(ServiceNetworks::Single(single.clone())),
		(FieldShape::Map, _) => Some(ServiceNetworks::Map(
			names.iter().map(|n| (n.clone(), None)).collect(),
		)),
		_ => Some(ServiceNetworks::List(
			names.iter().cloned().map(NetworkEntry::Name).collect(),
		)),
	}
}

/// Splits a command into its tokens, following shell quoting rules for the string form.
pub fn command_to_canonical(field: Option<&StringOrList>) -> Vec<String> {
	match field {
		None | Some(StringOrList::Other(_)) => Vec::new(),
		Some(StringOrList::List(list)) => list.clone(),
		Some(StringOrList::String(command)) => shell_words::split(command).unwrap_or_else(|e| {
			warn!("Could not split the command `{command}` ({e}), splitting on whitespace instead");
			command.split_whitespace().map(str::to_string).collect()
		}),
	}
}

pub fn command_from_canonical(tokens: &[String], hint: FieldShape) -> Option<StringOrList> {
	if tokens.is_empty() {
		return None;
	}

	match hint {
		FieldShape::Scalar => Some(StringOrList::String(shell_words::join(tokens))),
		_ => Some(StringOrList::List(tokens.to_vec())),
	}
}

// When a mapping is rewritten, values that did not change keep their original scalar type,
// so that `PORT: 8080` does not turn into `PORT: "8080"`.
fn restore_scalar_types(updated: &mut ListOrMap, previous: Option<&ListOrMap>) {
	if let ListOrMap::Map(new_map) = updated
		&& let Some(ListOrMap::Map(old_map)) = previous
	{
		for (key, value) in new_map.iter_mut() {
			if let Some(Some(old_value)) = old_map.get(key)
				&& let Some(new_value) = value
				&& new_value.to_string() == old_value.to_string()
			{
				*value = Some(old_value.clone());
			}
		}
	}
}

fn report_unrecognized(service_name: &str, field: &str) {
	warn!(
		"The `{field}` field of the service `{service_name}` has an unrecognized format and will be left untouched"
	);
}

impl Service {
	/// The environment as `KEY=VALUE` entries.
	pub fn env_entries(&self) -> Vec<String> {
		env_to_canonical(self.environment.as_ref())
	}

	/// The labels as a mapping.
	pub fn label_map(&self) -> IndexMap<String, String> {
		mapping_to_canonical(self.labels.as_ref())
	}

	pub fn network_names(&self) -> Vec<String> {
		networks_to_canonical(self.networks.as_ref())
	}

	pub fn command_tokens(&self) -> Vec<String> {
		command_to_canonical(self.command.as_ref())
	}

	/// Edits the environment through its canonical form.
	///
	/// The field is only rewritten when the entries actually changed. Returns whether it was.
	pub fn edit_environment<F>(&mut self, service_name: &str, edit: F) -> bool
	where
		F: FnOnce(&mut Vec<String>),
	{
		let shape = FieldShape::of_list_or_map(self.environment.as_ref());

		if shape == FieldShape::Unrecognized {
			report_unrecognized(service_name, "environment");
			return false;
		}

		let original = self.env_entries();
		let mut entries = original.clone();

		edit(&mut entries);

		if entries == original {
			return false;
		}

		let mut updated = env_from_canonical(&entries, shape);

		if let Some(updated) = updated.as_mut() {
			restore_scalar_types(updated, self.environment.as_ref());
		}

		self.environment = updated;

		true
	}

	/// Edits the labels through their canonical mapping. Returns whether they changed.
	pub fn edit_labels<F>(&mut self, service_name: &str, edit: F) -> bool
	where
		F: FnOnce(&mut IndexMap<String, String>),
	{
		let shape = FieldShape::of_list_or_map(self.labels.as_ref());

		if shape == FieldShape::Unrecognized {
			report_unrecognized(service_name, "labels");
			return false;
		}

		let original = self.label_map();
		let mut map = original.clone();

		edit(&mut map);

		if map == original {
			return false;
		}

		let mut updated = mapping_from_canonical(&map, shape);

		if let Some(updated) = updated.as_mut() {
			restore_scalar_types(updated, self.labels.as_ref());
		}

		self.labels = updated;

		true
	}

	/// Makes sure that the service is attached to the given network, keeping the shape of the
	/// field whenever it can hold the result. Returns whether anything was added.
	pub fn ensure_network(&mut self, service_name: &str, network: &str) -> bool {
		let shape = FieldShape::of_networks(self.networks.as_ref());

		match self.networks.as_mut() {
			None => {
				self.networks = networks_from_canonical(&[network.to_string()], shape);
				true
			}
			Some(ServiceNetworks::Single(current)) => {
				if current == network {
					return false;
				}

				self.networks =
					networks_from_canonical(&[current.clone(), network.to_string()], shape);
				true
			}
			Some(ServiceNetworks::List(entries)) => {
				if entries.iter().any(|e| e.names().contains(&network)) {
					return false;
				}

				entries.push(NetworkEntry::Name(network.to_string()));
				true
			}
			Some(ServiceNetworks::Map(map)) => {
				if map.contains_key(network) {
					return false;
				}

				map.insert(network.to_string(), None);
				true
			}
			Some(ServiceNetworks::Other(_)) => {
				report_unrecognized(service_name, "networks");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use indexmap::indexmap;
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn env_map_round_trip_keeps_null_entries() {
		let field = ListOrMap::Map(indexmap! {
			"TZ".to_string() => Some(SingleValue::String("Europe/Berlin".to_string())),
			"PASSTHROUGH".to_string() => None,
		});

		let entries = env_to_canonical(Some(&field));

		assert_eq!(entries, vec!["TZ=Europe/Berlin", "PASSTHROUGH"]);
		assert_eq!(env_from_canonical(&entries, FieldShape::Map), Some(field));
	}

	#[test]
	fn values_containing_equals_are_split_once() {
		let field = ListOrMap::List(vec!["OPTS=a=b".to_string()]);

		assert_eq!(field.get("OPTS").as_deref(), Some("a=b"));
	}

	#[test]
	fn single_network_is_promoted_to_a_list() {
		let mut service = Service {
			networks: Some(ServiceNetworks::Single("backend".to_string())),
			..Default::default()
		};

		assert!(service.ensure_network("app", "shared"));
		assert_eq!(service.network_names(), vec!["backend", "shared"]);
		assert!(matches!(service.networks, Some(ServiceNetworks::List(_))));
	}

	#[test]
	fn command_string_keeps_quoting() {
		let field = StringOrList::String(r#"sh -c "echo hi""#.to_string());

		let tokens = command_to_canonical(Some(&field));

		assert_eq!(tokens, vec!["sh", "-c", "echo hi"]);
		assert_eq!(
			command_from_canonical(&tokens, FieldShape::Scalar),
			Some(StringOrList::String("sh -c 'echo hi'".to_string()))
		);
	}

	#[test]
	fn unchanged_map_values_keep_their_type() {
		let mut service = Service {
			environment: Some(ListOrMap::Map(indexmap! {
				"PORT".to_string() => Some(SingleValue::Int(8080)),
			})),
			..Default::default()
		};

		service.edit_environment("app", |entries| entries.push("EXTRA=1".to_string()));

		let Some(ListOrMap::Map(map)) = &service.environment else {
			panic!("environment should still be a map");
		};

		assert_eq!(map.get("PORT"), Some(&Some(SingleValue::Int(8080))));
		assert_eq!(
			map.get("EXTRA"),
			Some(&Some(SingleValue::String("1".to_string())))
		);
	}
}
