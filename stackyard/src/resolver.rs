//! Expansion of `${VAR}` and `$VAR` placeholders.
//!
//! There are two passes:
//!
//! - [`expand_pre_deploy`] runs when a stack is saved and only touches volumes and environment
//!   values. Anything that cannot be resolved is left as it is.
//! - [`resolve_for_deploy`] runs right before the document is handed to the container engine.
//!   It covers the whole document, and any placeholder left unresolved blocks the deployment.
//!
//! `$$` is the escape sequence for a literal `$` and is never expanded.

use std::{collections::BTreeSet, sync::LazyLock};

use docker_compose_config::{ComposeError, ComposeFile, ServiceVolume, split_key_value};
use regex::{Captures, Regex};
use serde_yaml_ng::{Mapping, Value};
use tracing::debug;

use crate::{
	AppError,
	secrets::{canonical_secret_path, is_sensitive_key},
	variables::{BUILTIN_NAMES, VarMap, VariableSources},
};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

/// Replaces placeholders in strings, keeping track of the names that could not be resolved.
pub struct Expander<F> {
	lookup: F,
	unresolved: BTreeSet<String>,
}

impl<F> Expander<F>
where
	F: Fn(&str) -> Option<String>,
{
	pub const fn new(lookup: F) -> Self {
		Self {
			lookup,
			unresolved: BTreeSet::new(),
		}
	}

	pub fn expand(&mut self, text: &str) -> String {
		if !text.contains('$') {
			return text.to_string();
		}

		PLACEHOLDER
			.replace_all(text, |caps: &Captures| {
				let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
					return caps[0].to_string();
				};

				match (self.lookup)(name.as_str()) {
					Some(value) => value,
					None => {
						self.unresolved.insert(name.as_str().to_string());
						caps[0].to_string()
					}
				}
			})
			.into_owned()
	}

	/// The names that could not be resolved so far, sorted.
	pub fn into_unresolved(self) -> Vec<String> {
		self.unresolved.into_iter().collect()
	}
}

/// Expands the placeholders in service volumes and environment values.
///
/// Sensitive environment entries are skipped, so that their plaintext does not get mixed with
/// values from other sources before sanitization.
pub fn expand_pre_deploy(doc: &mut ComposeFile, vars: &VarMap) {
	let mut expander = Expander::new(|name: &str| vars.get(name).cloned());

	for (service_name, service) in &mut doc.services {
		for volume in &mut service.volumes {
			match volume {
				ServiceVolume::Simple(spec) => *spec = expander.expand(spec),
				ServiceVolume::Advanced(settings) => {
					if let Some(source) = settings.source.as_mut() {
						*source = expander.expand(source);
					}

					settings.target = expander.expand(&settings.target);
				}
				ServiceVolume::Other(_) => {}
			}
		}

		service.edit_environment(service_name, |entries| {
			for entry in entries.iter_mut() {
				let (key, Some(value)) = split_key_value(entry) else {
					continue;
				};

				if let Some(path) = canonical_secret_path(value) {
					*entry = format!("{key}={path}");
				} else if !is_sensitive_key(key) {
					let expanded = expander.expand(value);
					*entry = format!("{key}={expanded}");
				}
			}
		});
	}

	let unresolved = expander.into_unresolved();

	if !unresolved.is_empty() {
		debug!("Left unresolved before deployment: {}", unresolved.join(", "));
	}
}

/// Looks up a variable for deployment.
///
/// Built-ins always win. Sensitive names are only read from the persisted sources, so that
/// credentials never come from the environment of the running process. Everything else prefers
/// the process environment over the persisted values.
pub fn deploy_value(name: &str, sources: &VariableSources, persisted: &VarMap) -> Option<String> {
	if BUILTIN_NAMES.contains(&name)
		&& let Some(value) = sources.builtins.get(name)
	{
		return Some(value.clone());
	}

	if is_sensitive_key(name) {
		return persisted.get(name).cloned();
	}

	sources
		.process
		.get(name)
		.or_else(|| persisted.get(name))
		.cloned()
}

/// Produces the deploy-ready document, with every placeholder replaced by its value.
///
/// Fails with the sorted list of missing names if anything is left unresolved.
pub fn resolve_for_deploy(
	doc: &ComposeFile,
	sources: &VariableSources,
) -> Result<ComposeFile, AppError> {
	let persisted = sources.persisted()?;

	let mut expander = Expander::new(|name: &str| deploy_value(name, sources, &persisted));

	let tree = serde_yaml_ng::to_value(doc).map_err(ComposeError::Serialize)?;

	let expanded = expand_document(tree, &mut expander);

	let unresolved = expander.into_unresolved();

	if !unresolved.is_empty() {
		return Err(AppError::UnresolvedVariables(unresolved));
	}

	Ok(serde_yaml_ng::from_value(expanded).map_err(ComposeError::Parse)?)
}

// Resource names are expanded along with their contents, but other keys are left alone.
fn expand_document<F>(tree: Value, expander: &mut Expander<F>) -> Value
where
	F: Fn(&str) -> Option<String>,
{
	let Value::Mapping(root) = tree else {
		return expand_values(tree, expander);
	};

	let mut output = Mapping::with_capacity(root.len());

	for (key, value) in root {
		let value = match (key.as_str(), value) {
			(Some("services"), Value::Mapping(services)) => Value::Mapping(
				services
					.into_iter()
					.map(|(name, service)| (name, expand_service(service, expander)))
					.collect(),
			),
			(Some("volumes" | "networks" | "configs" | "secrets"), Value::Mapping(resources)) => {
				Value::Mapping(expand_keys(resources, expander))
			}
			(_, value) => expand_values(value, expander),
		};

		output.insert(key, value);
	}

	Value::Mapping(output)
}

fn expand_service<F>(service: Value, expander: &mut Expander<F>) -> Value
where
	F: Fn(&str) -> Option<String>,
{
	let Value::Mapping(fields) = service else {
		return expand_values(service, expander);
	};

	let fields = fields
		.into_iter()
		.map(|(field, value)| {
			let value = match (field.as_str(), value) {
				(Some("environment"), Value::Sequence(entries)) => Value::Sequence(
					entries
						.into_iter()
						.map(|entry| match entry {
							Value::String(entry) => Value::String(expand_env_entry(&entry, expander)),
							other => expand_values(other, expander),
						})
						.collect(),
				),
				(Some("environment"), Value::Mapping(vars)) => Value::Mapping(
					vars.into_iter()
						.map(|(key, value)| {
							let value = match value {
								Value::String(value) => Value::String(
									canonical_secret_path(&value)
										.unwrap_or_else(|| expander.expand(&value)),
								),
								other => expand_values(other, expander),
							};

							(key, value)
						})
						.collect(),
				),
				(Some("networks"), Value::Mapping(networks)) => {
					Value::Mapping(expand_keys(networks, expander))
				}
				(Some("networks"), Value::Sequence(entries)) => Value::Sequence(
					entries
						.into_iter()
						.map(|entry| match entry {
							Value::Mapping(inline) => Value::Mapping(expand_keys(inline, expander)),
							other => expand_values(other, expander),
						})
						.collect(),
				),
				(_, value) => expand_values(value, expander),
			};

			(field, value)
		})
		.collect();

	Value::Mapping(fields)
}

fn expand_env_entry<F>(entry: &str, expander: &mut Expander<F>) -> String
where
	F: Fn(&str) -> Option<String>,
{
	match split_key_value(entry) {
		(key, Some(value)) => match canonical_secret_path(value) {
			Some(path) => format!("{key}={path}"),
			None => format!("{key}={}", expander.expand(value)),
		},
		(key, None) => key.to_string(),
	}
}

fn expand_keys<F>(mapping: Mapping, expander: &mut Expander<F>) -> Mapping
where
	F: Fn(&str) -> Option<String>,
{
	mapping
		.into_iter()
		.map(|(key, value)| {
			let key = match key {
				Value::String(key) => Value::String(expander.expand(&key)),
				other => other,
			};

			(key, expand_values(value, expander))
		})
		.collect()
}

fn expand_values<F>(value: Value, expander: &mut Expander<F>) -> Value
where
	F: Fn(&str) -> Option<String>,
{
	match value {
		Value::String(s) => Value::String(expander.expand(&s)),
		Value::Sequence(items) => Value::Sequence(
			items
				.into_iter()
				.map(|item| expand_values(item, expander))
				.collect(),
		),
		Value::Mapping(mapping) => Value::Mapping(
			mapping
				.into_iter()
				.map(|(k, v)| (k, expand_values(v, expander)))
				.collect(),
		),
		Value::Tagged(mut tagged) => {
			let inner = std::mem::take(&mut tagged.value);
			tagged.value = expand_values(inner, expander);
			Value::Tagged(tagged)
		}
		other => other,
	}
}

#[cfg(test)]
mod tests {
	use indexmap::indexmap;
	use indoc::indoc;
	use pretty_assertions::assert_eq;

	use super::*;
	use crate::variables::{EnvFile, SecretsDir};

	fn vars(map: indexmap::IndexMap<&str, &str>) -> VarMap {
		map.into_iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn both_forms_are_expanded_and_escapes_are_kept() {
		let lookup = vars(indexmap! { "HOME" => "/home/app" });
		let mut expander = Expander::new(|name: &str| lookup.get(name).cloned());

		assert_eq!(
			expander.expand("${HOME}/data:$HOME/cache:$$HOME:$UNKNOWN"),
			"/home/app/data:/home/app/cache:$$HOME:$UNKNOWN"
		);
		assert_eq!(expander.into_unresolved(), vec!["UNKNOWN"]);
	}

	#[test]
	fn sensitive_names_never_come_from_the_process() {
		let sources = VariableSources {
			builtins: vars(indexmap! { "UID" => "1000" }),
			env_file: EnvFile {
				vars: vars(indexmap! { "TZ" => "UTC", "UID" => "0" }),
			},
			process: vars(indexmap! {
				"DB_PASSWORD" => "from-process",
				"TZ" => "Europe/Rome",
			}),
			..Default::default()
		};

		let persisted = sources.persisted().unwrap();

		assert_eq!(deploy_value("UID", &sources, &persisted).as_deref(), Some("1000"));
		assert_eq!(deploy_value("TZ", &sources, &persisted).as_deref(), Some("Europe/Rome"));
		assert_eq!(deploy_value("DB_PASSWORD", &sources, &persisted), None);
	}

	#[test]
	fn environment_keys_are_preserved() {
		let lookup = vars(indexmap! { "A" => "expanded" });
		let mut expander = Expander::new(|name: &str| lookup.get(name).cloned());

		assert_eq!(expand_env_entry("$A=$A", &mut expander), "$A=expanded");
		assert_eq!(expand_env_entry("BARE", &mut expander), "BARE");
	}

	#[test]
	fn pre_deploy_leaves_unknown_placeholders_and_sensitive_values() {
		let mut doc = ComposeFile::from_yaml(indoc! {"
			services:
			  app:
			    volumes:
			      - ${DATA_DIR}/app:/data
			      - ${UNKNOWN}:/other
			    environment:
			      TZ: $TZ
			      DB_PASSWORD: $TZ
		"})
		.unwrap();

		expand_pre_deploy(
			&mut doc,
			&vars(indexmap! { "DATA_DIR" => "/srv", "TZ" => "UTC" }),
		);

		let app = &doc.services["app"];

		assert_eq!(
			app.volumes,
			vec![
				ServiceVolume::Simple("/srv/app:/data".to_string()),
				ServiceVolume::Simple("${UNKNOWN}:/other".to_string()),
			]
		);
		assert_eq!(app.env_entries(), vec!["TZ=UTC", "DB_PASSWORD=$TZ"]);
	}

	#[test]
	fn secret_paths_are_never_expanded() {
		let secrets = vars(indexmap! { "APP_TOKEN" => "t0k3n" });

		let mut doc = ComposeFile::from_yaml(indoc! {"
			services:
			  list:
			    environment:
			      - TOKEN_FILE=/run/secrets/${APP_TOKEN}
			  map:
			    environment:
			      TOKEN_FILE: /run/secrets/${APP_TOKEN}
		"})
		.unwrap();

		expand_pre_deploy(&mut doc, &secrets);

		assert_eq!(
			doc.services["list"].env_entries(),
			vec!["TOKEN_FILE=/run/secrets/APP_TOKEN"]
		);
		assert_eq!(
			doc.services["map"].env_entries(),
			vec!["TOKEN_FILE=/run/secrets/APP_TOKEN"]
		);

		let wrapped = ComposeFile::from_yaml(indoc! {"
			services:
			  list:
			    environment:
			      - TOKEN_FILE=/run/secrets/${APP_TOKEN}
			  map:
			    environment:
			      TOKEN_FILE: /run/secrets/${APP_TOKEN}
		"})
		.unwrap();

		let sources = VariableSources {
			secrets: SecretsDir { vars: secrets },
			..Default::default()
		};

		let resolved = resolve_for_deploy(&wrapped, &sources).unwrap();

		for service in resolved.services.values() {
			assert_eq!(service.env_entries(), vec!["TOKEN_FILE=/run/secrets/APP_TOKEN"]);
		}
	}
}
