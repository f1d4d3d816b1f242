//! The sources that placeholder variables are resolved from.
//!
//! From lowest to highest priority: built-in values, the persisted environment file, the secrets
//! directory and the environment of the process.

use std::{env, fs::read_dir, path::Path};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{AppError, StackyardConfig, fs::read_text};

pub type VarMap = IndexMap<String, String>;

/// Variables that always take their built-in value during deploy-time expansion.
pub const BUILTIN_NAMES: [&str; 3] = ["UID", "GID", "DOCKER_SOCKET"];

/// The `KEY=VALUE` pairs of the persisted environment file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvFile {
	pub vars: VarMap,
}

impl EnvFile {
	/// Parses the file. A missing file yields an empty set.
	pub fn load(path: &Path) -> Result<Self, AppError> {
		let iter = match dotenvy::from_path_iter(path) {
			Ok(iter) => iter,
			Err(e) if e.not_found() => {
				debug!("No environment file found at `{}`", path.display());
				return Ok(Self::default());
			}
			Err(e) => {
				return Err(AppError::DeserializationError {
					file: path.to_path_buf(),
					error: e.to_string(),
				});
			}
		};

		let mut vars = VarMap::new();

		for item in iter {
			let (key, value) = item.map_err(|e| AppError::DeserializationError {
				file: path.to_path_buf(),
				error: e.to_string(),
			})?;

			vars.insert(key, value);
		}

		Ok(Self { vars })
	}
}

/// A directory where every regular, non-hidden file holds one secret.
///
/// The file name is the key and the trimmed content is the value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecretsDir {
	pub vars: VarMap,
}

impl SecretsDir {
	pub fn load(path: &Path) -> Self {
		let entries = match read_dir(path) {
			Ok(entries) => entries,
			Err(e) => {
				warn!("Could not read the secrets directory `{}`: {e}", path.display());
				return Self::default();
			}
		};

		let mut vars = VarMap::new();

		for entry in entries.flatten() {
			let file_name = entry.file_name().to_string_lossy().to_string();

			if file_name.starts_with('.') || !entry.file_type().is_ok_and(|t| t.is_file()) {
				continue;
			}

			match read_text(&entry.path()) {
				Ok(content) => {
					vars.insert(file_name, content.trim().to_string());
				}
				Err(e) => warn!("Skipping the secret `{file_name}`: {e}"),
			}
		}

		vars.sort_keys();

		Self { vars }
	}
}

/// Values that are always available, like the ids of the current user.
pub fn builtin_vars(socket_path: &Path) -> VarMap {
	// SAFETY: getuid and getgid cannot fail and have no preconditions
	let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };

	let mut vars = VarMap::new();

	vars.insert("UID".to_string(), uid.to_string());
	vars.insert("GID".to_string(), gid.to_string());
	vars.insert(
		"DOCKER_SOCKET".to_string(),
		socket_path.to_string_lossy().to_string(),
	);

	vars
}

/// All the layers that variables can be resolved from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableSources {
	pub builtins: VarMap,
	pub env_file: EnvFile,
	pub secrets: SecretsDir,
	/// A snapshot of the process environment.
	pub process: VarMap,
}

impl VariableSources {
	/// Loads every source from the locations in the config.
	pub fn from_config(config: &StackyardConfig) -> Result<Self, AppError> {
		Ok(Self {
			builtins: builtin_vars(&config.socket_path()),
			env_file: EnvFile::load(&config.env_file())?,
			secrets: SecretsDir::load(&config.secrets_dir()),
			process: env::vars().collect(),
		})
	}

	/// The values of the environment file and of the secrets directory combined.
	///
	/// A key that is present in both sources (ignoring case) must have the same value in each,
	/// otherwise the credential store is considered inconsistent.
	pub fn persisted(&self) -> Result<VarMap, AppError> {
		let mut merged = self.env_file.vars.clone();

		for (key, value) in &self.secrets.vars {
			let duplicate = self
				.env_file
				.vars
				.iter()
				.find(|(env_key, _)| env_key.eq_ignore_ascii_case(key));

			if let Some((env_key, env_value)) = duplicate {
				if env_value != value {
					return Err(AppError::CredentialConflict { key: key.clone() });
				}

				warn!(
					"`{key}` is defined both in the secrets directory and in the environment file (as `{env_key}`)"
				);
			}

			merged.insert(key.clone(), value.clone());
		}

		Ok(merged)
	}

	/// The layers used before enrichment: built-ins, then persisted values, then the process.
	pub fn layered(&self) -> Result<VarMap, AppError> {
		let mut vars = self.builtins.clone();

		vars.extend(self.persisted()?);
		vars.extend(self.process.clone());

		Ok(vars)
	}
}

#[cfg(test)]
mod tests {
	use indexmap::indexmap;
	use pretty_assertions::assert_eq;
	use tempfile::tempdir;

	use super::*;
	use crate::fs::write_file;

	fn owned(map: IndexMap<&str, &str>) -> VarMap {
		map.into_iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn env_file_skips_comments_and_blank_lines() -> Result<(), Box<dyn std::error::Error>> {
		let dir = tempdir()?;
		let path = dir.path().join(".env");

		write_file(&path, "# comment\n\nFOO=bar\nQUOTED=\"a b\"\n")?;

		let env_file = EnvFile::load(&path)?;

		assert_eq!(env_file.vars, owned(indexmap! { "FOO" => "bar", "QUOTED" => "a b" }));

		Ok(())
	}

	#[test]
	fn missing_env_file_is_empty() -> Result<(), Box<dyn std::error::Error>> {
		let dir = tempdir()?;

		assert_eq!(EnvFile::load(&dir.path().join("missing"))?, EnvFile::default());

		Ok(())
	}

	#[test]
	fn secrets_dir_skips_hidden_files() -> Result<(), Box<dyn std::error::Error>> {
		let dir = tempdir()?;

		write_file(&dir.path().join("DB_PASSWORD"), "hunter2\n")?;
		write_file(&dir.path().join(".hidden"), "nope")?;
		std::fs::create_dir(dir.path().join("nested"))?;

		let secrets = SecretsDir::load(dir.path());

		assert_eq!(secrets.vars, owned(indexmap! { "DB_PASSWORD" => "hunter2" }));

		Ok(())
	}

	#[test]
	fn conflicting_values_are_fatal() {
		let sources = VariableSources {
			env_file: EnvFile {
				vars: owned(indexmap! { "db_password" => "one" }),
			},
			secrets: SecretsDir {
				vars: owned(indexmap! { "DB_PASSWORD" => "two" }),
			},
			..Default::default()
		};

		let error = sources.persisted().unwrap_err();

		assert!(error.is_fatal());
	}

	#[test]
	fn identical_values_are_merged() -> Result<(), AppError> {
		let sources = VariableSources {
			env_file: EnvFile {
				vars: owned(indexmap! { "TOKEN" => "abc", "TZ" => "UTC" }),
			},
			secrets: SecretsDir {
				vars: owned(indexmap! { "TOKEN" => "abc" }),
			},
			..Default::default()
		};

		assert_eq!(
			sources.persisted()?,
			owned(indexmap! { "TOKEN" => "abc", "TZ" => "UTC" })
		);

		Ok(())
	}

	#[test]
	fn process_environment_wins_when_layered() -> Result<(), AppError> {
		let sources = VariableSources {
			builtins: owned(indexmap! { "UID" => "1000" }),
			env_file: EnvFile {
				vars: owned(indexmap! { "TZ" => "UTC", "UID" => "0" }),
			},
			process: owned(indexmap! { "TZ" => "Europe/Rome" }),
			..Default::default()
		};

		let vars = sources.layered()?;

		assert_eq!(vars["TZ"], "Europe/Rome");
		assert_eq!(vars["UID"], "0");

		Ok(())
	}
}
