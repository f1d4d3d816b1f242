use std::{
	fs::read_dir,
	path::{Path, PathBuf},
	sync::LazyLock,
};

use docker_compose_config::ComposeFile;
use indexmap::IndexMap;
use regex::Regex;
use tracing::{info, warn};

use crate::{
	AppError,
	fs::{read_compose, remove_all, write_compose},
};

pub const ORIGINAL_FILE: &str = "compose.yaml";
pub const EFFECTIVE_FILE: &str = "compose.effective.yaml";

static STACK_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").unwrap());

/// The directory where every stack keeps its original and effective documents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackStore {
	pub root: PathBuf,
}

impl StackStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn validate_name(name: &str) -> Result<(), AppError> {
		if STACK_NAME.is_match(name) {
			Ok(())
		} else {
			Err(AppError::InvalidStackName {
				name: name.to_string(),
			})
		}
	}

	pub fn stack_dir(&self, name: &str) -> PathBuf {
		self.root.join(name)
	}

	/// The document as written by the user, minus plaintext credentials.
	pub fn original_path(&self, name: &str) -> PathBuf {
		self.stack_dir(name).join(ORIGINAL_FILE)
	}

	/// The enriched document that gets deployed.
	pub fn effective_path(&self, name: &str) -> PathBuf {
		self.stack_dir(name).join(EFFECTIVE_FILE)
	}

	pub fn exists(&self, name: &str) -> bool {
		self.original_path(name).is_file()
	}

	pub fn write(
		&self,
		name: &str,
		original: &ComposeFile,
		effective: &ComposeFile,
	) -> Result<(), AppError> {
		Self::validate_name(name)?;

		write_compose(&self.original_path(name), original)?;
		write_compose(&self.effective_path(name), effective)?;

		info!("Saved the stack `{name}` in `{}`", self.stack_dir(name).display());

		Ok(())
	}

	fn load(&self, name: &str, path: &Path) -> Result<ComposeFile, AppError> {
		Self::validate_name(name)?;

		if !path.is_file() {
			return Err(AppError::StackNotFound {
				name: name.to_string(),
			});
		}

		read_compose(path)
	}

	pub fn load_original(&self, name: &str) -> Result<ComposeFile, AppError> {
		self.load(name, &self.original_path(name))
	}

	pub fn load_effective(&self, name: &str) -> Result<ComposeFile, AppError> {
		self.load(name, &self.effective_path(name))
	}

	/// The names of the stored stacks, sorted.
	pub fn names(&self) -> Result<Vec<String>, AppError> {
		if !self.root.is_dir() {
			return Ok(Vec::new());
		}

		let entries = read_dir(&self.root).map_err(|e| AppError::ReadError {
			path: self.root.clone(),
			source: e,
		})?;

		let mut names: Vec<String> = entries
			.flatten()
			.filter(|entry| entry.path().join(ORIGINAL_FILE).is_file())
			.filter_map(|entry| entry.file_name().to_str().map(str::to_string))
			.filter(|name| STACK_NAME.is_match(name))
			.collect();

		names.sort();

		Ok(names)
	}

	/// Reads the original document of every stored stack.
	///
	/// Documents that cannot be parsed are reported and skipped.
	pub fn load_declared(&self) -> Result<IndexMap<String, ComposeFile>, AppError> {
		let mut declared = IndexMap::new();

		for name in self.names()? {
			match self.load_original(&name) {
				Ok(doc) => {
					declared.insert(name, doc);
				}
				Err(e) => warn!("Skipping the stack `{name}`: {e}"),
			}
		}

		Ok(declared)
	}

	pub fn remove(&self, name: &str) -> Result<(), AppError> {
		Self::validate_name(name)?;

		let dir = self.stack_dir(name);

		if !dir.is_dir() {
			return Err(AppError::StackNotFound {
				name: name.to_string(),
			});
		}

		remove_all(&dir)?;

		info!("Removed the stack `{name}`");

		Ok(())
	}
}
