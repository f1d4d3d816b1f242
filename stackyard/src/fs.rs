use std::{
	fs::{File, create_dir_all, read_to_string, remove_dir_all},
	io::Write,
	path::Path,
};

use docker_compose_config::{ComposeFile, to_canonical_yaml};
use serde::de::DeserializeOwned;

use crate::AppError;

pub fn read_text(path: &Path) -> Result<String, AppError> {
	read_to_string(path).map_err(|e| AppError::ReadError {
		path: path.to_path_buf(),
		source: e,
	})
}

pub fn deserialize_toml<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
	let contents = read_text(path)?;

	toml::from_str(&contents).map_err(|e| AppError::DeserializationError {
		file: path.to_path_buf(),
		error: e.to_string(),
	})
}

pub fn deserialize_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
	let file = read_file(path)?;

	serde_json::from_reader(file).map_err(|e| AppError::DeserializationError {
		file: path.to_path_buf(),
		error: e.to_string(),
	})
}

pub fn deserialize_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
	let file = read_file(path)?;

	serde_yaml_ng::from_reader(file).map_err(|e| AppError::DeserializationError {
		file: path.to_path_buf(),
		error: e.to_string(),
	})
}

/// Reads a compose document from disk.
pub fn read_compose(path: &Path) -> Result<ComposeFile, AppError> {
	let contents = read_text(path)?;

	ComposeFile::from_yaml(&contents).map_err(|e| AppError::DeserializationError {
		file: path.to_path_buf(),
		error: e.to_string(),
	})
}

/// Writes a compose document in its canonical form.
pub fn write_compose(path: &Path, doc: &ComposeFile) -> Result<(), AppError> {
	let content = to_canonical_yaml(doc).map_err(|e| AppError::SerializationError {
		file: path.to_path_buf(),
		error: e.to_string(),
	})?;

	write_file(path, &content)
}

pub fn read_file(path: &Path) -> Result<File, AppError> {
	File::open(path).map_err(|e| AppError::ReadError {
		path: path.to_path_buf(),
		source: e,
	})
}

pub fn write_file(path: &Path, content: &str) -> Result<(), AppError> {
	create_parent_dirs(path)?;

	let mut file = File::create(path).map_err(|e| AppError::WriteError {
		path: path.to_path_buf(),
		source: e,
	})?;

	file.write_all(content.as_bytes())
		.map_err(|e| AppError::WriteError {
			path: path.to_path_buf(),
			source: e,
		})
}

pub(crate) fn create_parent_dirs(path: &Path) -> Result<(), AppError> {
	match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => create_all_dirs(parent),
		_ => Ok(()),
	}
}

pub(crate) fn create_all_dirs(path: &Path) -> Result<(), AppError> {
	create_dir_all(path).map_err(|e| AppError::DirCreation {
		path: path.to_path_buf(),
		source: e,
	})
}

pub(crate) fn remove_all(path: &Path) -> Result<(), AppError> {
	remove_dir_all(path).map_err(|e| AppError::RemoveError {
		path: path.to_path_buf(),
		source: e,
	})
}

pub(crate) fn get_extension(path: &Path) -> Result<String, AppError> {
	path.extension()
		.map(|ext| ext.to_string_lossy().to_string())
		.ok_or_else(|| AppError::DeserializationError {
			file: path.to_path_buf(),
			error: "The file has no extension".to_string(),
		})
}
