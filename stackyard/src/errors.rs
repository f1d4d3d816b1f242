use std::{io, path::PathBuf};

use docker_compose_config::ComposeError;
use thiserror::Error;

/// The kinds of errors that can occur during operations.
#[derive(Debug, Error)]
pub enum AppError {
	// I/O errors
	#[error("Could not create the dir `{path}`: {source}")]
	DirCreation { path: PathBuf, source: io::Error },

	#[error("Failed to create or write to the file `{path}`: {source}")]
	WriteError { path: PathBuf, source: io::Error },

	#[error("Could not read the contents of `{path}`: {source}")]
	ReadError { path: PathBuf, source: io::Error },

	#[error("Failed to remove `{path}`: {source}")]
	RemoveError { path: PathBuf, source: io::Error },

	// Serde errors
	#[error("Error while serializing the content for `{file:?}`: {error}")]
	SerializationError { file: PathBuf, error: String },

	#[error("Error while deserializing the contents of `{file:?}`: {error}")]
	DeserializationError { file: PathBuf, error: String },

	#[error(transparent)]
	Compose(#[from] ComposeError),

	// External commands
	#[error("Failed to launch `{program}`: {source}")]
	CommandSpawn { program: String, source: io::Error },

	#[error("`{program} {}` failed with exit code {code:?}{}", .args.join(" "), format_output(.output))]
	CommandFailed {
		program: String,
		args: Vec<String>,
		code: Option<i32>,
		output: String,
	},

	// Stacks
	#[error("Stack `{name}` not found")]
	StackNotFound { name: String },

	#[error(
		"Invalid stack name `{name}`. Names must start with a lowercase letter or digit and only contain lowercase letters, digits, `-` and `_`"
	)]
	InvalidStackName { name: String },

	/// Deployment-blocking: some placeholders could not be resolved.
	#[error("Refusing to deploy, the following variables are not set:\n{}", enumerate(.0))]
	UnresolvedVariables(Vec<String>),

	/// Fatal: the environment file and the secrets directory disagree on a value.
	#[error(
		"The key `{key}` has different values in the environment file and in the secrets directory. Resolve the conflict before continuing"
	)]
	CredentialConflict { key: String },

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl AppError {
	/// Errors that must stop the process instead of being reported and skipped.
	pub const fn is_fatal(&self) -> bool {
		matches!(self, Self::CredentialConflict { .. })
	}
}

fn enumerate(names: &[String]) -> String {
	names
		.iter()
		.enumerate()
		.map(|(i, name)| format!("  {}. {name}", i + 1))
		.collect::<Vec<_>>()
		.join("\n")
}

fn format_output(output: &str) -> String {
	let trimmed = output.trim();

	if trimmed.is_empty() {
		String::new()
	} else {
		format!(": {trimmed}")
	}
}
