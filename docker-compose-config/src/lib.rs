#![doc = "Typed, round-trippable model of the compose documents managed by stackyard."]

use indexmap::IndexMap;
#[cfg(feature = "schemars")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod emit;
pub mod normalize;
mod serde_utils;
mod service;

pub use emit::*;
pub use normalize::FieldShape;
pub use serde_utils::*;
pub use service::*;

/// The errors that can occur while reading or writing compose documents.
#[derive(Debug, Error)]
pub enum ComposeError {
	#[error("Could not parse the compose document: {0}")]
	Parse(#[source] serde_yaml_ng::Error),

	#[error("Could not serialize the compose document: {0}")]
	Serialize(#[source] serde_yaml_ng::Error),
}

/// Configuration settings for a Docker Compose file.
///
/// Top-level elements that are not modeled here (like `name` extensions or `x-` keys) are kept
/// in [`ComposeFile::extensions`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
pub struct ComposeFile {
	/// The project name to be used if you don't set one explicitly.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	/// Defines the services for the Compose application.
	///
	/// See more: https://docs.docker.com/reference/compose-file/services/
	#[serde(skip_serializing_if = "IndexMap::is_empty")]
	pub services: IndexMap<String, Service>,

	/// The named networks for the Compose application.
	///
	/// See more: https://docs.docker.com/reference/compose-file/networks/
	#[serde(skip_serializing_if = "IndexMap::is_empty")]
	pub networks: IndexMap<String, Option<TopLevelNetwork>>,

	/// The named volumes for the Compose application.
	///
	/// See more: https://docs.docker.com/reference/compose-file/volumes/
	#[serde(skip_serializing_if = "IndexMap::is_empty")]
	pub volumes: IndexMap<String, Option<TopLevelVolume>>,

	/// Defines or references configuration data that is granted to services in your Compose application.
	///
	/// See more: https://docs.docker.com/reference/compose-file/configs/
	#[serde(skip_serializing_if = "IndexMap::is_empty")]
	pub configs: IndexMap<String, TopLevelConfig>,

	/// The named secrets for the Compose application.
	///
	/// See more: https://docs.docker.com/reference/compose-file/secrets/
	#[serde(skip_serializing_if = "IndexMap::is_empty")]
	pub secrets: IndexMap<String, TopLevelSecret>,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}

impl ComposeFile {
	pub fn new() -> Self {
		Default::default()
	}

	/// Parses a compose document. An empty document yields an empty [`ComposeFile`].
	pub fn from_yaml(content: &str) -> Result<Self, ComposeError> {
		if content.trim().is_empty() {
			return Ok(Self::default());
		}

		serde_yaml_ng::from_str(content).map_err(ComposeError::Parse)
	}
}

/// Network configuration for the Compose application.
///
/// See more: https://docs.docker.com/reference/compose-file/networks/
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
pub struct TopLevelNetwork {
	/// If set to true, this network's lifecycle is maintained outside of that of the application.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub external: Option<bool>,

	/// Custom name for this network.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	/// Specifies which driver should be used for this network.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub driver: Option<String>,

	/// A list of options as key-value pairs to pass to the driver.
	#[serde(skip_serializing_if = "IndexMap::is_empty")]
	pub driver_opts: IndexMap<String, Option<SingleValue>>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub labels: Option<ListOrMap>,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}

impl TopLevelNetwork {
	pub fn external() -> Self {
		Self {
			external: Some(true),
			..Default::default()
		}
	}
}

/// Volume configuration for the Compose application.
///
/// See more: https://docs.docker.com/reference/compose-file/volumes/
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
pub struct TopLevelVolume {
	/// If set to true, this volume already exists on the platform and its lifecycle is managed outside of that of the application.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub external: Option<bool>,

	/// Sets a custom name for a volume.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	/// Specifies which volume driver should be used.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub driver: Option<String>,

	/// Specifies a list of options as key-value pairs to pass to the driver for this volume.
	#[serde(skip_serializing_if = "IndexMap::is_empty")]
	pub driver_opts: IndexMap<String, Option<SingleValue>>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub labels: Option<ListOrMap>,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}

impl TopLevelVolume {
	pub fn external() -> Self {
		Self {
			external: Some(true),
			..Default::default()
		}
	}
}

/// Defines or references configuration data that is granted to services in your Compose application.
///
/// See more: https://docs.docker.com/reference/compose-file/configs/
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
pub struct TopLevelConfig {
	/// The name of the config object in the container engine to look up.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	/// If set to true, external specifies that this config has already been created.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub external: Option<bool>,

	/// The content is created with the inlined value.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,

	/// The config content is created with the value of an environment variable.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub environment: Option<String>,

	/// The config is created with the contents of the file at the specified path.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file: Option<String>,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}

/// Secret configuration for the Compose application.
///
/// See more: https://docs.docker.com/reference/compose-file/secrets/
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
pub struct TopLevelSecret {
	/// The name of the secret in the container engine.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	/// The secret is created with the value of an environment variable.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub environment: Option<String>,

	/// The secret is created with the contents of the file at the specified path.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file: Option<String>,

	/// Specifies that this secret already exists and was created outside of Compose.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub external: Option<bool>,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}

impl TopLevelSecret {
	/// A secret whose value is read from the environment variable with the same name.
	pub fn from_environment(name: &str) -> Self {
		Self {
			name: Some(name.to_string()),
			environment: Some(name.to_string()),
			..Default::default()
		}
	}
}
