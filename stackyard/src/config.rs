use std::{
	env,
	fs::exists,
	path::{Path, PathBuf},
};

use clap::Args;
use merge::Merge;
#[cfg(feature = "schemars")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
	AppError,
	fs::{deserialize_json, deserialize_toml, deserialize_yaml, get_extension},
};
#[cfg(feature = "schemars")]
use crate::fs::write_file;

const DEFAULT_CONFIG_NAMES: [&str; 4] = [
	"stackyard.yaml",
	"stackyard.yml",
	"stackyard.toml",
	"stackyard.json",
];

pub(crate) fn overwrite_option<T>(left: &mut Option<T>, right: Option<T>) {
	if let Some(new) = right {
		*left = Some(new)
	}
}

/// The global configuration for stackyard.
///
/// Every field is optional so that config files and cli flags can be layered on top of each
/// other. The getters return the effective value, falling back to the defaults.
#[derive(Args, Clone, Debug, Deserialize, Serialize, Merge, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
#[serde(deny_unknown_fields)]
#[merge(strategy = overwrite_option)]
pub struct StackyardConfig {
	/// The directory where stacks are stored [default: `/opt/stackyard/stacks`].
	#[arg(long, env = "STACKYARD_STACKS_DIR", value_name = "DIR")]
	pub stacks_dir: Option<PathBuf>,

	/// The persisted environment file [default: `/opt/stackyard/.env`].
	#[arg(long, env = "STACKYARD_ENV_FILE", value_name = "FILE")]
	pub env_file: Option<PathBuf>,

	/// The directory containing one file per secret [default: `/opt/stackyard/secrets`].
	#[arg(long, env = "STACKYARD_SECRETS_DIR", value_name = "DIR")]
	pub secrets_dir: Option<PathBuf>,

	/// The program used to generate and store secrets [default: `stackyard-vault`].
	#[arg(long, env = "STACKYARD_SECRET_TOOL", value_name = "PROGRAM")]
	pub secret_tool: Option<String>,

	/// The container engine cli [default: `docker`].
	#[arg(long, env = "STACKYARD_ENGINE", value_name = "PROGRAM")]
	pub engine: Option<String>,

	/// The network that every service gets attached to [default: `stackyard`].
	#[arg(long, env = "STACKYARD_SHARED_NETWORK", value_name = "NAME")]
	pub shared_network: Option<String>,

	/// The domain used in the routing rules of the reverse proxy [default: `localhost`].
	#[arg(long, env = "STACKYARD_PROXY_DOMAIN", value_name = "DOMAIN")]
	pub proxy_domain: Option<String>,

	/// The path to the engine's socket [default: detected from `DOCKER_HOST`, or `/var/run/docker.sock`].
	#[arg(long, env = "STACKYARD_SOCKET_PATH", value_name = "PATH")]
	pub socket_path: Option<PathBuf>,

	/// The memory limit for services that do not define one [default: `512m`].
	#[arg(long, env = "STACKYARD_DEFAULT_MEM_LIMIT", value_name = "LIMIT")]
	pub default_mem_limit: Option<String>,

	/// The cpu limit for services that do not define one [default: `1.0`].
	#[arg(long, env = "STACKYARD_DEFAULT_CPUS", value_name = "CPUS")]
	pub default_cpus: Option<f64>,
}

impl StackyardConfig {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn stacks_dir(&self) -> PathBuf {
		self.stacks_dir
			.clone()
			.unwrap_or_else(|| PathBuf::from("/opt/stackyard/stacks"))
	}

	pub fn env_file(&self) -> PathBuf {
		self.env_file
			.clone()
			.unwrap_or_else(|| PathBuf::from("/opt/stackyard/.env"))
	}

	pub fn secrets_dir(&self) -> PathBuf {
		self.secrets_dir
			.clone()
			.unwrap_or_else(|| PathBuf::from("/opt/stackyard/secrets"))
	}

	pub fn secret_tool(&self) -> &str {
		self.secret_tool.as_deref().unwrap_or("stackyard-vault")
	}

	pub fn engine(&self) -> &str {
		self.engine.as_deref().unwrap_or("docker")
	}

	pub fn shared_network(&self) -> &str {
		self.shared_network.as_deref().unwrap_or("stackyard")
	}

	pub fn proxy_domain(&self) -> &str {
		self.proxy_domain.as_deref().unwrap_or("localhost")
	}

	pub fn default_mem_limit(&self) -> &str {
		self.default_mem_limit.as_deref().unwrap_or("512m")
	}

	pub fn default_cpus(&self) -> f64 {
		self.default_cpus.unwrap_or(1.0)
	}

	/// The socket path, either explicitly set or detected from the environment.
	pub fn socket_path(&self) -> PathBuf {
		self.socket_path
			.clone()
			.unwrap_or_else(|| detect_socket_path(env::var("DOCKER_HOST").ok().as_deref()))
	}

	/// Extracts a config from a yaml, toml or json file.
	pub fn from_file(path: &Path) -> Result<Self, AppError> {
		let extension = get_extension(path)?;

		match extension.as_str() {
			"yaml" | "yml" => deserialize_yaml(path),
			"toml" => deserialize_toml(path),
			"json" => deserialize_json(path),
			_ => Err(AppError::DeserializationError {
				file: path.to_path_buf(),
				error: format!(
					"Invalid config format for `{}`. Allowed formats are: yaml, toml, json",
					path.display()
				),
			}),
		}
	}

	/// Builds the config from the defaults, an optional config file and the cli overrides, in
	/// this order of priority.
	pub fn load(config_file: Option<&Path>, overrides: Self) -> Result<Self, AppError> {
		let mut config = Self::default();

		let config_file = config_file
			.map(Path::to_path_buf)
			.or_else(get_config_path_from_defaults);

		if let Some(path) = config_file {
			config.merge(Self::from_file(&path)?);
		}

		config.merge(overrides);

		Ok(config)
	}
}

#[cfg(feature = "schemars")]
impl StackyardConfig {
	/// Writes the json schema of the config file to the given path.
	pub fn generate_json_schema(output: &Path) -> Result<(), AppError> {
		let schema = schemars::schema_for!(Self);

		let content =
			serde_json::to_string_pretty(&schema).map_err(|e| AppError::SerializationError {
				file: output.to_path_buf(),
				error: e.to_string(),
			})?;

		write_file(output, &content)
	}
}

fn detect_socket_path(docker_host: Option<&str>) -> PathBuf {
	if let Some(host) = docker_host
		&& let Some(path) = host.strip_prefix("unix://")
		&& !path.is_empty()
	{
		return PathBuf::from(path);
	}

	PathBuf::from("/var/run/docker.sock")
}

fn get_config_path_from_defaults() -> Option<PathBuf> {
	for name in DEFAULT_CONFIG_NAMES {
		if exists(name).is_ok_and(|exists| exists) {
			return Some(PathBuf::from(name));
		}
	}

	// Try xdg path if nothing else was found
	get_config_from_xdg()
}

fn get_config_from_xdg() -> Option<PathBuf> {
	let xdg_config = if let Ok(env_val) = env::var("XDG_CONFIG_HOME") {
		Some(PathBuf::from(env_val))
	} else {
		env::home_dir().map(|home| home.join(".config"))
	};

	let config_dir = xdg_config?.join("stackyard");

	if !config_dir.is_dir() {
		return None;
	}

	DEFAULT_CONFIG_NAMES
		.iter()
		.map(|name| config_dir.join(name))
		.find(|path| exists(path).is_ok_and(|exists| exists))
}
