use std::cmp::Ordering;

use indexmap::IndexMap;
#[cfg(feature = "schemars")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ListOrMap, SingleValue, StringOrList, StringOrNum};

/// Defines a service for a Compose application.
///
/// Only the attributes that stackyard reads or rewrites are typed. Everything else is collected
/// in [`Service::extensions`] and written back untouched.
///
/// See more: https://docs.docker.com/reference/compose-file/services/
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
pub struct Service {
	/// Specifies the image to start the container from.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub image: Option<String>,

	/// A string that specifies a custom container name, rather than a name generated by default.
	///
	/// container_name follows the regex format of [a-zA-Z0-9][a-zA-Z0-9_.-]+
	#[serde(skip_serializing_if = "Option::is_none")]
	pub container_name: Option<String>,

	/// A custom host name to use for the service container.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hostname: Option<String>,

	/// Overrides the user used to run the container process.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user: Option<String>,

	/// Defines the policy that the platform applies on container termination.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub restart: Option<String>,

	/// Overrides the default command declared by the container image.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub command: Option<StringOrList>,

	/// Overrides the default entrypoint declared by the container image.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub entrypoint: Option<StringOrList>,

	/// Defines environment variables set in the container. environment can use either an array or a map.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub environment: Option<ListOrMap>,

	/// Adds metadata to containers. You can use either an array or a map.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub labels: Option<ListOrMap>,

	/// The networks that service containers are attached to.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub networks: Option<ServiceNetworks>,

	/// Port mappings between the host and the container.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub ports: Vec<Port>,

	/// Mount host paths or named volumes.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub volumes: Vec<ServiceVolume>,

	/// Configs granted to the service.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub configs: Vec<ServiceConfigOrSecret>,

	/// Secrets granted to the service.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub secrets: Vec<ServiceConfigOrSecret>,

	/// Memory limit for the container.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mem_limit: Option<StringOrNum>,

	/// The number of (potentially virtual) CPUs to allocate to the service container.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cpus: Option<SingleValue>,

	/// Kernel parameters to set in the container.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sysctls: Option<ListOrMap>,

	/// Defines the logging configuration.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub logging: Option<LoggingSettings>,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}

impl Service {
	/// The name under which the container for this service can be found.
	pub fn container_name_or<'a>(&'a self, service_name: &'a str) -> &'a str {
		self.container_name.as_deref().unwrap_or(service_name)
	}

	pub fn has_secret(&self, name: &str) -> bool {
		self.secrets.iter().any(|s| s.source() == name)
	}
}

/// Defines the logging configuration.
///
/// See more: https://docs.docker.com/engine/logging/configure/
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
pub struct LoggingSettings {
	/// Logging driver to use, such as 'json-file', 'syslog', 'journald', etc.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub driver: Option<String>,

	/// Options for the logging driver.
	#[serde(skip_serializing_if = "IndexMap::is_empty")]
	pub options: IndexMap<String, Option<SingleValue>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum Port {
	Num(u64),
	String(String),
	Data(PortSettings),
	Other(Value),
}

/// Settings for a port mapping.
///
/// See more: https://docs.docker.com/reference/compose-file/services/#long-syntax-4
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
pub struct PortSettings {
	/// A human-readable name for this port mapping.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	/// The host IP to bind to.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub host_ip: Option<String>,

	/// The port inside the container.
	pub target: StringOrNum,

	/// The publicly exposed port.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub published: Option<StringOrNum>,

	/// The port protocol (tcp or udp).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub protocol: Option<String>,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}

/// A port mapping broken into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortMapping {
	pub host_ip: Option<String>,
	pub host_port: Option<String>,
	pub container_port: String,
	pub protocol: String,
}

impl PortMapping {
	/// The first port of the container side, which is the whole value unless it is a range.
	pub fn container_port_number(&self) -> Option<u16> {
		self.container_port
			.split('-')
			.next()
			.and_then(|p| p.trim().parse().ok())
	}
}

impl Port {
	/// Splits the short (`[ip:][host:]container[/proto]`) or the long syntax into its parts.
	pub fn mapping(&self) -> Option<PortMapping> {
		match self {
			Self::Num(n) => Some(PortMapping {
				host_ip: None,
				host_port: None,
				container_port: n.to_string(),
				protocol: "tcp".to_string(),
			}),
			Self::String(s) => {
				let (ports, protocol) = match s.rsplit_once('/') {
					Some((ports, proto)) => (ports, proto.to_string()),
					None => (s.as_str(), "tcp".to_string()),
				};

				// IPv6 host addresses are wrapped in brackets and contain colons themselves
				let (host_ip, rest) = if let Some(stripped) = ports.strip_prefix('[') {
					let (ip, rest) = stripped.split_once("]:")?;
					(Some(ip.to_string()), rest)
				} else {
					(None, ports)
				};

				let parts: Vec<&str> = rest.split(':').collect();

				let (host_ip, host_port, container_port) = match parts.as_slice() {
					[container] => (host_ip, None, *container),
					[host, container] => (host_ip, Some(host.to_string()), *container),
					[ip, host, container] => (
						Some(ip.to_string()),
						(!host.is_empty()).then(|| host.to_string()),
						*container,
					),
					_ => return None,
				};

				if container_port.is_empty() {
					return None;
				}

				Some(PortMapping {
					host_ip,
					host_port,
					container_port: container_port.to_string(),
					protocol,
				})
			}
			Self::Data(settings) => Some(PortMapping {
				host_ip: settings.host_ip.clone(),
				host_port: settings.published.as_ref().map(ToString::to_string),
				container_port: settings.target.to_string(),
				protocol: settings
					.protocol
					.clone()
					.unwrap_or_else(|| "tcp".to_string()),
			}),
			Self::Other(_) => None,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum ServiceVolume {
	Simple(String),
	Advanced(ServiceVolumeSettings),
	Other(Value),
}

/// The mount type.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
	/// For mounting host directories.
	Bind,

	/// For cluster volumes.
	Cluster,

	/// For named pipes.
	Npipe,

	/// For mounting from an image.
	Image,

	/// For temporary filesystems.
	Tmpfs,

	/// For named volumes.
	Volume,
}

/// Configuration for a service volume.
///
/// See more: https://docs.docker.com/reference/compose-file/services/#long-syntax-6
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
pub struct ServiceVolumeSettings {
	/// The mount type.
	#[serde(rename = "type")]
	pub type_: VolumeType,

	/// Flag to set the volume as read-only.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub read_only: Option<bool>,

	/// The source of the mount: a host path for a bind mount, or the name of a volume defined in the top-level volumes key.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,

	/// The path in the container where the volume is mounted.
	pub target: String,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}

/// A volume mount broken into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountSpec {
	pub kind: MountKind,
	pub source: Option<String>,
	pub target: String,
	pub read_only: bool,
	pub mode: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountKind {
	Bind,
	Volume,
	Tmpfs,
	Other,
}

/// Returns true for sources that refer to the host filesystem rather than to a named volume.
pub fn is_path_source(source: &str) -> bool {
	source.starts_with('/')
		|| source.starts_with('.')
		|| source.starts_with('~')
		|| source.starts_with('$')
}

impl ServiceVolume {
	pub fn mount(&self) -> Option<MountSpec> {
		match self {
			Self::Simple(s) => {
				let parts: Vec<&str> = s.splitn(3, ':').collect();

				match parts.as_slice() {
					[target] => Some(MountSpec {
						kind: MountKind::Volume,
						source: None,
						target: (*target).to_string(),
						read_only: false,
						mode: None,
					}),
					[source, target, rest @ ..] => {
						let mode = rest.first().map(|m| (*m).to_string());
						let read_only = mode
							.as_deref()
							.is_some_and(|m| m.split(',').any(|o| o == "ro"));

						Some(MountSpec {
							kind: if is_path_source(source) {
								MountKind::Bind
							} else {
								MountKind::Volume
							},
							source: Some((*source).to_string()),
							target: (*target).to_string(),
							read_only,
							mode,
						})
					}
					[] => None,
				}
			}
			Self::Advanced(settings) => Some(MountSpec {
				kind: match settings.type_ {
					VolumeType::Bind => MountKind::Bind,
					VolumeType::Volume => MountKind::Volume,
					VolumeType::Tmpfs => MountKind::Tmpfs,
					_ => MountKind::Other,
				},
				source: settings.source.clone(),
				target: settings.target.clone(),
				read_only: settings.read_only.unwrap_or_default(),
				mode: None,
			}),
			Self::Other(_) => None,
		}
	}

	/// The name of the named volume used by this mount, if any.
	pub fn named_volume(&self) -> Option<String> {
		self.mount()
			.filter(|m| m.kind == MountKind::Volume)
			.and_then(|m| m.source)
			.filter(|s| !s.is_empty() && !is_path_source(s))
	}
}

/// Configuration for service configs or secrets, defining how they are mounted in the container.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum ServiceConfigOrSecret {
	/// Name of the config or secret to grant access to.
	String(String),
	/// Detailed configuration for a config or secret.
	Advanced(ServiceConfigOrSecretSettings),
}

impl ServiceConfigOrSecret {
	pub fn source(&self) -> &str {
		match self {
			Self::String(name) => name,
			Self::Advanced(settings) => &settings.source,
		}
	}
}

impl PartialOrd for ServiceConfigOrSecretSettings {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ServiceConfigOrSecretSettings {
	fn cmp(&self, other: &Self) -> Ordering {
		self.source.cmp(&other.source)
	}
}

/// Configuration for service configs or secrets, defining how they are mounted in the container.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
pub struct ServiceConfigOrSecretSettings {
	/// Name of the config or secret as defined in the top-level configs or secrets section.
	pub source: String,

	/// Path in the container where the config or secret will be mounted. Defaults to /<source> for configs and /run/secrets/<source> for secrets.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target: Option<String>,

	/// UID of the file in the container. Default is 0 (root).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub uid: Option<String>,

	/// GID of the file in the container. Default is 0 (root).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gid: Option<String>,

	/// File permission mode inside the container, in octal. Default is 0444 for configs and 0400 for secrets.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mode: Option<StringOrNum>,
}

/// The networks attribute of a service.
///
/// The compose specification only allows a list or a map, but a bare string is tolerated too.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum ServiceNetworks {
	Single(String),
	List(Vec<NetworkEntry>),
	Map(IndexMap<String, Option<ServiceNetworkSettings>>),
	Other(Value),
}

/// An item of the list form of `networks`, which is usually just a name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum NetworkEntry {
	Name(String),
	Inline(IndexMap<String, Option<ServiceNetworkSettings>>),
}

impl NetworkEntry {
	pub fn names(&self) -> Vec<&str> {
		match self {
			Self::Name(name) => vec![name.as_str()],
			Self::Inline(map) => map.keys().map(String::as_str).collect(),
		}
	}
}

/// Per-network settings of a service.
///
/// See more: https://docs.docker.com/reference/compose-file/services/#networks
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(default)]
pub struct ServiceNetworkSettings {
	/// Alternative hostnames for this service on the network.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub aliases: Vec<String>,

	/// Specify a static IPv4 address for this service on this network.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ipv4_address: Option<String>,

	/// Specify a static IPv6 address for this service on this network.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ipv6_address: Option<String>,

	#[serde(flatten)]
	pub extensions: IndexMap<String, Value>,
}
