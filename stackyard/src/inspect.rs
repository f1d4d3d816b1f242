//! The subset of the engine's container inspection format that stackyard reads and synthesizes.
//!
//! Unknown fields in the engine's output are ignored. Fields that are absent get their zero value.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The timestamp used by the engine for events that did not happen yet.
pub const ZERO_TIMESTAMP: &str = "0001-01-01T00:00:00Z";

pub const PROJECT_LABEL: &str = "com.docker.compose.project";
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
pub const ONEOFF_LABEL: &str = "com.docker.compose.oneoff";

/// A snapshot of the configuration and state of a container.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct InspectionRecord {
	pub id: String,
	pub created: String,
	pub path: String,
	pub args: Vec<String>,
	pub state: ContainerState,
	pub image: String,
	pub name: String,
	pub restart_count: i64,
	pub host_config: HostConfig,
	pub mounts: Vec<MountPoint>,
	pub config: ContainerConfig,
	pub network_settings: NetworkSettings,
}

impl InspectionRecord {
	/// The container name without the leading slash.
	pub fn container_name(&self) -> &str {
		self.name.trim_start_matches('/')
	}

	pub fn project(&self) -> Option<&str> {
		self.config.labels.get(PROJECT_LABEL).map(String::as_str)
	}

	pub fn service(&self) -> Option<&str> {
		self.config.labels.get(SERVICE_LABEL).map(String::as_str)
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerState {
	pub status: String,
	pub running: bool,
	pub paused: bool,
	pub restarting: bool,
	#[serde(rename = "OOMKilled")]
	pub oom_killed: bool,
	pub dead: bool,
	pub pid: i64,
	pub exit_code: i64,
	pub error: String,
	pub started_at: String,
	pub finished_at: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostConfig {
	pub binds: Option<Vec<String>>,
	pub network_mode: String,
	pub port_bindings: IndexMap<String, Option<Vec<PortBinding>>>,
	pub restart_policy: RestartPolicy,
	pub memory: i64,
	pub nano_cpus: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortBinding {
	pub host_ip: String,
	pub host_port: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct RestartPolicy {
	pub name: String,
	pub maximum_retry_count: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct MountPoint {
	#[serde(rename = "Type")]
	pub kind: String,
	pub name: String,
	pub source: String,
	pub destination: String,
	pub driver: String,
	pub mode: String,
	#[serde(rename = "RW")]
	pub rw: bool,
	pub propagation: String,
}

/// The engine serializes sets as objects with empty values.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmptyObject {}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfig {
	pub hostname: String,
	pub domainname: String,
	pub user: String,
	pub exposed_ports: IndexMap<String, EmptyObject>,
	pub env: Vec<String>,
	pub cmd: Option<Vec<String>>,
	pub image: String,
	pub working_dir: String,
	pub entrypoint: Option<Vec<String>>,
	pub labels: IndexMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkSettings {
	#[serde(rename = "IPAddress")]
	pub ip_address: String,
	pub ports: IndexMap<String, Option<Vec<PortBinding>>>,
	pub networks: IndexMap<String, EndpointSettings>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct EndpointSettings {
	pub aliases: Option<Vec<String>>,
	#[serde(rename = "NetworkID")]
	pub network_id: String,
	#[serde(rename = "EndpointID")]
	pub endpoint_id: String,
	pub gateway: String,
	#[serde(rename = "IPAddress")]
	pub ip_address: String,
	pub mac_address: String,
}

/// A named deployment unit and its containers, real or simulated.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stack {
	pub name: String,
	pub containers: Vec<InspectionRecord>,
}

/// Parses the output of a batched inspect call.
pub fn parse_inspection(output: &str) -> Result<Vec<InspectionRecord>, serde_json::Error> {
	serde_json::from_str(output)
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn engine_output_is_parsed() {
		let records = parse_inspection(indoc! {r#"
			[
			  {
			    "Id": "4f1c",
			    "Name": "/web",
			    "Image": "sha256:abc",
			    "State": { "Status": "running", "Running": true, "Pid": 4242, "OOMKilled": false },
			    "HostConfig": { "Binds": null, "RestartPolicy": { "Name": "always" } },
			    "Config": {
			      "Image": "nginx:1.27",
			      "Labels": { "com.docker.compose.project": "site", "com.docker.compose.service": "web" },
			      "ExposedPorts": { "80/tcp": {} }
			    },
			    "NetworkSettings": { "Networks": { "site_default": { "IPAddress": "172.18.0.2" } } },
			    "GraphDriver": { "Name": "overlay2" }
			  }
			]
		"#})
		.unwrap();

		let web = &records[0];

		assert_eq!(web.container_name(), "web");
		assert_eq!(web.project(), Some("site"));
		assert_eq!(web.service(), Some("web"));
		assert!(web.state.running);
		assert_eq!(web.state.pid, 4242);
		assert_eq!(web.host_config.binds, None);
		assert_eq!(web.config.exposed_ports.keys().collect::<Vec<_>>(), vec!["80/tcp"]);
		assert_eq!(web.network_settings.networks["site_default"].ip_address, "172.18.0.2");
	}
}
