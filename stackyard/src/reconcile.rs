use std::collections::HashMap;

use docker_compose_config::{ComposeFile, MountKind, Service, SingleValue, StringOrNum};
use indexmap::IndexMap;
use tracing::debug;

use crate::inspect::*;

/// Combines the live containers with the stacks that are stored but not deployed.
///
/// `live` maps each compose project to the inspection records of its containers. Every declared
/// stack without live containers gets one simulated record per service, unless a container with
/// the service's name already exists, in which case its real record is used.
///
/// The stacks are sorted by name.
pub fn reconcile(
	live: &IndexMap<String, Vec<InspectionRecord>>,
	declared: &IndexMap<String, ComposeFile>,
) -> Vec<Stack> {
	let by_name: HashMap<&str, &InspectionRecord> = live
		.values()
		.flatten()
		.map(|record| (record.container_name(), record))
		.collect();

	let mut stacks: Vec<Stack> = declared
		.iter()
		.filter(|(name, _)| !live.contains_key(*name))
		.map(|(stack_name, doc)| Stack {
			name: stack_name.clone(),
			containers: doc
				.services
				.iter()
				.map(|(service_name, service)| {
					let container_name = service.container_name_or(service_name);

					match by_name.get(container_name) {
						Some(record) => (*record).clone(),
						None => {
							debug!("Simulating the container of `{stack_name}/{service_name}`");
							simulate_record(stack_name, service_name, service)
						}
					}
				})
				.collect(),
		})
		.collect();

	stacks.extend(live.iter().map(|(name, records)| Stack {
		name: name.clone(),
		containers: records.clone(),
	}));

	stacks.sort_by(|a, b| a.name.cmp(&b.name));

	stacks
}

/// Builds the record that the engine would report for a service whose container was created
/// but never started.
pub fn simulate_record(stack_name: &str, service_name: &str, service: &Service) -> InspectionRecord {
	let container_name = service.container_name_or(service_name);

	let mut labels: IndexMap<String, String> = IndexMap::new();
	labels.insert(PROJECT_LABEL.to_string(), stack_name.to_string());
	labels.insert(SERVICE_LABEL.to_string(), service_name.to_string());
	labels.insert(ONEOFF_LABEL.to_string(), "False".to_string());
	labels.extend(service.label_map());

	let mut mounts = Vec::new();
	let mut binds = Vec::new();

	for mount in service.volumes.iter().filter_map(|v| v.mount()) {
		let mode = mount.mode.clone().unwrap_or_default();

		let point = match mount.kind {
			MountKind::Bind => {
				let source = mount.source.clone().unwrap_or_default();

				binds.push(if mode.is_empty() {
					format!("{source}:{}", mount.target)
				} else {
					format!("{source}:{}:{mode}", mount.target)
				});

				MountPoint {
					kind: "bind".to_string(),
					source,
					mode,
					propagation: "rprivate".to_string(),
					..Default::default()
				}
			}
			MountKind::Volume => MountPoint {
				kind: "volume".to_string(),
				name: mount.source.clone().unwrap_or_default(),
				driver: "local".to_string(),
				mode,
				..Default::default()
			},
			MountKind::Tmpfs => MountPoint {
				kind: "tmpfs".to_string(),
				..Default::default()
			},
			MountKind::Other => continue,
		};

		mounts.push(MountPoint {
			destination: mount.target.clone(),
			rw: !mount.read_only,
			..point
		});
	}

	let mut exposed_ports = IndexMap::new();
	let mut port_bindings: IndexMap<String, Option<Vec<PortBinding>>> = IndexMap::new();

	for mapping in service.ports.iter().filter_map(|p| p.mapping()) {
		let key = format!("{}/{}", mapping.container_port, mapping.protocol);

		exposed_ports.insert(key.clone(), EmptyObject {});

		if let Some(host_port) = mapping.host_port {
			port_bindings
				.entry(key)
				.or_insert_with(|| Some(Vec::new()))
				.get_or_insert_default()
				.push(PortBinding {
					host_ip: mapping.host_ip.unwrap_or_default(),
					host_port,
				});
		}
	}

	let networks: IndexMap<String, EndpointSettings> = service
		.network_names()
		.into_iter()
		.map(|name| (name, EndpointSettings::default()))
		.collect();

	let command = service.command_tokens();
	let entrypoint = docker_compose_config::normalize::command_to_canonical(service.entrypoint.as_ref());
	let image = service.image.clone().unwrap_or_default();

	InspectionRecord {
		id: String::new(),
		created: ZERO_TIMESTAMP.to_string(),
		path: entrypoint
			.first()
			.or_else(|| command.first())
			.cloned()
			.unwrap_or_default(),
		args: Vec::new(),
		state: ContainerState {
			status: "created".to_string(),
			started_at: ZERO_TIMESTAMP.to_string(),
			finished_at: ZERO_TIMESTAMP.to_string(),
			..Default::default()
		},
		image: image.clone(),
		name: format!("/{container_name}"),
		restart_count: 0,
		host_config: HostConfig {
			binds: (!binds.is_empty()).then_some(binds),
			network_mode: networks
				.keys()
				.next()
				.cloned()
				.unwrap_or_else(|| "default".to_string()),
			port_bindings: port_bindings.clone(),
			restart_policy: RestartPolicy {
				name: service.restart.clone().unwrap_or_else(|| "no".to_string()),
				maximum_retry_count: 0,
			},
			memory: service.mem_limit.as_ref().and_then(memory_bytes).unwrap_or(0),
			nano_cpus: service.cpus.as_ref().and_then(nano_cpus).unwrap_or(0),
		},
		mounts,
		config: ContainerConfig {
			hostname: service.hostname.clone().unwrap_or_default(),
			user: service.user.clone().unwrap_or_default(),
			exposed_ports,
			env: service.env_entries(),
			cmd: (!command.is_empty()).then_some(command),
			image,
			entrypoint: (!entrypoint.is_empty()).then_some(entrypoint),
			labels,
			..Default::default()
		},
		network_settings: NetworkSettings {
			ports: port_bindings,
			networks,
			..Default::default()
		},
	}
}

/// Converts a memory limit like `512m` or `1g` into bytes.
#[allow(clippy::cast_possible_truncation)]
pub fn memory_bytes(limit: &StringOrNum) -> Option<i64> {
	let text = match limit {
		StringOrNum::Num(bytes) => return Some(*bytes),
		StringOrNum::String(text) => text.trim().to_ascii_lowercase(),
	};

	let text = text.strip_suffix('b').unwrap_or(&text);

	let (digits, multiplier) = match text.char_indices().last()? {
		(i, 'k') => (&text[..i], 1 << 10),
		(i, 'm') => (&text[..i], 1 << 20),
		(i, 'g') => (&text[..i], 1 << 30),
		_ => (text, 1),
	};

	let value: f64 = digits.trim().parse().ok()?;

	Some((value * f64::from(multiplier)) as i64)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn nano_cpus(cpus: &SingleValue) -> Option<i64> {
	let value = match cpus {
		SingleValue::Float(f) => *f,
		SingleValue::Int(i) => *i as f64,
		SingleValue::String(s) => s.trim().parse().ok()?,
		SingleValue::Bool(_) => return None,
	};

	Some((value * 1e9) as i64)
}
