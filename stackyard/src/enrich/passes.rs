use std::collections::BTreeSet;

use docker_compose_config::{
	ComposeFile, ServiceConfigOrSecret, SingleValue, StringOrNum, TopLevelNetwork, TopLevelSecret,
	TopLevelVolume, split_key_value,
};
use tracing::{debug, info};

use super::{EnrichmentPass, EnrichmentReport};
use crate::{
	ports::{detect_http_endpoint, is_privileged_port, scan_config_ports},
	secrets::{
		SECRETS_MOUNT_DIR, SecretOp, holds_plaintext_secret, normalize_secret_key, secret_reference,
	},
};

/// Declares the secrets that services reference through `/run/secrets/NAME` values.
pub struct SecretDeclarations;

impl EnrichmentPass for SecretDeclarations {
	fn name(&self) -> &'static str {
		"secrets"
	}

	fn apply(&self, doc: &mut ComposeFile, report: &mut EnrichmentReport) -> bool {
		let mut changed = false;
		let mut required: BTreeSet<String> = BTreeSet::new();

		for (service_name, service) in &mut doc.services {
			let mut referenced: Vec<String> = Vec::new();

			// `/run/secrets/${NAME}` becomes `/run/secrets/NAME`
			changed |= service.edit_environment(service_name, |entries| {
				for entry in entries.iter_mut() {
					let (key, Some(value)) = split_key_value(entry) else {
						continue;
					};

					let Some(name) = secret_reference(value) else {
						continue;
					};

					let canonical = format!("{key}={SECRETS_MOUNT_DIR}{name}");

					referenced.push(name.to_string());

					*entry = canonical;
				}
			});

			for name in referenced {
				if !service.has_secret(&name) {
					debug!("Granting the secret `{name}` to `{service_name}`");
					service.secrets.push(ServiceConfigOrSecret::String(name.clone()));
					changed = true;
				}

				required.insert(name);
			}
		}

		for name in required {
			match doc.secrets.get_mut(&name) {
				None => {
					info!("Declaring the secret `{name}`");
					doc.secrets
						.insert(name.clone(), TopLevelSecret::from_environment(&name));
					report.queue(SecretOp::Generate(name));
					changed = true;
				}
				Some(declaration) => {
					// File-based and external secrets are managed elsewhere
					if declaration.file.is_some() || declaration.external == Some(true) {
						continue;
					}

					if declaration.name.is_none() {
						declaration.name = Some(name.clone());
						changed = true;
					}

					if declaration.environment.is_none() {
						declaration.environment = Some(name.clone());
						changed = true;
					}
				}
			}
		}

		changed
	}
}

/// Gives every service an explicit container name, which defaults to the service's key.
pub struct ContainerNames;

impl EnrichmentPass for ContainerNames {
	fn name(&self) -> &'static str {
		"naming"
	}

	fn apply(&self, doc: &mut ComposeFile, _: &mut EnrichmentReport) -> bool {
		let mut changed = false;

		for (service_name, service) in &mut doc.services {
			if service.container_name.as_deref().is_none_or(str::is_empty) {
				service.container_name = Some(service_name.clone());
				changed = true;
			}
		}

		changed
	}
}

/// Sets the memory and cpu limits of the services that do not define them.
pub struct ResourceDefaults {
	pub mem_limit: String,
	pub cpus: f64,
}

impl EnrichmentPass for ResourceDefaults {
	fn name(&self) -> &'static str {
		"resources"
	}

	fn apply(&self, doc: &mut ComposeFile, _: &mut EnrichmentReport) -> bool {
		let mut changed = false;

		for service in doc.services.values_mut() {
			if service.mem_limit.is_none() {
				service.mem_limit = Some(StringOrNum::String(self.mem_limit.clone()));
				changed = true;
			}

			if service
				.cpus
				.as_ref()
				.is_none_or(SingleValue::is_empty_string)
			{
				service.cpus = Some(SingleValue::Float(self.cpus));
				changed = true;
			}
		}

		changed
	}
}

/// Attaches every service to the shared network.
pub struct SharedNetwork {
	pub name: String,
}

impl EnrichmentPass for SharedNetwork {
	fn name(&self) -> &'static str {
		"network"
	}

	fn apply(&self, doc: &mut ComposeFile, _: &mut EnrichmentReport) -> bool {
		let mut changed = false;

		for (service_name, service) in &mut doc.services {
			changed |= service.ensure_network(service_name, &self.name);
		}

		changed
	}
}

/// Declares the networks and named volumes that services use without declaring them, as
/// external resources.
pub struct UndeclaredResources;

// The implicit project network never needs a declaration
const DEFAULT_NETWORK: &str = "default";

impl EnrichmentPass for UndeclaredResources {
	fn name(&self) -> &'static str {
		"backfill"
	}

	fn apply(&self, doc: &mut ComposeFile, _: &mut EnrichmentReport) -> bool {
		let mut networks: BTreeSet<String> = BTreeSet::new();
		let mut volumes: BTreeSet<String> = BTreeSet::new();

		for service in doc.services.values() {
			networks.extend(service.network_names());
			volumes.extend(service.volumes.iter().filter_map(|v| v.named_volume()));
		}

		let mut changed = false;

		for network in networks {
			if network != DEFAULT_NETWORK && !doc.networks.contains_key(&network) {
				debug!("Declaring the external network `{network}`");
				doc.networks
					.insert(network, Some(TopLevelNetwork::external()));
				changed = true;
			}
		}

		for volume in volumes {
			if !doc.volumes.contains_key(&volume) {
				debug!("Declaring the external volume `{volume}`");
				doc.volumes
					.insert(volume, Some(TopLevelVolume::external()));
				changed = true;
			}
		}

		changed
	}
}

/// Moves plaintext credentials out of the environment and into the secret store, leaving a
/// placeholder that is resolved at deploy time.
pub struct PasswordSanitization;

impl EnrichmentPass for PasswordSanitization {
	fn name(&self) -> &'static str {
		"sanitization"
	}

	fn apply(&self, doc: &mut ComposeFile, report: &mut EnrichmentReport) -> bool {
		let mut changed = false;

		for (service_name, service) in &mut doc.services {
			changed |= service.edit_environment(service_name, |entries| {
				for entry in entries.iter_mut() {
					let (key, Some(value)) = split_key_value(entry) else {
						continue;
					};

					if !holds_plaintext_secret(key, value) {
						continue;
					}

					let normalized = normalize_secret_key(key);

					if normalized.is_empty() {
						continue;
					}

					info!("Moving the value of `{key}` in `{service_name}` to the secret store");

					report.queue(SecretOp::Store {
						name: normalized.clone(),
						value: value.to_string(),
					});

					*entry = format!("{key}=${{{normalized}}}");
				}
			});
		}

		changed
	}
}

/// Adds the reverse proxy routing labels to services that seem to serve http(s).
pub struct ProxyLabels {
	pub domain: String,
}

impl ProxyLabels {
	fn log_diagnostics(doc: &ComposeFile, service_name: &str, port: u16) {
		if is_privileged_port(port) {
			debug!("`{service_name}` serves on the privileged port {port}");
		}

		let Some(service) = doc.services.get(service_name) else {
			return;
		};

		for config in &service.configs {
			if let Some(content) = doc
				.configs
				.get(config.source())
				.and_then(|c| c.content.as_deref())
			{
				let ports = scan_config_ports(content);

				if !ports.is_empty() && !ports.contains(&port) {
					debug!(
						"The config `{}` of `{service_name}` mentions the ports {ports:?}, but {port} was detected",
						config.source()
					);
				}
			}
		}
	}
}

impl EnrichmentPass for ProxyLabels {
	fn name(&self) -> &'static str {
		"proxy"
	}

	fn apply(&self, doc: &mut ComposeFile, _: &mut EnrichmentReport) -> bool {
		let mut changed = false;

		let endpoints: Vec<_> = doc
			.services
			.iter()
			.filter_map(|(name, service)| detect_http_endpoint(service).map(|e| (name.clone(), e)))
			.collect();

		for (service_name, endpoint) in endpoints {
			Self::log_diagnostics(doc, &service_name, endpoint.port);

			let Some(service) = doc.services.get_mut(&service_name) else {
				continue;
			};

			let labels = [
				(
					format!("traefik.http.routers.{service_name}.rule"),
					format!("Host(`{service_name}.{}`)", self.domain),
				),
				(
					format!("traefik.http.services.{service_name}.loadbalancer.server.port"),
					endpoint.port.to_string(),
				),
				(
					format!("traefik.http.routers.{service_name}.entrypoints"),
					endpoint.scheme.as_str().to_string(),
				),
			];

			changed |= service.edit_labels(&service_name, |map| {
				for (key, value) in labels {
					map.entry(key).or_insert(value);
				}
			});
		}

		changed
	}
}

#[cfg(test)]
mod tests {
	use docker_compose_config::{ListOrMap, ServiceNetworks};
	use indoc::indoc;
	use pretty_assertions::assert_eq;

	use super::*;

	fn parse(yaml: &str) -> ComposeFile {
		ComposeFile::from_yaml(yaml).unwrap()
	}

	#[test]
	fn explicit_container_names_are_kept() {
		let mut doc = parse(indoc! {"
			services:
			  web:
			    container_name: frontend
			  db: {}
		"});

		assert!(ContainerNames.apply(&mut doc, &mut EnrichmentReport::default()));
		assert_eq!(doc.services["web"].container_name.as_deref(), Some("frontend"));
		assert_eq!(doc.services["db"].container_name.as_deref(), Some("db"));
	}

	#[test]
	fn resource_defaults_respect_existing_values() {
		let mut doc = parse(indoc! {r#"
			services:
			  a:
			    cpus: ""
			  b:
			    cpus: 0.5
			    mem_limit: 1g
		"#});

		let pass = ResourceDefaults {
			mem_limit: "512m".to_string(),
			cpus: 1.0,
		};

		pass.apply(&mut doc, &mut EnrichmentReport::default());

		assert_eq!(doc.services["a"].cpus, Some(SingleValue::Float(1.0)));
		assert_eq!(
			doc.services["a"].mem_limit,
			Some(StringOrNum::String("512m".to_string()))
		);
		assert_eq!(doc.services["b"].cpus, Some(SingleValue::Float(0.5)));
		assert_eq!(
			doc.services["b"].mem_limit,
			Some(StringOrNum::String("1g".to_string()))
		);
	}

	#[test]
	fn shared_network_is_added_to_every_shape() {
		let mut doc = parse(indoc! {"
			services:
			  none: {}
			  list:
			    networks: [backend, {frontend: {aliases: [web]}}]
			  map:
			    networks:
			      backend:
			  joined:
			    networks: [stackyard]
		"});

		let pass = SharedNetwork {
			name: "stackyard".to_string(),
		};

		assert!(pass.apply(&mut doc, &mut EnrichmentReport::default()));

		assert_eq!(doc.services["none"].network_names(), vec!["stackyard"]);
		assert_eq!(
			doc.services["list"].network_names(),
			vec!["backend", "frontend", "stackyard"]
		);
		assert!(matches!(
			&doc.services["map"].networks,
			Some(ServiceNetworks::Map(map)) if map.get("stackyard") == Some(&None)
		));
		assert_eq!(doc.services["joined"].network_names(), vec!["stackyard"]);

		assert!(!pass.apply(&mut doc, &mut EnrichmentReport::default()));
	}

	#[test]
	fn only_named_volumes_are_backfilled() {
		let mut doc = parse(indoc! {"
			services:
			  app:
			    volumes:
			      - data:/data
			      - ./config:/config
			      - /srv/logs:/logs
			    networks: [default, proxy]
			volumes:
			  declared: {}
		"});

		UndeclaredResources.apply(&mut doc, &mut EnrichmentReport::default());

		assert_eq!(doc.volumes.keys().collect::<Vec<_>>(), vec!["declared", "data"]);
		assert_eq!(doc.volumes["data"], Some(TopLevelVolume::external()));
		assert_eq!(doc.networks.keys().collect::<Vec<_>>(), vec!["proxy"]);
	}

	#[test]
	fn secrets_are_declared_once() {
		let mut doc = parse(indoc! {"
			services:
			  a:
			    environment:
			      - TOKEN_FILE=/run/secrets/MY_TOKEN
			  b:
			    environment:
			      TOKEN_FILE: /run/secrets/MY_TOKEN
			  c:
			    environment:
			      TOKEN_FILE: /run/secrets/${MY_TOKEN}
			    secrets: [MY_TOKEN]
		"});

		let mut report = EnrichmentReport::default();

		assert!(SecretDeclarations.apply(&mut doc, &mut report));

		for service in doc.services.values() {
			assert_eq!(
				service
					.secrets
					.iter()
					.filter(|s| s.source() == "MY_TOKEN")
					.count(),
				1
			);
		}

		assert_eq!(doc.secrets.len(), 1);
		assert_eq!(doc.secrets["MY_TOKEN"], TopLevelSecret::from_environment("MY_TOKEN"));
		assert_eq!(report.secret_ops, vec![SecretOp::Generate("MY_TOKEN".to_string())]);

		let mut second = EnrichmentReport::default();

		assert!(!SecretDeclarations.apply(&mut doc, &mut second));
		assert!(second.secret_ops.is_empty());
	}

	#[test]
	fn file_based_secrets_are_left_alone() {
		let mut doc = parse(indoc! {"
			services:
			  a:
			    environment:
			      - KEY_FILE=/run/secrets/tls_key
			secrets:
			  tls_key:
			    file: ./tls.key
		"});

		let mut report = EnrichmentReport::default();

		SecretDeclarations.apply(&mut doc, &mut report);

		assert_eq!(doc.secrets["tls_key"].environment, None);
		assert!(report.secret_ops.is_empty());
	}

	#[test]
	fn plaintext_passwords_are_replaced() {
		let mut doc = parse(indoc! {"
			services:
			  db:
			    environment:
			      db-password: secret
			      DB_PASSWORD_FILE: /run/secrets/db
			      API_KEY: /run/secrets/api_key
			      TZ: UTC
		"});

		let mut report = EnrichmentReport::default();

		assert!(PasswordSanitization.apply(&mut doc, &mut report));

		assert_eq!(
			doc.services["db"].env_entries(),
			vec![
				"db-password=${DB_PASSWORD}",
				"DB_PASSWORD_FILE=/run/secrets/db",
				"API_KEY=/run/secrets/api_key",
				"TZ=UTC",
			]
		);
		assert_eq!(
			report.secret_ops,
			vec![SecretOp::Store {
				name: "DB_PASSWORD".to_string(),
				value: "secret".to_string(),
			}]
		);
		assert!(matches!(doc.services["db"].environment, Some(ListOrMap::Map(_))));
	}

	#[test]
	fn proxy_labels_do_not_override_existing_ones() {
		let mut doc = parse(indoc! {r#"
			services:
			  app:
			    ports: ["8443:8443"]
			    labels:
			      - traefik.http.routers.app.rule=Host(`custom.example.com`)
		"#});

		let pass = ProxyLabels {
			domain: "home.arpa".to_string(),
		};

		assert!(pass.apply(&mut doc, &mut EnrichmentReport::default()));

		let labels = doc.services["app"].label_map();

		assert_eq!(
			labels["traefik.http.routers.app.rule"],
			"Host(`custom.example.com`)"
		);
		assert_eq!(
			labels["traefik.http.services.app.loadbalancer.server.port"],
			"8443"
		);
		assert_eq!(labels["traefik.http.routers.app.entrypoints"], "https");
		assert!(matches!(doc.services["app"].labels, Some(ListOrMap::List(_))));

		assert!(!pass.apply(&mut doc, &mut EnrichmentReport::default()));
	}
}
