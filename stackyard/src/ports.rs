use std::sync::LazyLock;

use docker_compose_config::{Port, Service, split_key_value};
use regex::Regex;

/// Ports that are commonly used by web servers.
pub const COMMON_WEB_PORTS: [u16; 9] = [80, 443, 8080, 8443, 3000, 5000, 8000, 8888, 9000];

static NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static PORT_SETTING: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?im)^\s*[A-Za-z0-9_.-]*(?:port|listen)[A-Za-z0-9_.-]*\s*[:=]\s*[^\d\n]*(\d{1,5})")
		.unwrap()
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
	Http,
	Https,
}

impl Scheme {
	pub const fn for_port(port: u16) -> Self {
		match port {
			443 | 8443 => Self::Https,
			_ => Self::Http,
		}
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Http => "http",
			Self::Https => "https",
		}
	}
}

/// The port that a service most likely serves http(s) on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpEndpoint {
	pub port: u16,
	pub scheme: Scheme,
}

impl HttpEndpoint {
	const fn new(port: u16) -> Self {
		Self {
			port,
			scheme: Scheme::for_port(port),
		}
	}
}

/// Guesses the http(s) port of a service.
///
/// The evidence is checked in this order, and the first match wins:
///
/// 1. A label with `port` in its key whose value contains one of the [`COMMON_WEB_PORTS`].
/// 2. The container side of the first port mapping, whatever its value.
/// 3. An environment variable with `PORT` in its key and a positive integer as its value.
pub fn detect_http_endpoint(service: &Service) -> Option<HttpEndpoint> {
	port_from_labels(service)
		.or_else(|| port_from_mappings(service))
		.or_else(|| port_from_environment(service))
		.map(HttpEndpoint::new)
}

fn port_from_labels(service: &Service) -> Option<u16> {
	service
		.label_map()
		.iter()
		.filter(|(key, _)| key.to_ascii_lowercase().contains("port"))
		.find_map(|(_, value)| {
			NUMBERS
				.find_iter(value)
				.filter_map(|m| m.as_str().parse::<u16>().ok())
				.find(|port| COMMON_WEB_PORTS.contains(port))
		})
}

fn port_from_mappings(service: &Service) -> Option<u16> {
	service
		.ports
		.first()
		.and_then(Port::mapping)
		.and_then(|mapping| mapping.container_port_number())
}

fn port_from_environment(service: &Service) -> Option<u16> {
	service.env_entries().iter().find_map(|entry| {
		let (key, value) = split_key_value(entry);

		if !key.to_ascii_uppercase().contains("PORT") {
			return None;
		}

		value
			.and_then(|v| v.trim().parse::<u16>().ok())
			.filter(|port| *port > 0)
	})
}

/// Ports below 1024 need elevated privileges to be bound on most hosts.
pub const fn is_privileged_port(port: u16) -> bool {
	port < 1024
}

/// Finds the ports mentioned in the settings of a configuration file, like `listen = 8080` or
/// `port: 443`.
pub fn scan_config_ports(content: &str) -> Vec<u16> {
	let mut ports: Vec<u16> = PORT_SETTING
		.captures_iter(content)
		.filter_map(|caps| caps[1].parse().ok())
		.filter(|port| *port > 0)
		.collect();

	ports.dedup();

	ports
}
