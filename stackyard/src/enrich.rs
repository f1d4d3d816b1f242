//! The passes that add infrastructure concerns to a user-authored compose document.
//!
//! Every pass is idempotent: running the pipeline on its own output changes nothing. Passes only
//! touch the in-memory document. Operations on the secret store are queued in the
//! [`EnrichmentReport`] and applied by the caller.

use docker_compose_config::ComposeFile;
use tracing::debug;

use crate::{StackyardConfig, secrets::SecretOp};

mod passes;
pub use passes::*;

/// A single step of the pipeline.
pub trait EnrichmentPass {
	fn name(&self) -> &'static str;

	/// Applies the pass and returns whether the document changed.
	fn apply(&self, doc: &mut ComposeFile, report: &mut EnrichmentReport) -> bool;
}

/// What the pipeline did to a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
	/// The operations to perform on the secret store, in order.
	pub secret_ops: Vec<SecretOp>,
	/// The passes that changed the document.
	pub changed_by: Vec<&'static str>,
}

impl EnrichmentReport {
	pub(crate) fn queue(&mut self, op: SecretOp) {
		if !self.secret_ops.contains(&op) {
			self.secret_ops.push(op);
		}
	}

	pub fn is_noop(&self) -> bool {
		self.secret_ops.is_empty() && self.changed_by.is_empty()
	}
}

/// The values that the passes are parameterized with.
#[derive(Clone, Debug, PartialEq)]
pub struct EnrichmentSettings {
	pub shared_network: String,
	pub proxy_domain: String,
	pub default_mem_limit: String,
	pub default_cpus: f64,
}

impl EnrichmentSettings {
	pub fn from_config(config: &StackyardConfig) -> Self {
		Self {
			shared_network: config.shared_network().to_string(),
			proxy_domain: config.proxy_domain().to_string(),
			default_mem_limit: config.default_mem_limit().to_string(),
			default_cpus: config.default_cpus(),
		}
	}
}

/// The ordered enrichment pipeline.
pub struct Enricher {
	passes: Vec<Box<dyn EnrichmentPass>>,
}

impl Enricher {
	pub fn new(settings: &EnrichmentSettings) -> Self {
		Self {
			passes: vec![
				Box::new(SecretDeclarations),
				Box::new(ContainerNames),
				Box::new(ResourceDefaults {
					mem_limit: settings.default_mem_limit.clone(),
					cpus: settings.default_cpus,
				}),
				Box::new(SharedNetwork {
					name: settings.shared_network.clone(),
				}),
				Box::new(UndeclaredResources),
				Box::new(PasswordSanitization),
				Box::new(ProxyLabels {
					domain: settings.proxy_domain.clone(),
				}),
			],
		}
	}

	/// Only removes plaintext credentials, which is what the stored original goes through.
	pub fn sanitizer() -> Self {
		Self {
			passes: vec![Box::new(PasswordSanitization)],
		}
	}

	pub fn pass_names(&self) -> Vec<&'static str> {
		self.passes.iter().map(|p| p.name()).collect()
	}

	pub fn run(&self, doc: &mut ComposeFile) -> EnrichmentReport {
		let mut report = EnrichmentReport::default();

		for pass in &self.passes {
			if pass.apply(doc, &mut report) {
				debug!("The `{}` pass changed the document", pass.name());
				report.changed_by.push(pass.name());
			}
		}

		report
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn passes_run_in_order() {
		let settings = EnrichmentSettings {
			shared_network: "stackyard".to_string(),
			proxy_domain: "localhost".to_string(),
			default_mem_limit: "512m".to_string(),
			default_cpus: 1.0,
		};

		assert_eq!(
			Enricher::new(&settings).pass_names(),
			vec![
				"secrets",
				"naming",
				"resources",
				"network",
				"backfill",
				"sanitization",
				"proxy"
			]
		);
		assert_eq!(Enricher::sanitizer().pass_names(), vec!["sanitization"]);
	}
}
