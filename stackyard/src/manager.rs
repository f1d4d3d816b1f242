use docker_compose_config::{ComposeFile, to_canonical_yaml};
use tracing::{info, warn};

use crate::{
	AppError, StackyardConfig,
	engine::{ComposeAction, ContainerEngine, Engine},
	enrich::{Enricher, EnrichmentSettings},
	inspect::Stack,
	reconcile::reconcile,
	resolver::{expand_pre_deploy, resolve_for_deploy},
	secrets::{SecretOp, SecretStore, SecretTool, apply_secret_ops},
	store::StackStore,
	variables::{VarMap, VariableSources},
};

/// The outcome of saving a stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedStack {
	/// The sanitized document, as it is stored.
	pub original: String,
	/// The enriched document.
	pub effective: String,
	/// The operations that were sent to the secret store.
	pub secret_ops: Vec<SecretOp>,
	/// Whether the documents were written to disk.
	pub written: bool,
}

/// The values exported to the engine for the secrets that read them from its environment.
///
/// Returns the exports and the names of the variables that have no value.
pub fn secret_exports(doc: &ComposeFile, persisted: &VarMap) -> (VarMap, Vec<String>) {
	let mut exports = VarMap::new();
	let mut missing = Vec::new();

	for secret in doc.secrets.values() {
		if secret.external == Some(true) || secret.file.is_some() {
			continue;
		}

		let Some(var) = &secret.environment else {
			continue;
		};

		match persisted.get(var) {
			Some(value) => {
				exports.insert(var.clone(), value.clone());
			}
			None => missing.push(var.clone()),
		}
	}

	missing.sort();
	missing.dedup();

	(exports, missing)
}

/// Stores, renders, deploys and lists stacks.
pub struct StackManager<E, S> {
	pub store: StackStore,
	pub engine: E,
	pub secrets: S,
	config: StackyardConfig,
	settings: EnrichmentSettings,
	sources: Option<VariableSources>,
}

impl StackManager<Engine, SecretTool> {
	/// A manager that uses the engine and the secret tool named in the config.
	pub fn from_config(config: StackyardConfig) -> Self {
		let engine = Engine::new(config.engine());
		let secrets = SecretTool::new(config.secret_tool());

		Self::new(config, engine, secrets)
	}
}

impl<E: ContainerEngine, S: SecretStore> StackManager<E, S> {
	pub fn new(config: StackyardConfig, engine: E, secrets: S) -> Self {
		Self {
			store: StackStore::new(config.stacks_dir()),
			settings: EnrichmentSettings::from_config(&config),
			config,
			engine,
			secrets,
			sources: None,
		}
	}

	/// Uses fixed variable sources instead of reading them for every operation.
	#[must_use]
	pub fn with_sources(mut self, sources: VariableSources) -> Self {
		self.sources = Some(sources);
		self
	}

	pub const fn config(&self) -> &StackyardConfig {
		&self.config
	}

	// Read again for every operation, since saving a stack can add secrets.
	fn sources(&self) -> Result<VariableSources, AppError> {
		match &self.sources {
			Some(sources) => Ok(sources.clone()),
			None => VariableSources::from_config(&self.config),
		}
	}

	/// Sanitizes and enriches a document, then stores both versions.
	///
	/// A dry run skips writing and storing plaintext credentials, but missing secrets are
	/// still generated.
	pub async fn save(&self, name: &str, raw: &str, dry_run: bool) -> Result<SavedStack, AppError> {
		StackStore::validate_name(name)?;

		let mut doc = ComposeFile::from_yaml(raw)?;

		let vars = self.sources()?.layered()?;

		expand_pre_deploy(&mut doc, &vars);

		let mut original = doc.clone();
		let sanitized = Enricher::sanitizer().run(&mut original);

		let mut effective = doc;
		let enriched = Enricher::new(&self.settings).run(&mut effective);

		let mut secret_ops = sanitized.secret_ops;

		for op in enriched.secret_ops {
			if !secret_ops.contains(&op) {
				secret_ops.push(op);
			}
		}

		if dry_run {
			secret_ops.retain(|op| matches!(op, SecretOp::Generate(_)));
		}

		apply_secret_ops(&self.secrets, &secret_ops).await;

		let saved = SavedStack {
			original: to_canonical_yaml(&original)?,
			effective: to_canonical_yaml(&effective)?,
			secret_ops,
			written: !dry_run,
		};

		if !dry_run {
			self.store.write(name, &original, &effective)?;
		}

		Ok(saved)
	}

	/// The effective document with every placeholder resolved.
	pub fn resolve(&self, name: &str) -> Result<ComposeFile, AppError> {
		let effective = self.store.load_effective(name)?;

		resolve_for_deploy(&effective, &self.sources()?)
	}

	/// The deploy-ready document, in canonical form.
	pub fn render(&self, name: &str) -> Result<String, AppError> {
		Ok(to_canonical_yaml(&self.resolve(name)?)?)
	}

	/// Runs a compose action on a stored stack.
	///
	/// Actions that create containers are refused while any variable is unresolved, and the
	/// engine is not called. This only holds for `up` and `create`: `down`, `stop`, `start` and
	/// `rm` still call the engine with the unresolved document (after a warning), so that a
	/// stack can always be taken down.
	pub async fn deploy(&self, name: &str, action: ComposeAction) -> Result<(), AppError> {
		let effective = self.store.load_effective(name)?;
		let sources = self.sources()?;

		let doc = match resolve_for_deploy(&effective, &sources) {
			Ok(doc) => doc,
			Err(AppError::UnresolvedVariables(missing)) if !action.creates_containers() => {
				warn!(
					"Running `{action}` on `{name}` with unresolved variables: {}",
					missing.join(", ")
				);
				effective
			}
			Err(e) => return Err(e),
		};

		let (envs, missing) = secret_exports(&doc, &sources.persisted()?);

		if action.creates_containers() {
			if !missing.is_empty() {
				return Err(AppError::UnresolvedVariables(missing));
			}

			self.engine.ensure_resources(&doc).await?;
		}

		let document = to_canonical_yaml(&doc)?;

		self.engine
			.compose(name, action, &document, &envs)
			.await?;

		info!("`{action}` completed for the stack `{name}`");

		Ok(())
	}

	/// Every stack, with the records of its containers, real or simulated.
	pub async fn list(&self) -> Result<Vec<Stack>, AppError> {
		let live = self.engine.live_stacks().await?;
		let declared = self.store.load_declared()?;

		Ok(reconcile(&live, &declared))
	}

	/// Removes the stored documents of a stack. Its containers are left alone.
	pub fn delete(&self, name: &str) -> Result<(), AppError> {
		self.store.remove(name)
	}
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn environment_secrets_are_exported() {
		let doc = ComposeFile::from_yaml(indoc! {"
			secrets:
			  DB_PASSWORD:
			    environment: DB_PASSWORD
			  API_TOKEN:
			    environment: API_TOKEN
			  cert:
			    file: ./cert.pem
			  shared:
			    external: true
		"})
		.unwrap();

		let persisted = VarMap::from([("DB_PASSWORD".to_string(), "hunter2".to_string())]);

		let (exports, missing) = secret_exports(&doc, &persisted);

		assert_eq!(exports, persisted);
		assert_eq!(missing, vec!["API_TOKEN".to_string()]);
	}
}
