use std::{future::Future, sync::LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::{
	AppError,
	exec::{Invocation, run_captured},
};

/// The directory where the container engine mounts secrets.
pub const SECRETS_MOUNT_DIR: &str = "/run/secrets/";

const SENSITIVE_KEYWORDS: [&str; 8] = [
	"PASSWD", "PASSWORD", "SECRET", "KEY", "TOKEN", "API_KEY", "APIKEY", "PRIVATE",
];

const ALREADY_EXISTS: &str = "already exists";

static PLACEHOLDER_ONLY: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^(?:\$\{[A-Za-z_][A-Za-z0-9_]*\}|\$[A-Za-z_][A-Za-z0-9_]*)$").unwrap()
});

static SECRET_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^/run/secrets/(?:\$\{([A-Za-z0-9_.-]+)\}|([A-Za-z0-9_.-]+))$").unwrap()
});

/// Whether a variable or environment key looks like it holds a credential.
///
/// Keys ending in `_FILE` point to a file containing the credential and are not sensitive.
pub fn is_sensitive_key(key: &str) -> bool {
	let upper = key.to_ascii_uppercase();

	!upper.ends_with("_FILE") && SENSITIVE_KEYWORDS.iter().any(|word| upper.contains(word))
}

/// Whether an environment entry holds a plaintext credential that should be moved to the
/// secret store.
pub fn holds_plaintext_secret(key: &str, value: &str) -> bool {
	is_sensitive_key(key)
		&& !value.is_empty()
		&& !value.starts_with(SECRETS_MOUNT_DIR)
		&& !PLACEHOLDER_ONLY.is_match(value)
}

/// The name under which a credential is kept in the secret store.
///
/// `db-password` and `DB__PASSWORD` both become `DB_PASSWORD`.
pub fn normalize_secret_key(key: &str) -> String {
	let mut normalized = String::with_capacity(key.len());

	for c in key.chars() {
		if c.is_ascii_alphanumeric() {
			normalized.push(c.to_ascii_uppercase());
		} else if !normalized.ends_with('_') {
			normalized.push('_');
		}
	}

	normalized.trim_matches('_').to_string()
}

/// Extracts the secret name from a value like `/run/secrets/NAME` or `/run/secrets/${NAME}`.
pub fn secret_reference(value: &str) -> Option<&str> {
	let captures = SECRET_REFERENCE.captures(value)?;

	captures
		.get(1)
		.or_else(|| captures.get(2))
		.map(|m| m.as_str())
}

/// The canonical `/run/secrets/NAME` form of a secret reference. Secret paths are never
/// expanded, since the name is not a variable.
pub fn canonical_secret_path(value: &str) -> Option<String> {
	secret_reference(value).map(|name| format!("{SECRETS_MOUNT_DIR}{name}"))
}

/// An operation on the secret store, queued during enrichment and applied afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretOp {
	/// Generate a random value for the key, unless it already exists.
	Generate(String),
	/// Store the given value under the key, unless it already exists.
	Store { name: String, value: String },
}

impl SecretOp {
	pub fn name(&self) -> &str {
		match self {
			Self::Generate(name) => name,
			Self::Store { name, .. } => name,
		}
	}
}

/// A place where secret values are generated and stored.
///
/// Both operations must be idempotent: acting on a key that already exists succeeds without
/// changing its value.
pub trait SecretStore {
	fn generate(&self, name: &str) -> impl Future<Output = Result<(), AppError>> + Send;

	fn store(&self, name: &str, value: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Applies the queued operations. Failures are reported and skipped.
pub async fn apply_secret_ops<S: SecretStore>(store: &S, ops: &[SecretOp]) {
	for op in ops {
		let result = match op {
			SecretOp::Generate(name) => store.generate(name).await,
			SecretOp::Store { name, value } => store.store(name, value).await,
		};

		match result {
			Ok(()) => debug!("Applied the secret operation for `{}`", op.name()),
			Err(e) => warn!(
				"Could not update the secret `{}`, it must be set manually: {e}",
				op.name()
			),
		}
	}
}

/// The external secret store cli, invoked as `<tool> gen NAME` and `<tool> ins NAME`.
#[derive(Clone, Debug)]
pub struct SecretTool {
	pub program: String,
}

impl SecretTool {
	pub fn new(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
		}
	}

	async fn run(&self, verb: &str, name: &str, input: Option<&str>) -> Result<(), AppError> {
		let mut invocation = Invocation::new(&self.program, vec![verb.to_string(), name.to_string()]);

		if let Some(input) = input {
			invocation = invocation.with_stdin(input);
		}

		let output = run_captured(&invocation).await?;
		let combined = output.combined();

		if output.success() {
			info!("Secret `{name}` updated");
			Ok(())
		} else if combined.contains(ALREADY_EXISTS) {
			debug!("Secret `{name}` already exists");
			Ok(())
		} else {
			Err(AppError::CommandFailed {
				program: self.program.clone(),
				args: vec![verb.to_string(), name.to_string()],
				code: output.status.code(),
				output: combined,
			})
		}
	}
}

impl SecretStore for SecretTool {
	async fn generate(&self, name: &str) -> Result<(), AppError> {
		self.run("gen", name, None).await
	}

	async fn store(&self, name: &str, value: &str) -> Result<(), AppError> {
		self.run("ins", name, Some(value)).await
	}
}
