use std::{fmt::Display, future::Future};

use anyhow::Context;
use docker_compose_config::{ComposeFile, SingleValue};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::{
	AppError,
	exec::{Invocation, OutputStream, run_captured, run_checked, stream_command},
	inspect::{InspectionRecord, PROJECT_LABEL, parse_inspection},
	variables::VarMap,
};

/// The compose subcommands that stackyard drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComposeAction {
	Up,
	Down,
	Stop,
	Start,
	Create,
	Remove,
}

impl ComposeAction {
	pub const fn args(self) -> &'static [&'static str] {
		match self {
			Self::Up => &["up", "-d", "--wait", "--remove-orphans"],
			Self::Down => &["down", "--remove-orphans"],
			Self::Stop => &["stop"],
			Self::Start => &["start"],
			Self::Create => &["create"],
			Self::Remove => &["rm", "-f"],
		}
	}

	/// Whether the action creates containers, which requires every resource to be in place.
	pub const fn creates_containers(self) -> bool {
		matches!(self, Self::Up | Self::Create)
	}
}

impl Display for ComposeAction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.args()[0])
	}
}

/// The kinds of resources that must exist before a stack goes up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
	Network,
	Volume,
}

impl ResourceKind {
	const fn command(self) -> &'static str {
		match self {
			Self::Network => "network",
			Self::Volume => "volume",
		}
	}

	const fn default_driver(self) -> &'static str {
		match self {
			Self::Network => "bridge",
			Self::Volume => "local",
		}
	}
}

/// A network or volume to create ahead of deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSpec {
	pub kind: ResourceKind,
	pub name: String,
	pub driver: String,
	pub options: Vec<(String, String)>,
}

impl ResourceSpec {
	pub fn create_args(&self) -> Vec<String> {
		let mut args = vec![
			self.kind.command().to_string(),
			"create".to_string(),
			"--driver".to_string(),
			self.driver.clone(),
		];

		for (key, value) in &self.options {
			args.push("--opt".to_string());
			args.push(format!("{key}={value}"));
		}

		args.push(self.name.clone());

		args
	}
}

fn driver_options(opts: &IndexMap<String, Option<SingleValue>>) -> Vec<(String, String)> {
	opts.iter()
		.map(|(k, v)| (k.clone(), v.as_ref().map(ToString::to_string).unwrap_or_default()))
		.collect()
}

/// The networks declared by a document, with their drivers.
pub fn declared_networks(doc: &ComposeFile) -> Vec<ResourceSpec> {
	doc.networks
		.iter()
		.map(|(key, network)| {
			let network = network.clone().unwrap_or_default();

			ResourceSpec {
				kind: ResourceKind::Network,
				name: network.name.unwrap_or_else(|| key.clone()),
				driver: network
					.driver
					.unwrap_or_else(|| ResourceKind::Network.default_driver().to_string()),
				options: driver_options(&network.driver_opts),
			}
		})
		.collect()
}

/// The volumes declared by a document, with their drivers.
pub fn declared_volumes(doc: &ComposeFile) -> Vec<ResourceSpec> {
	doc.volumes
		.iter()
		.map(|(key, volume)| {
			let volume = volume.clone().unwrap_or_default();

			ResourceSpec {
				kind: ResourceKind::Volume,
				name: volume.name.unwrap_or_else(|| key.clone()),
				driver: volume
					.driver
					.unwrap_or_else(|| ResourceKind::Volume.default_driver().to_string()),
				options: driver_options(&volume.driver_opts),
			}
		})
		.collect()
}

/// Groups the output of `ps --format '{{.ID}}\t{{.Label "..."}}'` by project.
pub fn group_by_project(ps_output: &str) -> IndexMap<String, Vec<String>> {
	let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();

	for line in ps_output.lines() {
		let Some((id, project)) = line.split_once('\t') else {
			continue;
		};

		let (id, project) = (id.trim(), project.trim());

		if id.is_empty() || project.is_empty() {
			continue;
		}

		groups
			.entry(project.to_string())
			.or_default()
			.push(id.to_string());
	}

	groups
}

/// The operations that stackyard needs from a container engine.
pub trait ContainerEngine {
	/// Runs a compose action on a stack, feeding it the document on stdin.
	fn compose(
		&self,
		stack: &str,
		action: ComposeAction,
		document: &str,
		envs: &VarMap,
	) -> impl Future<Output = Result<(), AppError>> + Send;

	/// Creates the declared networks and volumes that do not exist yet.
	fn ensure_resources(&self, doc: &ComposeFile) -> impl Future<Output = Result<(), AppError>> + Send;

	/// The inspection records of every compose-managed container, grouped by project.
	fn live_stacks(
		&self,
	) -> impl Future<Output = Result<IndexMap<String, Vec<InspectionRecord>>, AppError>> + Send;
}

/// Prints the output of the engine on the corresponding stream.
pub fn print_output(stream: OutputStream, line: &str) {
	match stream {
		OutputStream::Stdout => println!("{line}"),
		OutputStream::Stderr => eprintln!("{line}"),
	}
}

/// The engine's cli, like `docker` or `podman`.
#[derive(Clone, Debug)]
pub struct Engine {
	pub program: String,
	pub sink: fn(OutputStream, &str),
}

impl Engine {
	pub fn new(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
			sink: print_output,
		}
	}

	#[must_use]
	pub fn with_sink(mut self, sink: fn(OutputStream, &str)) -> Self {
		self.sink = sink;
		self
	}

	pub fn compose_args(stack: &str, action: ComposeAction) -> Vec<String> {
		["compose", "-p", stack, "-f", "-"]
			.into_iter()
			.chain(action.args().iter().copied())
			.map(str::to_string)
			.collect()
	}

	async fn exists(&self, kind: ResourceKind, name: &str) -> Result<bool, AppError> {
		let args = vec![kind.command().to_string(), "inspect".to_string(), name.to_string()];

		Ok(run_captured(&Invocation::new(&self.program, args))
			.await?
			.success())
	}

	async fn ensure(&self, spec: &ResourceSpec) -> Result<(), AppError> {
		if self.exists(spec.kind, &spec.name).await? {
			debug!("The {} `{}` already exists", spec.kind.command(), spec.name);
			return Ok(());
		}

		let output = run_captured(&Invocation::new(&self.program, spec.create_args())).await?;

		if output.success() {
			info!("Created the {} `{}`", spec.kind.command(), spec.name);
			Ok(())
		} else if output.combined().contains("already exists") {
			warn!("The {} `{}` already exists", spec.kind.command(), spec.name);
			Ok(())
		} else {
			Err(AppError::CommandFailed {
				program: self.program.clone(),
				args: spec.create_args(),
				code: output.status.code(),
				output: output.combined(),
			})
		}
	}

	/// Creates the declared networks that do not exist yet.
	pub async fn ensure_networks(&self, doc: &ComposeFile) -> Result<(), AppError> {
		for spec in declared_networks(doc) {
			self.ensure(&spec).await?;
		}

		Ok(())
	}

	/// Creates the declared volumes that do not exist yet.
	pub async fn ensure_volumes(&self, doc: &ComposeFile) -> Result<(), AppError> {
		for spec in declared_volumes(doc) {
			self.ensure(&spec).await?;
		}

		Ok(())
	}

	/// The ids of all containers, running or not, grouped by compose project.
	pub async fn list_project_containers(&self) -> Result<IndexMap<String, Vec<String>>, AppError> {
		let args = vec![
			"ps".to_string(),
			"-a".to_string(),
			"--no-trunc".to_string(),
			"--format".to_string(),
			format!("{{{{.ID}}}}\t{{{{.Label \"{PROJECT_LABEL}\"}}}}"),
		];

		let output = run_checked(&Invocation::new(&self.program, args)).await?;

		Ok(group_by_project(&output.stdout))
	}

	/// Inspects the given containers with a single call.
	pub async fn inspect(&self, ids: &[String]) -> Result<Vec<InspectionRecord>, AppError> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}

		let args = std::iter::once("inspect".to_string())
			.chain(ids.iter().cloned())
			.collect();

		let output = run_checked(&Invocation::new(&self.program, args)).await?;

		Ok(parse_inspection(&output.stdout).context("Could not parse the inspection records")?)
	}
}

impl ContainerEngine for Engine {
	async fn compose(
		&self,
		stack: &str,
		action: ComposeAction,
		document: &str,
		envs: &VarMap,
	) -> Result<(), AppError> {
		info!("Running `{action}` for the stack `{stack}`");

		let invocation = Invocation::new(&self.program, Self::compose_args(stack, action))
			.with_stdin(document)
			.with_envs(envs.clone());

		stream_command(&invocation, self.sink).await
	}

	async fn ensure_resources(&self, doc: &ComposeFile) -> Result<(), AppError> {
		self.ensure_networks(doc).await?;
		self.ensure_volumes(doc).await
	}

	async fn live_stacks(&self) -> Result<IndexMap<String, Vec<InspectionRecord>>, AppError> {
		let mut stacks = IndexMap::new();

		for (project, ids) in self.list_project_containers().await? {
			stacks.insert(project, self.inspect(&ids).await?);
		}

		Ok(stacks)
	}
}
