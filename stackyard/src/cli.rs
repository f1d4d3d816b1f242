use std::{
	io::{Read, stdin},
	path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::{
	AppError, StackyardConfig,
	engine::ComposeAction,
	fs::read_text,
	inspect::Stack,
	manager::StackManager,
};

pub async fn main_entrypoint() -> Result<(), AppError> {
	Cli::parse().execute().await
}

#[derive(Parser, Debug, Clone)]
#[command(name = "stackyard")]
#[command(version, about, long_about = None)]
pub struct Cli {
	/// Prints the full parsed config
	#[arg(long)]
	pub print_config: bool,

	/// Sets a custom config file. Any file named `stackyard.{yaml,yml,toml,json}` in the cwd or in `XDG_CONFIG_HOME/stackyard` will be detected automatically. If no file is found, the default settings are used
	#[arg(short, long, value_name = "FILE", global = true)]
	pub config: Option<PathBuf>,

	#[command(flatten)]
	pub overrides: StackyardConfig,

	#[command(subcommand)]
	pub command: Commands,
}

/// The cli commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
	/// Sanitizes and enriches a compose file, then stores it as a stack.
	Save {
		/// The name of the stack.
		name: String,

		/// The compose file to read. Use `-` to read from stdin.
		file: PathBuf,

		/// Prints the enriched document without storing it. Missing secrets are still generated.
		#[arg(long)]
		dry_run: bool,
	},

	/// Creates and starts the containers of a stack.
	Up { name: String },

	/// Stops and removes the containers of a stack.
	Down { name: String },

	/// Stops the containers of a stack.
	Stop { name: String },

	/// Starts the existing containers of a stack.
	Start { name: String },

	/// Creates the containers of a stack without starting them.
	Create { name: String },

	/// Removes the stopped containers of a stack.
	Rm { name: String },

	/// Prints the deploy-ready document of a stack, with every variable resolved.
	Render { name: String },

	/// Lists every stack and its containers, including the stacks that were never deployed.
	List {
		/// Prints the inspection records as json.
		#[arg(long)]
		json: bool,
	},

	/// Deletes the stored documents of a stack.
	Delete { name: String },

	/// Generates the json schema for the config file.
	#[cfg(feature = "schemars")]
	JsonSchema {
		/// The output path for the generated schema.
		output: PathBuf,
	},
}

impl Commands {
	/// The compose action and the stack for the commands that drive the engine.
	pub fn compose_action(&self) -> Option<(ComposeAction, &str)> {
		let (action, name) = match self {
			Self::Up { name } => (ComposeAction::Up, name),
			Self::Down { name } => (ComposeAction::Down, name),
			Self::Stop { name } => (ComposeAction::Stop, name),
			Self::Start { name } => (ComposeAction::Start, name),
			Self::Create { name } => (ComposeAction::Create, name),
			Self::Rm { name } => (ComposeAction::Remove, name),
			_ => return None,
		};

		Some((action, name.as_str()))
	}
}

fn read_input(file: &Path) -> Result<String, AppError> {
	if file.as_os_str() == "-" {
		let mut content = String::new();

		stdin()
			.read_to_string(&mut content)
			.map_err(|e| AppError::ReadError {
				path: file.to_path_buf(),
				source: e,
			})?;

		Ok(content)
	} else {
		read_text(file)
	}
}

fn print_stacks(stacks: &[Stack]) {
	println!("{:<20} {:<30} {:<12} IMAGE", "STACK", "CONTAINER", "STATUS");

	for stack in stacks {
		for container in &stack.containers {
			let image = if container.config.image.is_empty() {
				&container.image
			} else {
				&container.config.image
			};

			println!(
				"{:<20} {:<30} {:<12} {image}",
				stack.name,
				container.container_name(),
				container.state.status
			);
		}
	}
}

impl Cli {
	async fn execute(self) -> Result<(), AppError> {
		let config = StackyardConfig::load(self.config.as_deref(), self.overrides)?;

		if self.print_config {
			println!("Full parsed config:");
			println!("{config:#?}");
		}

		debug!("Using the stacks in `{}`", config.stacks_dir().display());

		let manager = StackManager::from_config(config);

		if let Some((action, name)) = self.command.compose_action() {
			return manager.deploy(name, action).await;
		}

		match self.command {
			#[cfg(feature = "schemars")]
			Commands::JsonSchema { output } => {
				StackyardConfig::generate_json_schema(&output)?;
			}
			Commands::Save {
				name,
				file,
				dry_run,
			} => {
				let raw = read_input(&file)?;

				let saved = manager.save(&name, &raw, dry_run).await?;

				if dry_run {
					print!("{}", saved.effective);
				}
			}
			Commands::Render { name } => {
				print!("{}", manager.render(&name)?);
			}
			Commands::List { json } => {
				let stacks = manager.list().await?;

				if json {
					let output = serde_json::to_string_pretty(&stacks)
						.map_err(|e| anyhow::anyhow!("Could not serialize the stacks: {e}"))?;

					println!("{output}");
				} else {
					print_stacks(&stacks);
				}
			}
			Commands::Delete { name } => {
				manager.delete(&name)?;
			}
			Commands::Up { .. }
			| Commands::Down { .. }
			| Commands::Stop { .. }
			| Commands::Start { .. }
			| Commands::Create { .. }
			| Commands::Rm { .. } => {}
		}

		Ok(())
	}
}
