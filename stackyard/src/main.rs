#![allow(clippy::result_large_err)]

use clap::{CommandFactory, error::ErrorKind};
use stackyard::cli::Cli;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_env("STACKYARD_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();

	if let Err(e) = stackyard::cli::main_entrypoint().await {
		if e.is_fatal() {
			error!("Stopping because of an inconsistent credential store");
		}

		let mut cmd = Cli::command();
		cmd.error(ErrorKind::InvalidValue, e).exit();
	}
}
