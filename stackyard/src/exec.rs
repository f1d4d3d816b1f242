use std::{
	io::ErrorKind,
	process::{ExitStatus, Stdio},
};

use tokio::{
	io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
	process::{Child, ChildStdin, Command},
};
use tracing::debug;

use crate::{AppError, variables::VarMap};

/// The stream that a line of output was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
	Stdout,
	Stderr,
}

/// The collected output of a command that ran to completion.
#[derive(Clone, Debug)]
pub struct CapturedOutput {
	pub status: ExitStatus,
	pub stdout: String,
	pub stderr: String,
}

impl CapturedOutput {
	pub fn success(&self) -> bool {
		self.status.success()
	}

	pub fn combined(&self) -> String {
		format!("{}{}", self.stdout, self.stderr)
	}
}

/// A program to launch, with its arguments and optional input.
#[derive(Clone, Debug, Default)]
pub struct Invocation<'a> {
	pub program: &'a str,
	pub args: Vec<String>,
	pub stdin: Option<&'a str>,
	pub envs: VarMap,
}

impl<'a> Invocation<'a> {
	pub fn new(program: &'a str, args: Vec<String>) -> Self {
		Self {
			program,
			args,
			stdin: None,
			envs: VarMap::new(),
		}
	}

	#[must_use]
	pub fn with_stdin(mut self, input: &'a str) -> Self {
		self.stdin = Some(input);
		self
	}

	#[must_use]
	pub fn with_envs(mut self, envs: VarMap) -> Self {
		self.envs = envs;
		self
	}

	fn spawn(&self) -> Result<Child, AppError> {
		debug!("Launching `{} {}`", self.program, self.args.join(" "));

		Command::new(self.program)
			.args(&self.args)
			.envs(&self.envs)
			.stdin(if self.stdin.is_some() {
				Stdio::piped()
			} else {
				Stdio::null()
			})
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.spawn()
			.map_err(|e| AppError::CommandSpawn {
				program: self.program.to_string(),
				source: e,
			})
	}

	fn failure(&self, code: Option<i32>, output: String) -> AppError {
		AppError::CommandFailed {
			program: self.program.to_string(),
			args: self.args.clone(),
			code,
			output,
		}
	}
}

async fn feed_stdin(stdin: Option<ChildStdin>, input: Option<&str>) -> std::io::Result<()> {
	if let Some(mut stdin) = stdin
		&& let Some(input) = input
	{
		let written = match stdin.write_all(input.as_bytes()).await {
			Ok(()) => stdin.shutdown().await,
			Err(e) => Err(e),
		};

		// The process may exit without reading its input
		if let Err(e) = written
			&& e.kind() != ErrorKind::BrokenPipe
		{
			return Err(e);
		}
	}

	Ok(())
}

async fn forward_lines<R, F>(reader: Option<R>, on_line: F) -> std::io::Result<String>
where
	R: AsyncRead + Unpin,
	F: Fn(&str),
{
	let mut collected = String::new();

	let Some(reader) = reader else {
		return Ok(collected);
	};

	let mut lines = BufReader::new(reader).lines();

	while let Some(line) = lines.next_line().await? {
		on_line(&line);
		collected.push_str(&line);
		collected.push('\n');
	}

	Ok(collected)
}

/// Runs a command and waits for it to finish, collecting its output.
///
/// A non-zero exit status is not an error at this level, so that callers can decide which
/// failures are tolerated.
pub async fn run_captured(invocation: &Invocation<'_>) -> Result<CapturedOutput, AppError> {
	let mut child = invocation.spawn()?;

	let io_error = |e| AppError::CommandSpawn {
		program: invocation.program.to_string(),
		source: e,
	};

	feed_stdin(child.stdin.take(), invocation.stdin)
		.await
		.map_err(io_error)?;

	let output = child.wait_with_output().await.map_err(io_error)?;

	Ok(CapturedOutput {
		status: output.status,
		stdout: String::from_utf8_lossy(&output.stdout).to_string(),
		stderr: String::from_utf8_lossy(&output.stderr).to_string(),
	})
}

/// Runs a command while forwarding each line of its output to `sink` as soon as it is read.
///
/// Both output streams are drained concurrently and fully before the exit status is checked,
/// so no buffered output is lost when the process terminates early.
pub async fn stream_command<F>(invocation: &Invocation<'_>, sink: F) -> Result<(), AppError>
where
	F: Fn(OutputStream, &str),
{
	let mut child = invocation.spawn()?;

	let stdin = child.stdin.take();
	let stdout = child.stdout.take();
	let stderr = child.stderr.take();

	let sink = &sink;

	let (written, out, err) = tokio::join!(
		feed_stdin(stdin, invocation.stdin),
		forward_lines(stdout, |line| sink(OutputStream::Stdout, line)),
		forward_lines(stderr, |line| sink(OutputStream::Stderr, line)),
	);

	let io_error = |e| AppError::CommandSpawn {
		program: invocation.program.to_string(),
		source: e,
	};

	let status = child.wait().await.map_err(io_error)?;

	written.map_err(io_error)?;
	out.map_err(io_error)?;
	let stderr_text = err.map_err(io_error)?;

	if status.success() {
		Ok(())
	} else {
		Err(invocation.failure(status.code(), stderr_text))
	}
}

/// Like [`run_captured`], but a non-zero exit status becomes an error.
pub async fn run_checked(invocation: &Invocation<'_>) -> Result<CapturedOutput, AppError> {
	let output = run_captured(invocation).await?;

	if output.success() {
		Ok(output)
	} else {
		Err(invocation.failure(output.status.code(), output.combined()))
	}
}
