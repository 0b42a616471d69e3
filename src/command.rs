//! Subprocess execution
//!
//! Version probes and package manager runs go through the `CommandRunner`
//! trait so tests can substitute scripted output for real processes.

use crate::error::{NodepackError, NodepackResult};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// A command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name, resolved through PATH
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Start building a command
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            env: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Add environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Program and arguments as one line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, -1 when killed by a signal
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut all = self.stdout.clone();
        if !all.is_empty() && !all.ends_with('\n') && !self.stderr.is_empty() {
            all.push('\n');
        }
        all.push_str(&self.stderr);
        all
    }

    /// Turn a non-zero exit into an error
    pub fn check(self, spec: &CommandSpec) -> NodepackResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(NodepackError::command_exit(spec.command_line(), self.code))
        }
    }
}

/// Receives each output line while a command runs
pub type LineSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Capability to run external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing output
    ///
    /// A non-zero exit is returned as output, not as an error; only failing
    /// to start the process is an error.
    async fn run(&self, spec: &CommandSpec) -> NodepackResult<CommandOutput>;

    /// Like `run`, also handing every output line to `on_line`
    ///
    /// Runners that cannot stream replay the captured output once the
    /// command has finished.
    async fn run_streaming(
        &self,
        spec: &CommandSpec,
        on_line: LineSink<'_>,
    ) -> NodepackResult<CommandOutput> {
        let output = self.run(spec).await?;
        for line in output.combined().lines() {
            on_line(line);
        }
        Ok(output)
    }
}

/// Runs commands as real child processes
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> NodepackResult<CommandOutput> {
        self.run_streaming(spec, &|_: &str| {}).await
    }

    async fn run_streaming(
        &self,
        spec: &CommandSpec,
        on_line: LineSink<'_>,
    ) -> NodepackResult<CommandOutput> {
        debug!("Executing: {}", spec);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| NodepackError::command_failed(spec.command_line(), e))?;

        // Both pipes are drained to EOF concurrently so neither fills up
        let (stdout, stderr) = tokio::join!(
            drain(child.stdout.take(), "stdout", on_line),
            drain(child.stderr.take(), "stderr", on_line),
        );

        let status = child
            .wait()
            .await
            .map_err(|e| NodepackError::command_failed(spec.command_line(), e))?;

        Ok(CommandOutput {
            code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

/// Read a pipe line by line until EOF
///
/// Bytes that are not UTF-8 are replaced; the pipe is always read to the end.
async fn drain<R>(pipe: Option<R>, stream: &str, on_line: LineSink<'_>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return String::new();
    };
    let mut reader = BufReader::new(pipe);
    let mut captured = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(&['\n', '\r'][..]);
                debug!("{}: {}", stream, line);
                on_line(line);
                captured.push_str(line);
                captured.push('\n');
            }
            Err(e) => {
                debug!("Reading {} failed: {}", stream, e);
                break;
            }
        }
    }

    captured
}

/// Run a command and return its trimmed stdout, failing on non-zero exit
pub async fn probe_version(
    runner: &dyn CommandRunner,
    spec: CommandSpec,
) -> NodepackResult<String> {
    let output = runner.run(&spec).await?.check(&spec)?;
    Ok(output.stdout.trim().to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted command runner for tests

    use super::*;
    use std::sync::Mutex;

    /// Records every command and answers from a script
    ///
    /// Responses are matched by command-line prefix; the longest matching
    /// prefix wins. Unmatched commands succeed with empty output.
    #[derive(Default)]
    pub struct FakeRunner {
        responses: Vec<(String, CommandOutput)>,
        unspawnable: Vec<String>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer commands starting with `prefix` with successful stdout
        pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
            self.responses
                .push((prefix.to_string(), CommandOutput::ok(stdout)));
            self
        }

        /// Answer commands starting with `prefix` with a full output
        pub fn respond_with(mut self, prefix: &str, output: CommandOutput) -> Self {
            self.responses.push((prefix.to_string(), output));
            self
        }

        /// Fail commands starting with `prefix` with exit code 1
        pub fn fail(self, prefix: &str) -> Self {
            self.respond_with(
                prefix,
                CommandOutput {
                    code: 1,
                    stdout: String::new(),
                    stderr: "failed".to_string(),
                },
            )
        }

        /// Commands starting with `prefix` fail to start at all
        pub fn unspawnable(mut self, prefix: &str) -> Self {
            self.unspawnable.push(prefix.to_string());
            self
        }

        /// Command lines run so far
        pub fn calls(&self) -> Vec<String> {
            self.specs().iter().map(CommandSpec::command_line).collect()
        }

        /// Full specs run so far
        pub fn specs(&self) -> Vec<CommandSpec> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec) -> NodepackResult<CommandOutput> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(spec.clone());
            }

            let line = spec.command_line();
            if self.unspawnable.iter().any(|p| line.starts_with(p.as_str())) {
                return Err(NodepackError::command_failed(
                    line,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                ));
            }
            Ok(self
                .responses
                .iter()
                .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
                .max_by_key(|(prefix, _)| prefix.len())
                .map(|(_, output)| output.clone())
                .unwrap_or_default())
        }
    }
}
