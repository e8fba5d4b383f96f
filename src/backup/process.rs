//! External process invocation.
//!
//! Archiver and dump tools are reached through the `ProcessRunner` trait so
//! the code building their command lines can be tested with a scripted
//! runner instead of real binaries.

use crate::backup::function_path;
use crate::backup::redacted::{RedactedString, REDACTED};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithFnName, WithMsg};

use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;

use std::fmt::{Debug, Display, Formatter};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A single command line argument. Secrets reach the child process but are
/// rendered as a placeholder everywhere else.
#[derive(Clone, PartialEq, Eq)]
pub enum CommandArg {
    Plain(String),
    Secret {
        prefix: String,
        secret: RedactedString,
    },
}

impl CommandArg {
    pub fn plain<S: Into<String>>(value: S) -> Self {
        CommandArg::Plain(value.into())
    }

    pub fn secret<S: Into<String>>(prefix: S, secret: &RedactedString) -> Self {
        CommandArg::Secret {
            prefix: prefix.into(),
            secret: secret.clone(),
        }
    }

    pub(crate) fn expose(&self) -> String {
        match self {
            CommandArg::Plain(value) => value.clone(),
            CommandArg::Secret { prefix, secret } => format!("{prefix}{}", secret.inner()),
        }
    }
}

impl Display for CommandArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandArg::Plain(value) => f.write_str(value),
            CommandArg::Secret { prefix, .. } => write!(f, "{prefix}{REDACTED}"),
        }
    }
}

impl Debug for CommandArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        CommandArg::plain(value)
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        CommandArg::plain(value)
    }
}

/// Everything needed to start an external tool. Environment values are
/// treated as secrets.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct Invocation {
    #[builder(into)]
    program: String,
    #[builder(default)]
    args: Vec<CommandArg>,
    #[builder(default)]
    env: Vec<(String, RedactedString)>,
    #[builder(into)]
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl Display for Invocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        if !self.args.is_empty() {
            write!(f, " {}", self.args.iter().join(" "))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait ProcessRunner: Debug + Send + Sync {
    /// Runs the invocation to completion. A non-zero exit code is not an
    /// error at this level; failing to start or timing out is.
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;

    /// True iff the program starts and exits successfully with `args`.
    fn probe(&self, program: &str, args: &[&str]) -> bool {
        let invocation = Invocation::builder()
            .program(program)
            .args(args.iter().map(|a| CommandArg::plain(*a)).collect())
            .timeout(Duration::from_secs(30))
            .build();
        match self.run(&invocation) {
            Ok(output) => output.success(),
            Err(e) => {
                tracing::debug!("Probe of {program} failed: {e}");
                false
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    #[named]
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        tracing::debug!("Running {invocation}");
        let mut command = Command::new(&invocation.program);
        command
            .args(invocation.args.iter().map(CommandArg::expose))
            .envs(
                invocation
                    .env
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.inner().as_str())),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(Error::from)
            .with_msg(format!("Failed to start {}", invocation.program))
            .with_fn_name(function_path!())?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = match invocation.timeout {
            Some(timeout) => wait_with_timeout(&mut child, timeout, &invocation.program),
            None => child.wait().map_err(Error::from),
        }
        .with_fn_name(function_path!())?;

        let output = ProcessOutput {
            exit_code: status.code(),
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
        };
        tracing::debug!("{} exited with {:?}", invocation.program, output.exit_code);
        Ok(output)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf) {
            tracing::warn!("Failed to read child output: {e}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration, program: &str) -> Result<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            tracing::error!("{program} exceeded {timeout:?}, killing it");
            if let Err(e) = child.kill() {
                tracing::warn!("Failed to kill {program}: {e}");
            }
            let _ = child.wait();
            return Err(Error::ProcessTimeout {
                program: program.to_string(),
                timeout,
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
