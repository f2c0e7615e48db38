//! Allow-listed external command execution.
//!
//! Every program is resolved from a fixed set of absolute paths. A binary
//! found through `$PATH` is accepted only if its canonical location is one
//! of those paths, so a writable directory early in `$PATH` cannot shadow
//! the real tool.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{TunnelError, TunnelResult};
use crate::types::Protocol;

const WG_PATHS: &[&str] = &["/usr/sbin/wg", "/usr/bin/wg"];
const AWG_PATHS: &[&str] = &["/usr/sbin/awg", "/usr/bin/awg"];
const PING_PATHS: &[&str] = &["/usr/bin/ping", "/bin/ping", "/usr/sbin/ping", "/sbin/ping"];
const SUDO_PATHS: &[&str] = &["/usr/sbin/sudo", "/usr/bin/sudo"];

/// External programs Peerwatch is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Wg,
    Awg,
    Ping,
}

impl Tool {
    pub fn for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Wg => Tool::Wg,
            Protocol::Awg => Tool::Awg,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Wg => "wg",
            Tool::Awg => "awg",
            Tool::Ping => "ping",
        }
    }

    fn allowed_paths(&self) -> &'static [&'static str] {
        match self {
            Tool::Wg => WG_PATHS,
            Tool::Awg => AWG_PATHS,
            Tool::Ping => PING_PATHS,
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, `-1` if the process was killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs allow-listed tools with a bounded timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Build the full argument vector, program first.
    pub fn prepare(&self, tool: Tool, args: &[&str], require_root: bool) -> TunnelResult<Vec<String>> {
        let exe = resolve_executable(
            tool.name(),
            tool.allowed_paths(),
            std::env::var_os("PATH").as_deref(),
        )?;

        let mut argv = Vec::with_capacity(args.len() + 3);
        if require_root && !is_root() {
            let sudo = resolve_executable("sudo", SUDO_PATHS, std::env::var_os("PATH").as_deref())?;
            argv.push(sudo.display().to_string());
            argv.push("--non-interactive".to_string());
        }
        argv.push(exe.display().to_string());
        argv.extend(args.iter().map(|a| a.to_string()));
        Ok(argv)
    }

    /// Run a tool and capture its output regardless of exit status.
    pub async fn execute(
        &self,
        tool: Tool,
        args: &[&str],
        require_root: bool,
        timeout: Duration,
    ) -> TunnelResult<CommandOutput> {
        let argv = self.prepare(tool, args, require_root)?;
        let Some((program, rest)) = argv.split_first() else {
            return Err(TunnelError::ExecutableNotFound(tool.name().to_string()));
        };

        let mut cmd = Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(?argv, "running command");

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(TunnelError::Spawn {
                    program: tool.name().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(TunnelError::Timeout {
                    program: tool.name().to_string(),
                    timeout,
                });
            }
        };

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run a tool with the default timeout; a non-zero exit is an error.
    pub async fn run(&self, tool: Tool, args: &[&str], require_root: bool) -> TunnelResult<String> {
        let output = self.execute(tool, args, require_root, self.timeout).await?;
        if output.status != 0 {
            return Err(TunnelError::Failed {
                program: tool.name().to_string(),
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }
}

/// Locate `name` among `allowed` absolute paths, falling back to a `$PATH`
/// search whose canonical result must itself be allowed.
pub fn resolve_executable(
    name: &str,
    allowed: &[&str],
    search_path: Option<&OsStr>,
) -> TunnelResult<PathBuf> {
    if let Some(found) = allowed.iter().map(Path::new).find(|p| p.is_file()) {
        return Ok(found.to_path_buf());
    }

    if let Some(search_path) = search_path {
        for dir in std::env::split_paths(search_path) {
            let candidate = dir.join(name);
            if !candidate.is_file() {
                continue;
            }
            if let Ok(real) = candidate.canonicalize()
                && allowed.iter().any(|a| Path::new(a) == real)
            {
                return Ok(real);
            }
        }
    }

    Err(TunnelError::ExecutableNotFound(name.to_string()))
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
