//! External image tool invocation: argv in, captured output and exit status out.

use anyhow::{Context, Result, bail};
use log::debug;
use std::borrow::Cow;
use std::ffi::OsString;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::ConvertError;
use crate::utils::config::{SettingsDefaults, TOOL_POLL_INTERVAL_MS};

/// An external command given as an argv prefix (e.g. `["magick", "convert"]`).
///
/// With a deadline set, a run that outlives it is killed (its whole process group on Unix)
/// and reported as an error.
#[derive(Clone, Debug)]
pub struct ExternalTool {
    command: Vec<String>,
    deadline: Option<Duration>,
}

impl ExternalTool {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Full command line for logs and error messages.
    pub fn command_line(&self, args: &[OsString]) -> String {
        self.command
            .iter()
            .map(|s| Cow::Borrowed(s.as_str()))
            .chain(args.iter().map(|a| a.to_string_lossy()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Cheap `-version` invocation to check the tool can run at all.
    pub fn version_check(&self) -> Result<(), ConvertError> {
        let args = [OsString::from(SettingsDefaults::TOOL_VERSION_ARG)];
        let command = self.command_line(&args);
        debug!("Testing image tool installation: {}", command);
        self.run(&args)
            .map(|_| ())
            .map_err(|e| ConvertError::ToolUnavailable {
                command,
                reason: format!("{:#}", e),
            })
    }

    /// Run with `args` appended. Stdout and stderr are captured together; on a non-zero exit
    /// the error carries the command line, status and captured output.
    pub fn run(&self, args: &[OsString]) -> Result<String> {
        let Some((program, prefix)) = self.command.split_first() else {
            bail!("no image tool command configured");
        };
        let command_line = self.command_line(args);
        debug!("Running cmd: {}", command_line);

        let mut cmd = Command::new(program);
        cmd.args(prefix)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("command {:?}: spawn failed", command_line))?;
        let stdout = drain_pipe(child.stdout.take());
        let stderr = drain_pipe(child.stderr.take());

        let waited = self.wait(&mut child);
        let mut output = join_pipe(stdout);
        output.push_str(&join_pipe(stderr));

        match waited? {
            Waited::Exited(status) if status.success() => Ok(output),
            Waited::Exited(status) => {
                bail!("command {:?}: {}\n{}", command_line, status, output)
            }
            Waited::Killed(after) => bail!(
                "command {:?}: killed after {} milliseconds\n{}",
                command_line,
                after.as_millis(),
                output
            ),
        }
    }

    fn wait(&self, child: &mut Child) -> Result<Waited> {
        let Some(deadline) = self.deadline else {
            return Ok(Waited::Exited(child.wait()?));
        };
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Waited::Exited(status));
            }
            if start.elapsed() >= deadline {
                kill_process_group(child);
                let _ = child.wait();
                return Ok(Waited::Killed(start.elapsed()));
            }
            thread::sleep(Duration::from_millis(TOOL_POLL_INTERVAL_MS));
        }
    }
}

enum Waited {
    Exited(ExitStatus),
    Killed(Duration),
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

/// Kill the child and anything it started. The child leads its own group (see `process_group(0)`).
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}
