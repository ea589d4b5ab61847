// src/exec/process.rs

//! Shell command runner used by the command backend.
//!
//! Each command runs in its own process group so that cancellation reaches
//! everything the shell spawned (pipelines, `mysqldump | gzip`, ...).

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::BackendError;
use crate::exec::backend::StageContext;

/// Extra time allowed beyond the grace period for the forceful kill to land.
pub const KILL_MARGIN: Duration = Duration::from_secs(1);

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Trimmed stderr, or a description of the exit status when empty.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.code {
            Some(code) => format!("command exited with code {code}"),
            None => "command terminated by signal".to_string(),
        }
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    }
}

/// Run `command_line` to completion, or until `ctx.cancel` fires.
///
/// On cancellation the process group is terminated (see
/// [`terminate_group`]) and `BackendError::Cancelled` is returned.
pub async fn run_shell(
    command_line: &str,
    ctx: &StageContext,
) -> Result<CommandOutput, BackendError> {
    let mut cmd = shell_command(command_line);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    debug!(pid = child.id(), "spawned backend command");

    // Always consume both pipes so the child never blocks on a full buffer.
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    tokio::select! {
        status = child.wait() => {
            let status = status?;
            let stdout = collect(stdout, ctx.grace).await;
            let stderr = collect(stderr, ctx.grace).await;

            debug!(code = status.code(), success = status.success(), "backend command exited");

            Ok(CommandOutput {
                success: status.success(),
                code: status.code(),
                stdout,
                stderr,
            })
        }

        _ = ctx.cancel.cancelled() => {
            info!(pid = child.id(), "cancellation requested; terminating command process group");
            terminate_group(&mut child, ctx.grace).await;
            stdout.abort();
            stderr.abort();
            Err(BackendError::Cancelled)
        }
    }
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!(error = %e, "error reading command output");
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Wait for a reader; a background grandchild may keep the pipe open, so
/// give up after `limit`.
async fn collect(reader: JoinHandle<String>, limit: Duration) -> String {
    match tokio::time::timeout(limit, reader).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(error = %e, "output reader task failed");
            String::new()
        }
        Err(_) => {
            debug!("command output still open after exit; truncating");
            String::new()
        }
    }
}

/// Terminate a child and its process group.
///
/// Sends SIGTERM to the group and waits up to `grace` for the leader to
/// exit. If the leader is still running, or other members of the group
/// survive it, the group receives SIGKILL.
#[cfg(unix)]
pub async fn terminate_group(child: &mut Child, grace: Duration) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let pgid = Pid::from_raw(pid as i32);

    if let Err(e) = killpg(pgid, Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM to process group failed");
    }

    let leader_exited = tokio::time::timeout(grace, child.wait()).await.is_ok();
    let group_alive = killpg(pgid, None).is_ok();

    if leader_exited && !group_alive {
        debug!(pid, "process group terminated gracefully");
        return;
    }

    warn!(
        pid,
        grace = ?grace,
        leader_exited,
        "process group still alive after grace period; sending SIGKILL"
    );
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!(pid, error = %e, "SIGKILL to process group failed");
    }
    if !leader_exited {
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
pub async fn terminate_group(child: &mut Child, grace: Duration) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "failed to kill child process");
    }
    let _ = tokio::time::timeout(grace, child.wait()).await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> StageContext {
        StageContext::new(
            Duration::from_secs(10),
            Duration::from_millis(200),
            &CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn captures_output_and_status() {
        let out = run_shell("echo hello; echo oops >&2; exit 3", &ctx())
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.failure_message(), "oops");
    }

    #[tokio::test]
    async fn cancellation_kills_the_whole_group() {
        let ctx = ctx();
        let token = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        // The trap makes the shell ignore SIGTERM so escalation is needed.
        let res = run_shell("trap '' TERM; sleep 30 & sleep 30; wait", &ctx).await;
        assert!(matches!(res, Err(BackendError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn failure_message_falls_back_to_exit_code() {
        let out = CommandOutput {
            success: false,
            code: Some(2),
            stdout: String::new(),
            stderr: "  \n".into(),
        };
        assert_eq!(out.failure_message(), "command exited with code 2");
    }
}
