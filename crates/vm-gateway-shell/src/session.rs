//! A [`VmSession`] backed by the local machine's shell.

use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::Command,
};
use vm_gateway_core::{Invocation, SessionError, ShellChannel, StdinPayload, VmSession};

use crate::{
    channel::LocalShellChannel,
    shell::{UnixShell, block_on, get_shell_command, resolve_executable_path},
};

/// Idle time after which a partial output line is treated as a prompt.
pub const DEFAULT_PROMPT_IDLE: Duration = Duration::from_millis(300);

/// Runs each command in a fresh shell process group on this machine.
///
/// Output is stdout followed by stderr, with one trailing newline removed.
/// Exit status is logged but does not turn output into a failure.
#[derive(Debug, Clone)]
pub struct LocalShellSession {
    program: PathBuf,
    arg: &'static str,
    cwd: Option<PathBuf>,
    rc_command: Option<String>,
    prompt_idle: Duration,
}

impl Default for LocalShellSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalShellSession {
    /// Use the platform shell (`$SHELL -c` or `cmd /C`).
    #[must_use]
    pub fn new() -> Self {
        let (program, arg) = get_shell_command();
        Self {
            program: PathBuf::from(program),
            arg,
            cwd: None,
            rc_command: None,
            prompt_idle: DEFAULT_PROMPT_IDLE,
        }
    }

    /// Use a specific shell, resolved on `PATH`. It must accept `-c`.
    ///
    /// # Errors
    /// Returns error if the executable cannot be found.
    pub async fn with_shell(shell: &str) -> Result<Self, SessionError> {
        let program = resolve_executable_path(shell)
            .await
            .ok_or_else(|| SessionError::Command(format!("Executable not found: {shell}")))?;
        Ok(Self {
            program,
            arg: "-c",
            ..Self::new()
        })
    }

    /// Run commands from `dir`.
    #[must_use]
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Source the shell's rc file (`.bashrc`, `.zshrc`) before each command.
    #[must_use]
    pub fn with_rc_file(self) -> Self {
        match dirs::home_dir() {
            Some(home) => self.with_rc_file_in(&home),
            None => self,
        }
    }

    /// Like [`Self::with_rc_file`], reading the rc file from `home`.
    #[must_use]
    pub fn with_rc_file_in(mut self, home: &Path) -> Self {
        self.rc_command =
            UnixShell::from_path(&self.program).and_then(|s| s.source_command_in(home));
        self
    }

    /// How long a partial line must sit idle before streaming reports a prompt.
    #[must_use]
    pub const fn with_prompt_idle(mut self, idle: Duration) -> Self {
        self.prompt_idle = idle;
        self
    }

    fn command(&self, invocation: &Invocation, keep_stdin: bool) -> Command {
        let script = match &self.rc_command {
            Some(rc) => format!("{rc}; {}", invocation.command),
            None => invocation.command.clone(),
        };
        let mut cmd = Command::new(&self.program);
        cmd.arg(self.arg)
            .arg(script)
            .stdin(if keep_stdin || invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    fn spawn(
        &self,
        invocation: &Invocation,
        keep_stdin: bool,
    ) -> Result<AsyncGroupChild, SessionError> {
        let child = self.command(invocation, keep_stdin).group_spawn()?;
        tracing::debug!(
            id = %invocation.id(),
            pid = ?child.id(),
            shell = %self.program.display(),
            "Spawned shell process group"
        );
        Ok(child)
    }
}

/// Write a stdin payload. A child that exits without reading is not an error.
pub(crate) async fn feed_stdin<W>(stdin: &mut W, payload: &StdinPayload) -> io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    match stdin.write_all(payload.as_bytes()).await {
        Ok(()) => stdin.flush().await,
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e),
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn collect(
    child: &mut AsyncGroupChild,
    stdin: Option<&StdinPayload>,
) -> Result<String, SessionError> {
    let input = child.inner().stdin.take();
    let stdout = child.inner().stdout.take();
    let stderr = child.inner().stderr.take();

    let write = async move {
        if let (Some(mut pipe), Some(payload)) = (input, stdin) {
            feed_stdin(&mut pipe, payload).await?;
        }
        Ok::<_, io::Error>(())
    };
    let (written, out, err, status) =
        tokio::join!(write, read_pipe(stdout), read_pipe(stderr), child.wait());
    written?;
    let status = status?;
    if !status.success() {
        tracing::debug!(?status, "Shell command exited unsuccessfully");
    }

    let mut text = String::from_utf8_lossy(&out?).into_owned();
    text.push_str(&String::from_utf8_lossy(&err?));
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    Ok(text)
}

#[async_trait]
impl VmSession for LocalShellSession {
    fn execute(&self, invocation: &Invocation) -> Result<String, SessionError> {
        block_on(self.execute_async(invocation))?
    }

    async fn execute_async(&self, invocation: &Invocation) -> Result<String, SessionError> {
        let mut child = self.spawn(invocation, false)?;
        let stdin = invocation.stdin.as_ref();

        let result = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, collect(&mut child, stdin))
                .await
                .unwrap_or(Err(SessionError::TimedOut(limit))),
            None => collect(&mut child, stdin).await,
        };

        if let Err(SessionError::TimedOut(limit)) = &result {
            tracing::warn!(id = %invocation.id(), ?limit, "Killing timed-out process group");
            if let Err(e) = child.kill().await {
                tracing::debug!("Failed to kill process group: {e}");
            }
        }
        result
    }

    async fn open_stream(
        &self,
        invocation: &Invocation,
    ) -> Result<Box<dyn ShellChannel>, SessionError> {
        let child = self.spawn(invocation, true)?;
        let channel =
            LocalShellChannel::start(child, invocation.stdin.as_ref(), self.prompt_idle).await?;
        Ok(Box::new(channel))
    }
}
