//! Platform shell detection.

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tokio::runtime::{Handle, Runtime};

/// Returns the appropriate shell command and argument for the current platform.
///
/// Returns `(shell_program, shell_arg)` where:
/// - Windows: `("cmd", "/C")`
/// - Unix-like: `$SHELL` with `-c`, or `("/bin/sh", "-c")` if unset
#[must_use]
pub fn get_shell_command() -> (String, &'static str) {
    if cfg!(windows) {
        ("cmd".into(), "/C")
    } else {
        UnixShell::current_shell().get_shell_command()
    }
}

/// Resolve an executable by name.
///
/// Absolute paths are taken as-is if they exist; anything else is looked
/// up on the current `PATH`.
pub async fn resolve_executable_path(executable: &str) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    if path.is_absolute() && path.is_file() {
        return Some(path.to_path_buf());
    }

    which_async(executable).await
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

/// Drive `future` to completion from synchronous code.
///
/// Inside a Tokio runtime the future runs on a scoped thread that enters the
/// current handle, which needs a multi-threaded runtime to make progress.
/// Outside one, a private current-thread runtime is used.
pub(crate) fn block_on<F>(future: F) -> io::Result<F::Output>
where
    F: std::future::Future + Send,
    F::Output: Send,
{
    static RT: OnceLock<io::Result<Runtime>> = OnceLock::new();

    if let Ok(handle) = Handle::try_current() {
        std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = handle.enter();
                futures::executor::block_on(future)
            })
            .join()
            .map_err(|_| io::Error::other("blocking execution thread panicked"))
        })
    } else {
        let runtime = RT.get_or_init(|| {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
        });
        match runtime {
            Ok(rt) => Ok(rt.block_on(future)),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        }
    }
}

/// Unix shell types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnixShell {
    Zsh(PathBuf),
    Bash(PathBuf),
    Sh(PathBuf),
    Other(PathBuf),
}

impl UnixShell {
    /// Get the shell path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Zsh(p) | Self::Bash(p) | Self::Sh(p) | Self::Other(p) => p,
        }
    }

    /// Get the rc file for this shell, if one exists.
    #[must_use]
    pub fn config_file(&self) -> Option<PathBuf> {
        self.config_file_in(&dirs::home_dir()?)
    }

    /// Get the rc file this shell would read under `home`, if one exists.
    #[must_use]
    pub fn config_file_in(&self, home: &Path) -> Option<PathBuf> {
        let config_file = match self {
            Self::Zsh(_) => Some(home.join(".zshrc")),
            Self::Bash(_) => Some(home.join(".bashrc")),
            Self::Sh(_) | Self::Other(_) => None,
        };
        config_file.filter(|p| p.is_file())
    }

    /// Get the command that sources the rc file.
    #[must_use]
    pub fn source_command(&self) -> Option<String> {
        self.source_command_in(&dirs::home_dir()?)
    }

    /// Get the command that sources the rc file under `home`.
    #[must_use]
    pub fn source_command_in(&self, home: &Path) -> Option<String> {
        let source_file = self.config_file_in(home)?;
        let lossy = source_file.to_string_lossy();
        let escaped = shlex::try_quote(&lossy).ok()?;
        Some(format!("source {escaped}"))
    }

    /// Get the current shell from `$SHELL`.
    #[must_use]
    pub fn current_shell() -> Self {
        std::env::var("SHELL")
            .ok()
            .and_then(|shell| Self::from_path(Path::new(&shell)))
            .unwrap_or_else(|| Self::Sh(PathBuf::from("/bin/sh")))
    }

    /// Create from a path.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        if !(path.is_absolute() && path.is_file()) {
            return None;
        }
        let path_buf = path.to_path_buf();
        Some(match path.file_name().and_then(OsStr::to_str) {
            Some("zsh") => Self::Zsh(path_buf),
            Some("bash") => Self::Bash(path_buf),
            Some("sh") => Self::Sh(path_buf),
            _ => Self::Other(path_buf),
        })
    }

    /// Get shell command tuple.
    #[must_use]
    pub fn get_shell_command(&self) -> (String, &'static str) {
        (self.path().to_string_lossy().into_owned(), "-c")
    }
}
