//! Platform specifics: shell invocation, process-tree termination and
//! interrupt handling.

use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Set by the SIGINT/SIGTERM handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Build the command that runs `script` through the platform shell.
///
/// Unix uses `/bin/sh -c` (non-interactive, no profile) so builds behave the
/// same on every agent. On Unix the child leads its own process group, which
/// lets [`kill_process_tree`] reach anything it spawned.
pub fn shell_command(script: &str) -> Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(script);
        cmd.process_group(0);
        cmd
    }
    #[cfg(not(unix))]
    {
        let shell = std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string());
        let mut cmd = Command::new(shell);
        cmd.arg("/C").arg(script);
        cmd
    }
}

/// Shell text that expands the environment variable `name`.
///
/// Returns `None` when `name` is not a portable variable name. The value is
/// expanded by the shell at run time and never parsed as script.
pub fn env_reference(name: &str) -> Option<String> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return None;
    }
    if cfg!(unix) {
        Some(format!("${{{}}}", name))
    } else {
        Some(format!("%{}%", name))
    }
}

/// Quote `value` as a single literal shell word.
pub fn quote_argument(value: &str) -> String {
    if cfg!(unix) {
        format!("'{}'", value.replace('\'', "'\\''"))
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}

/// Terminate a child and everything in its process group, then reap it.
pub fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = i32::try_from(child.id()) {
            // SAFETY: kill(2) with a negative pid signals the process group the
            // child leads; it has no memory-safety preconditions.
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT and SIGTERM to the process-wide interrupt flag.
///
/// After this, an interrupted build stops at the running stage, runs its
/// hooks and cleans its workspace instead of dying mid-way.
pub fn install_interrupt_handler() {
    #[cfg(unix)]
    {
        // SAFETY: the handler only performs an atomic store, which is
        // async-signal-safe.
        unsafe {
            libc::signal(libc::SIGINT, on_interrupt as libc::sighandler_t);
            libc::signal(libc::SIGTERM, on_interrupt as libc::sighandler_t);
        }
    }
}

/// Cooperative cancellation shared by the stage graph and the step runner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    follow_interrupts: bool,
}

impl CancelToken {
    /// A token cancelled only through [`CancelToken::cancel`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is also cancelled by SIGINT/SIGTERM once
    /// [`install_interrupt_handler`] has run.
    pub fn from_interrupts() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            follow_interrupts: true,
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || (self.follow_interrupts && INTERRUPTED.load(Ordering::SeqCst))
    }
}
