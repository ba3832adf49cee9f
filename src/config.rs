use crate::channel::sys;
use std::fs;
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// Presence of this variable forces the debugger to run on pipes.
pub const PIPES_ENV: &str = "MIBRIDGE_PIPES";

/// Commands run by the debugger on startup, they keep the console output machine friendly.
pub const GDB_INIT: &str = "set confirm off\nset height 0\nset width 0\n";

const NULL_DEVICE: &str = "/dev/null";

/// Bridge configuration, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Debugger program.
    pub pgm: String,
    /// Terminal of the debuggee.
    pub terminal: PathBuf,
    /// Run the debugger on pipes even if a pseudo terminal is available.
    pub force_pipes: bool,
    /// Debugger arguments given by the user.
    pub extra_args: Vec<String>,
}

impl Config {
    /// Argument vector of the debugger.
    pub fn argv(&self, init_script: &Path) -> Vec<String> {
        let mut argv = vec![
            self.pgm.clone(),
            format!("-tty={}", self.terminal.display()),
            "-x".to_string(),
            init_script.display().to_string(),
            "--interpreter=mi".to_string(),
        ];
        argv.extend(self.extra_args.iter().cloned());
        argv
    }
}

/// Return true if the environment forces pipes.
pub fn pipes_from_env() -> bool {
    std::env::var_os(PIPES_ENV).is_some()
}

/// Terminal of the bridge when stdin is a terminal, the null device otherwise.
pub fn default_terminal() -> PathBuf {
    sys::ttyname(io::stdin().as_raw_fd()).unwrap_or_else(|_| PathBuf::from(NULL_DEVICE))
}

/// Debugger initialisation script in a uniquely named temporary file, removed on drop.
pub struct InitScript {
    path: PathBuf,
}

impl InitScript {
    pub fn create() -> io::Result<Self> {
        let path = std::env::temp_dir().join(format!("mibridge-{}.gdbinit", uuid::Uuid::new_v4()));
        fs::write(&path, GDB_INIT)?;
        log::debug!(target: "bridge", "init script {path:?}");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InitScript {
    fn drop(&mut self) {
        crate::muted_error!(fs::remove_file(&self.path), "init script removal:");
    }
}
