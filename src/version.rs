use crate::error::Error;
use crate::weak_error;
use once_cell::sync;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::process::Command;

/// Debugger version, major and minor numbers.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Version(pub (u32, u32));

/// The oldest debugger with `-interpreter-exec`, which runs the interactive commands.
pub const MIN_SUPPORTED: Version = Version((6, 0));

impl Version {
    /// Parse debugger version from the first line of `show version` like:
    /// "GNU gdb (Ubuntu 12.1-0ubuntu1~22.04.2) 12.1".
    pub fn gdb_parse(s: &str) -> Option<Self> {
        static V_RE: sync::Lazy<Regex> = sync::Lazy::new(|| {
            Regex::new(r"^GNU gdb.*\s(\d+)\.(\d+)\S*\s*$").expect("must compile")
        });

        if let Some((_, [major, minor])) = V_RE.captures_iter(s).next().map(|c| c.extract()) {
            let major = weak_error!(major.parse::<u32>())?;
            let minor = weak_error!(minor.parse::<u32>())?;
            return Some(Version((major, minor)));
        }
        None
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0 .0, self.0 .1)
    }
}

/// Run the debugger in batch mode with `commands` and return its standard output.
pub fn run_batch(pgm: &str, commands: &[&str]) -> Result<String, Error> {
    let mut cmd = Command::new(pgm);
    cmd.args(["-batch", "-nx"]);
    for c in commands {
        cmd.args(["-ex", c]);
    }
    let output = cmd.output().map_err(|e| Error::Spawn(pgm.to_string(), e))?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Check that `pgm` is a supported gdb, return its version.
pub fn probe(pgm: &str) -> Result<Version, Error> {
    let header = run_batch(pgm, &["show version"])?;
    let version = header
        .lines()
        .next()
        .and_then(Version::gdb_parse)
        .ok_or_else(|| Error::NotADebugger(pgm.to_string()))?;

    if version < MIN_SUPPORTED {
        return Err(Error::UnsupportedVersion(version.to_string()));
    }
    log::info!(target: "bridge", "gdb version: {version}");
    Ok(version)
}
