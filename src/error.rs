use std::path::PathBuf;

/// Inbound line that does not match any production of the debugger grammar.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed line `{line}`: {reason}")]
pub struct ParseError {
    pub line: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- syscall errors --------------------------------------------
    #[error("{0} syscall error: {1}")]
    Syscall(&'static str, nix::Error),

    // --------------------------------- subordinate process errors --------------------------------
    #[error("cannot start process `{0}`: {1}")]
    Spawn(String, std::io::Error),
    #[error("another session channel already owns the child termination notification")]
    ChannelOverlap,
    #[error("session channel is closed")]
    ChannelClosed,
    #[error("`{0}` is not a gdb program")]
    NotADebugger(String),
    #[error("unsupported gdb version {0}")]
    UnsupportedVersion(String),

    // --------------------------------- marker errors ---------------------------------------------
    #[error("line number must be strictly positive: {0}")]
    InvalidLine(i64),
    #[error("path is not absolute: {0:?}")]
    RelativePath(PathBuf),
    #[error("annotation `{0}` already exists")]
    DuplicateAnnotation(String),
    #[error("annotation `{0}` does not exist")]
    UnknownAnnotation(String),
}

impl Error {
    /// Return a hint to the session - continue after the error or tear the whole session down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => false,
            Error::InvalidLine(_) => false,
            Error::RelativePath(_) => false,
            Error::DuplicateAnnotation(_) => false,
            Error::UnknownAnnotation(_) => false,
            Error::ChannelClosed => false,

            // currently fatal errors
            Error::Syscall(_, _) => true,
            Error::Spawn(_, _) => true,
            Error::ChannelOverlap => true,
            Error::NotADebugger(_) => true,
            Error::UnsupportedVersion(_) => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "bridge", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "bridge", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
