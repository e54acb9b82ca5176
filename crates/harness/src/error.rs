use std::path::PathBuf;
use std::time::Duration;
use std::{fmt, io};

#[derive(Debug)]
pub enum Error {
    PortInUse(u16),
    Server(String),
    RomNotFound(PathBuf),
    RomRead(PathBuf, io::Error),
    NavigationTimeout { url: String, reason: String },
    SandboxLaunchFailure(String),
    EngineNotReady(Duration),
    Evaluation(String),
    MalformedObservations(serde_json::Error),
    EngineLoadFault(String),
    EngineRuntimeFault { frame: u32, message: String },
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::RomRead(_, e) => Some(e),
            Error::MalformedObservations(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PortInUse(port) => write!(f, "port {port} is already in use"),
            Error::Server(e) => write!(f, "static server error: {e}"),
            Error::RomNotFound(path) => write!(f, "rom not found: {}", path.display()),
            Error::RomRead(path, e) => write!(f, "unable to read rom {}: {e}", path.display()),
            Error::NavigationTimeout { url, reason } => {
                write!(f, "navigation to {url} did not complete: {reason}")
            }
            Error::SandboxLaunchFailure(e) => write!(f, "unable to launch browser: {e}"),
            Error::EngineNotReady(waited) => {
                write!(f, "engine not ready after {}ms", waited.as_millis())
            }
            Error::Evaluation(e) => write!(f, "remote evaluation failed: {e}"),
            Error::MalformedObservations(e) => write!(f, "malformed observation set: {e}"),
            Error::EngineLoadFault(e) => write!(f, "engine rejected rom: {e}"),
            Error::EngineRuntimeFault { frame, message } => {
                write!(f, "engine fault at frame {frame}: {message}")
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedObservations(value)
    }
}
