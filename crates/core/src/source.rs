//! What a session can be opened against.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::model::Perm;

/// A binary on disk or a raw code buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl Source {
    /// Pick the source a host exposes: code wins over path, empty code counts as absent.
    pub fn from_host(host: &dyn CodeHost) -> SessionResult<Self> {
        match (host.code(), host.path()) {
            (Some(code), _) if !code.is_empty() => Ok(Source::Bytes(code.to_vec())),
            (_, Some(path)) => Ok(Source::Path(path.to_path_buf())),
            _ => Err(SessionError::UnsupportedSource(
                "host exposes neither a code buffer nor a path".into(),
            )),
        }
    }

    /// Engine URI and open permissions for this source.
    ///
    /// Buffers are backed by a `malloc://` resource of exactly their length and opened
    /// read/write/exec; files are opened read/exec only.
    pub fn open_parts(&self) -> SessionResult<(String, Perm)> {
        match self {
            Source::Bytes(code) if code.is_empty() => {
                Err(SessionError::UnsupportedSource("empty code buffer".into()))
            }
            Source::Bytes(code) => Ok((format!("malloc://{}", code.len()), Perm::all())),
            Source::Path(path) => {
                if !path.is_file() {
                    return Err(SessionError::MissingBinary(path.clone()));
                }
                Ok((path.display().to_string(), Perm::READ | Perm::EXEC))
            }
        }
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

impl From<Vec<u8>> for Source {
    fn from(code: Vec<u8>) -> Self {
        Source::Bytes(code)
    }
}

impl From<&[u8]> for Source {
    fn from(code: &[u8]) -> Self {
        Source::Bytes(code.to_vec())
    }
}

/// The narrow view of a host (e.g. an emulator) that a session needs.
pub trait CodeHost {
    /// Raw code the host is running, if it was started from a buffer.
    fn code(&self) -> Option<&[u8]>;

    /// Path of the binary the host loaded, if any.
    fn path(&self) -> Option<&Path>;

    /// Architecture of the code, when the host knows it.
    fn arch(&self) -> Option<ArchSpec> {
        None
    }
}

/// Architecture name plus word size, as a host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchSpec {
    pub name: String,
    pub bits: u32,
}

impl ArchSpec {
    pub fn new(name: impl Into<String>, bits: u32) -> Self {
        Self { name: name.into(), bits }
    }

    /// Name to hand the engine: lowercased, with a trailing 64-bit qualifier removed
    /// since the word size is configured separately.
    pub fn engine_name(&self) -> String {
        let lower = self.name.to_lowercase();
        let trimmed = lower
            .strip_suffix("_64")
            .or_else(|| lower.strip_suffix("64"))
            .unwrap_or(&lower);
        if trimmed.is_empty() {
            lower.clone()
        } else {
            trimmed.to_string()
        }
    }
}
