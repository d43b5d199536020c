use std::ffi::NulError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, configuring or driving the runtime.
///
/// Building the trusted assembly list never produces one of these: an
/// unreadable directory degrades to an empty list instead.
#[derive(Error, Debug)]
pub enum Error {
    /// No probed directory contained the runtime library.
    #[error("could not find {library} in any of: {}", format_dirs(.probed))]
    RuntimeNotFound {
        library: &'static str,
        probed: Vec<PathBuf>,
    },

    /// The runtime library exists but could not be loaded.
    #[error("failed to load {}: {source}", .path.display())]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The loaded library does not export a required hosting entry point.
    #[error("runtime does not export `{symbol}`: {source}")]
    MissingExport {
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// A hosting call returned a failing status code.
    #[error("{call} failed with HRESULT {code:#010x}")]
    Hresult { call: &'static str, code: i32 },

    /// A string handed to the runtime contained an interior NUL byte.
    #[error("string cannot be passed to the runtime: {0}")]
    InvalidString(#[from] NulError),

    /// A path could not be represented as UTF-8.
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    /// An extension pattern reduced to an empty suffix.
    #[error("invalid extension pattern `{0}`")]
    InvalidExtension(String),

    /// A `KEY=VALUE` property could not be parsed.
    #[error("invalid property `{0}`, expected KEY=VALUE")]
    InvalidProperty(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_dirs(dirs: &[PathBuf]) -> String {
    if dirs.is_empty() {
        return "<no candidates>".to_string();
    }
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
