use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::platform::CORECLR_LIBRARY_NAME;

/// Environment variable naming a directory that holds the runtime.
pub const CORE_ROOT_VAR: &str = "CORE_ROOT";

/// Where to look for the runtime library, in the order it is probed.
#[derive(Debug, Clone, Default)]
pub struct RuntimeLocator {
    explicit: Option<PathBuf>,
    core_root: Option<PathBuf>,
    shared_framework: Option<PathBuf>,
    exe_dir: Option<PathBuf>,
}

/// A runtime library that was found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLocation {
    pub directory: PathBuf,
    pub library: PathBuf,
}

impl RuntimeLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes the explicit directory (if any), then `CORE_ROOT`, then (on
    /// Windows) the newest centrally installed shared framework, then the
    /// directory of the running executable.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        let core_root = env::var_os(CORE_ROOT_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        RuntimeLocator {
            explicit,
            core_root,
            shared_framework: installed_framework(),
            exe_dir,
        }
    }

    pub fn explicit(mut self, dir: impl Into<PathBuf>) -> Self {
        self.explicit = Some(dir.into());
        self
    }

    pub fn core_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.core_root = Some(dir.into());
        self
    }

    pub fn shared_framework(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shared_framework = Some(dir.into());
        self
    }

    pub fn exe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exe_dir = Some(dir.into());
        self
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Path> {
        [
            &self.explicit,
            &self.core_root,
            &self.shared_framework,
            &self.exe_dir,
        ]
        .into_iter()
        .filter_map(|dir| dir.as_deref())
    }

    pub fn locate(&self) -> Result<RuntimeLocation> {
        let mut probed = Vec::new();
        for dir in self.candidates() {
            let library = dir.join(CORECLR_LIBRARY_NAME);
            let found = library.is_file();
            debug!(path = %library.display(), found, "probing for runtime");
            if found {
                return Ok(RuntimeLocation {
                    directory: dir.to_path_buf(),
                    library,
                });
            }
            probed.push(dir.to_path_buf());
        }
        Err(Error::RuntimeNotFound {
            library: CORECLR_LIBRARY_NAME,
            probed,
        })
    }
}

/// The highest versioned framework directory under
/// `<dotnet_root>/shared/Microsoft.NETCore.App`.
pub fn latest_shared_framework(dotnet_root: &Path) -> Option<PathBuf> {
    let frameworks = dotnet_root.join("shared").join("Microsoft.NETCore.App");
    fs::read_dir(&frameworks)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            parse_version(&name).map(|version| (version, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

/// Numeric components of a framework version such as `8.0.11`, ignoring
/// any `-preview` style suffix.
fn parse_version(name: &str) -> Option<Vec<u64>> {
    let release = name.split('-').next()?;
    release
        .split('.')
        .map(|part| part.parse().ok())
        .collect()
}

#[cfg(windows)]
fn installed_framework() -> Option<PathBuf> {
    let program_files = env::var_os("ProgramFiles")?;
    latest_shared_framework(&Path::new(&program_files).join("dotnet"))
}

#[cfg(not(windows))]
fn installed_framework() -> Option<PathBuf> {
    None
}
