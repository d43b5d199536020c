use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::platform::{join_paths, PATH_DELIMITER};

pub const TRUSTED_PLATFORM_ASSEMBLIES: &str = "TRUSTED_PLATFORM_ASSEMBLIES";
pub const APP_PATHS: &str = "APP_PATHS";
pub const APP_NI_PATHS: &str = "APP_NI_PATHS";
pub const NATIVE_DLL_SEARCH_DIRECTORIES: &str = "NATIVE_DLL_SEARCH_DIRECTORIES";
pub const PLATFORM_RESOURCE_ROOTS: &str = "PLATFORM_RESOURCE_ROOTS";
pub const APP_DOMAIN_COMPAT_SWITCH: &str = "AppDomainCompatSwitch";

const LATEST_BEHAVIOR: &str = "UseLatestBehaviorWhenTFMNotSpecified";

/// A single `KEY=VALUE` runtime property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl FromStr for Property {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok(Property {
                key: key.to_string(),
                value: value.to_string(),
            }),
            _ => Err(Error::InvalidProperty(s.to_string())),
        }
    }
}

/// Ordered properties for the execution domain created by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainProperties {
    entries: Vec<(String, String)>,
}

impl DomainProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard probing properties for an application living in
    /// `app_dir` and a runtime living in `runtime_dir`.
    pub fn standard(tpa: &str, app_dir: &Path, runtime_dir: &Path) -> Result<Self> {
        let app = utf8(app_dir)?;
        let runtime = utf8(runtime_dir)?;

        let mut props = DomainProperties::new();
        props.set(TRUSTED_PLATFORM_ASSEMBLIES, tpa);
        props.set(APP_PATHS, app);
        props.set(APP_NI_PATHS, join_paths([app.to_string(), format!("{app}NI")]));
        let mut native_dirs = format!("{}{PATH_DELIMITER}", join_paths([app, runtime]));
        if let Some(system) = system_directory() {
            native_dirs.push_str(&system);
        }
        props.set(NATIVE_DLL_SEARCH_DIRECTORIES, native_dirs);
        props.set(PLATFORM_RESOURCE_ROOTS, app);
        props.set(APP_DOMAIN_COMPAT_SWITCH, LATEST_BEHAVIOR);
        Ok(props)
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Extend<Property> for DomainProperties {
    fn extend<T: IntoIterator<Item = Property>>(&mut self, iter: T) {
        for prop in iter {
            self.set(prop.key, prop.value);
        }
    }
}

/// `%SystemRoot%\System32`, probed last for P/Invoke targets.
#[cfg(windows)]
fn system_directory() -> Option<String> {
    let root = std::env::var("SystemRoot").ok()?;
    Some(format!("{root}\\System32"))
}

#[cfg(not(windows))]
fn system_directory() -> Option<String> {
    None
}

fn utf8(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::NonUtf8Path(path.to_path_buf()))
}
