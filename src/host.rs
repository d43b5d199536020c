//! Startup sequence: find the runtime, build its properties, start it.

use std::os::raw::c_int;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::coreclr::{CoreClr, ManagedDelegate};
use crate::error::{Error, Result};
use crate::locate::{RuntimeLocation, RuntimeLocator};
use crate::properties::{DomainProperties, Property};
use crate::tpa::{AssemblyList, AssemblyListBuilder, Extension};

pub const DEFAULT_DOMAIN_NAME: &str = "rustclr";

/// Everything needed to start the runtime for one application.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Path of the managed application or library to host.
    pub app_path: PathBuf,
    pub locator: RuntimeLocator,
    pub domain_name: String,
    /// Trusted assembly patterns, highest priority first.
    pub extensions: Vec<Extension>,
    /// Applied on top of the standard properties.
    pub extra_properties: Vec<Property>,
}

impl HostConfig {
    pub fn new(app_path: impl Into<PathBuf>) -> Self {
        HostConfig {
            app_path: app_path.into(),
            locator: RuntimeLocator::from_env(None),
            domain_name: DEFAULT_DOMAIN_NAME.to_string(),
            extensions: Extension::defaults(),
            extra_properties: Vec::new(),
        }
    }

    /// Directory of the hosted application.
    pub fn app_dir(&self) -> &Path {
        self.app_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

/// Collects the trusted assemblies of the runtime directory, then of the
/// application directory. Runtime copies win over same-named app copies.
pub fn trusted_assemblies(
    builder: &AssemblyListBuilder,
    runtime_dir: &Path,
    app_dir: &Path,
) -> AssemblyList {
    let mut list = AssemblyList::new();
    builder.append(runtime_dir, &mut list);
    if app_dir != runtime_dir {
        builder.append(app_dir, &mut list);
    }
    list
}

/// Works out the runtime location and domain properties for `config`
/// without loading anything.
pub fn prepare(config: &HostConfig) -> Result<(RuntimeLocation, DomainProperties)> {
    let runtime = config.locator.locate()?;
    info!(path = %runtime.library.display(), "found runtime");

    let app_dir = config.app_dir();
    let builder = AssemblyListBuilder::new(config.extensions.clone());
    let tpa = trusted_assemblies(&builder, &runtime.directory, app_dir);
    info!(assemblies = tpa.len(), "built trusted assembly list");

    let mut properties = DomainProperties::standard(tpa.as_str(), app_dir, &runtime.directory)?;
    properties.extend(config.extra_properties.iter().cloned());
    for (key, value) in properties.iter() {
        debug!(key, len = value.len(), "domain property");
    }
    Ok((runtime, properties))
}

/// A started runtime bound to one application.
#[derive(Debug)]
pub struct Host {
    clr: CoreClr,
    app_path: String,
}

impl Host {
    pub fn start(config: &HostConfig) -> Result<Host> {
        let (runtime, properties) = prepare(config)?;
        let app_path = config
            .app_path
            .to_str()
            .ok_or_else(|| Error::NonUtf8Path(config.app_path.clone()))?
            .to_string();

        let clr = CoreClr::initialize(
            &runtime.library,
            &app_path,
            &config.domain_name,
            &properties,
        )?;
        info!(domain = %config.domain_name, id = clr.domain_id(), "runtime started");
        Ok(Host { clr, app_path })
    }

    /// Runs the application's entry point, shuts the runtime down and
    /// returns the exit code.
    pub fn run(self, args: &[String]) -> Result<i32> {
        info!(app = %self.app_path, "executing managed code");
        let exit_code = self.clr.execute_assembly(&self.app_path, args)?;
        info!(exit_code, "managed code returned");
        self.clr.shutdown()?;
        Ok(exit_code as i32)
    }

    /// Calls a static, parameterless managed method, then shuts down.
    pub fn invoke(self, assembly_name: &str, type_name: &str, method_name: &str) -> Result<()> {
        {
            let method: ManagedDelegate<unsafe extern "C" fn()> =
                self.clr.create_delegate(assembly_name, type_name, method_name)?;
            info!(
                assembly = assembly_name,
                class = type_name,
                method = method_name,
                "invoking managed method"
            );
            unsafe { (*method)() };
        }
        let latched: c_int = self.clr.shutdown()?;
        debug!(latched, "runtime stopped");
        Ok(())
    }
}
