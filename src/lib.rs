//! A native host for the CoreCLR runtime.
//!
//! The host finds the runtime's shared library, builds the list of trusted
//! platform assemblies next to it, creates an execution domain and runs
//! managed code in it.

pub mod coreclr;
pub mod error;
pub mod host;
pub mod locate;
pub mod platform;
pub mod properties;
pub mod tpa;

pub use coreclr::{CoreClr, ManagedDelegate};
pub use error::{Error, Result};
pub use host::{Host, HostConfig};
pub use tpa::{AssemblyList, AssemblyListBuilder, Extension};
