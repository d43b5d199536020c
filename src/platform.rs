//! Per-OS naming conventions the host depends on.

/// Separator between entries of a path list such as `APP_PATHS`.
#[cfg(windows)]
pub const PATH_DELIMITER: char = ';';
#[cfg(not(windows))]
pub const PATH_DELIMITER: char = ':';

/// File name of the runtime's shared library.
#[cfg(windows)]
pub const CORECLR_LIBRARY_NAME: &str = "coreclr.dll";
#[cfg(target_os = "macos")]
pub const CORECLR_LIBRARY_NAME: &str = "libcoreclr.dylib";
#[cfg(not(any(windows, target_os = "macos")))]
pub const CORECLR_LIBRARY_NAME: &str = "libcoreclr.so";

/// Trusted assembly patterns, highest priority first.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "*.ni.dll",
    "*.dll",
    "*.ni.exe",
    "*.exe",
    "*.ni.winmd",
    "*.winmd",
];

/// Joins `parts` with [`PATH_DELIMITER`], without a trailing delimiter.
pub fn join_paths<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut joined = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            joined.push(PATH_DELIMITER);
        }
        joined.push_str(part.as_ref());
    }
    joined
}
