//! Trusted platform assembly (TPA) list construction.
//!
//! The runtime loads every assembly named in `TRUSTED_PLATFORM_ASSEMBLIES`
//! with full trust, and does not promise which copy wins when the same
//! assembly is listed twice. The list built here therefore holds at most
//! one path per base name, picked by extension priority:
//!
//! ```
//! use rustclr_host::tpa::{AssemblyListBuilder, Extension};
//!
//! let extensions = ["*.ni.dll", "*.dll"]
//!     .iter()
//!     .map(|p| p.parse::<Extension>())
//!     .collect::<Result<Vec<_>, _>>()
//!     .unwrap();
//! let list = AssemblyListBuilder::new(extensions).build("/does/not/exist".as_ref());
//! assert!(list.is_empty());
//! ```

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::platform::{DEFAULT_EXTENSIONS, PATH_DELIMITER};

/// A file name suffix pattern such as `*.ni.dll`.
///
/// Only a leading `*` is understood; the rest is compared literally and
/// case-sensitively against the end of a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extension {
    suffix: String,
}

impl Extension {
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Returns `file_name` with the suffix removed, if it ends with it and
    /// something is left over.
    pub fn base_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        if file_name.len() <= self.suffix.len() {
            return None;
        }
        file_name.strip_suffix(self.suffix.as_str())
    }

    /// The built-in patterns, highest priority first.
    pub fn defaults() -> Vec<Extension> {
        DEFAULT_EXTENSIONS
            .iter()
            .map(|pattern| Extension {
                suffix: pattern.trim_start_matches('*').to_string(),
            })
            .collect()
    }
}

impl FromStr for Extension {
    type Err = Error;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        let suffix = pattern.strip_prefix('*').unwrap_or(pattern);
        if suffix.is_empty() || suffix.contains('*') {
            return Err(Error::InvalidExtension(pattern.to_string()));
        }
        Ok(Extension {
            suffix: suffix.to_string(),
        })
    }
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*{}", self.suffix)
    }
}

/// Lists the names of the entries of a directory.
///
/// Entries that cannot be read or named are left out; only failing to open
/// the directory itself is an error.
pub trait EntrySource {
    fn file_names(&self, directory: &Path) -> io::Result<Vec<String>>;
}

/// [`EntrySource`] backed by the operating system's directory API.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystem;

impl EntrySource for FileSystem {
    fn file_names(&self, directory: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(directory)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    trace!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(name) => trace!(?name, "skipping entry with non UTF-8 name"),
            }
        }
        Ok(names)
    }
}

/// An append-only, delimiter-terminated list of assembly paths keyed by
/// base name.
#[derive(Debug, Clone, Default)]
pub struct AssemblyList {
    buffer: String,
    names: HashSet<String>,
    len: usize,
}

impl AssemblyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty list whose buffer starts with room for `bytes`.
    pub fn with_capacity(bytes: usize) -> Self {
        AssemblyList {
            buffer: String::with_capacity(bytes),
            ..Self::default()
        }
    }

    pub fn contains(&self, base_name: &str) -> bool {
        self.names.contains(base_name)
    }

    /// Appends `path` under `base_name` unless that name is already present
    /// or `path` contains the list delimiter.
    ///
    /// Returns whether the path was added.
    pub fn insert(&mut self, base_name: &str, path: &str) -> bool {
        if self.names.contains(base_name) || path.contains(PATH_DELIMITER) {
            return false;
        }
        self.buffer.reserve(path.len() + PATH_DELIMITER.len_utf8());
        self.buffer.push_str(path);
        self.buffer.push(PATH_DELIMITER);
        self.names.insert(base_name.to_string());
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every path, in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.buffer.split_terminator(PATH_DELIMITER)
    }

    /// The list as handed to the runtime: each path followed by the delimiter.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

impl fmt::Display for AssemblyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.buffer)
    }
}

/// Scans directories for assemblies and collects them into an [`AssemblyList`].
#[derive(Debug, Clone)]
pub struct AssemblyListBuilder<S = FileSystem> {
    extensions: Vec<Extension>,
    source: S,
}

impl AssemblyListBuilder<FileSystem> {
    pub fn new(extensions: Vec<Extension>) -> Self {
        AssemblyListBuilder {
            extensions,
            source: FileSystem,
        }
    }
}

impl Default for AssemblyListBuilder<FileSystem> {
    fn default() -> Self {
        Self::new(Extension::defaults())
    }
}

impl<S: EntrySource> AssemblyListBuilder<S> {
    /// Replaces the directory backend.
    pub fn with_source<T: EntrySource>(self, source: T) -> AssemblyListBuilder<T> {
        AssemblyListBuilder {
            extensions: self.extensions,
            source,
        }
    }

    /// Builds a fresh list from a single directory.
    pub fn build(&self, directory: &Path) -> AssemblyList {
        let mut list = AssemblyList::new();
        self.append(directory, &mut list);
        list
    }

    /// Adds the assemblies of `directory` to `list`.
    ///
    /// Names already in `list` keep their existing path. Each extension is
    /// a full pass over one snapshot of the directory, so a file matched by
    /// an earlier pattern always beats a same-named file matched by a later
    /// one. Returns the number of paths added; an unreadable directory adds
    /// nothing.
    pub fn append(&self, directory: &Path, list: &mut AssemblyList) -> usize {
        match directory.to_str() {
            None => {
                warn!(directory = ?directory, "assembly directory is not valid UTF-8, skipping");
                return 0;
            }
            Some(dir) if dir.contains(PATH_DELIMITER) => {
                warn!(
                    directory = dir,
                    "assembly directory contains the path list delimiter, skipping"
                );
                return 0;
            }
            Some(_) => {}
        }
        let mut names = match self.source.file_names(directory) {
            Ok(names) => names,
            Err(err) => {
                warn!(
                    directory = %directory.display(),
                    error = %err,
                    "cannot enumerate assembly directory"
                );
                return 0;
            }
        };
        names.sort_unstable();

        let candidates: Vec<(usize, &str, &str)> = names
            .iter()
            .filter_map(|name| {
                self.classify(name)
                    .map(|(rank, base)| (rank, base, name.as_str()))
            })
            .collect();

        let mut added = 0;
        for rank in 0..self.extensions.len() {
            for &(_, base, name) in candidates.iter().filter(|c| c.0 == rank) {
                if list.contains(base) {
                    trace!(file = name, base, "already listed under a higher priority");
                    continue;
                }
                if name.contains(PATH_DELIMITER) {
                    trace!(file = name, "skipping file name containing the path list delimiter");
                    continue;
                }
                let path = directory.join(name);
                let Some(path) = path.to_str() else {
                    continue;
                };
                if list.insert(base, path) {
                    added += 1;
                }
            }
        }

        debug!(
            directory = %directory.display(),
            candidates = candidates.len(),
            added,
            "scanned assembly directory"
        );
        added
    }

    /// Finds the highest priority extension `file_name` matches, with the
    /// base name it yields.
    fn classify<'a>(&self, file_name: &'a str) -> Option<(usize, &'a str)> {
        self.extensions
            .iter()
            .enumerate()
            .find_map(|(rank, ext)| ext.base_name(file_name).map(|base| (rank, base)))
    }
}

/// Builds the trusted assembly list for `directory` from the filesystem.
pub fn build(directory: &Path, extensions: &[Extension]) -> AssemblyList {
    AssemblyListBuilder::new(extensions.to_vec()).build(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct Listing(Vec<&'static str>);

    impl EntrySource for Listing {
        fn file_names(&self, _directory: &Path) -> io::Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct Unreadable;

    impl EntrySource for Unreadable {
        fn file_names(&self, _directory: &Path) -> io::Result<Vec<String>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        }
    }

    fn exts(patterns: &[&str]) -> Vec<Extension> {
        patterns.iter().map(|p| p.parse().unwrap()).collect()
    }

    fn full(dir: &str, name: &str) -> String {
        Path::new(dir).join(name).to_str().unwrap().to_string()
    }

    fn file_names(list: &AssemblyList) -> Vec<String> {
        list.paths()
            .map(|p| Path::new(p).file_name().unwrap().to_str().unwrap().to_string())
            .collect()
    }

    fn scenario_builder(entries: Vec<&'static str>) -> AssemblyListBuilder<Listing> {
        AssemblyListBuilder::new(exts(&["*.ni.dll", "*.dll", "*.ni.exe", "*.exe"]))
            .with_source(Listing(entries))
    }

    #[test]
    fn extension_strips_leading_star() {
        let ext: Extension = "*.ni.dll".parse().unwrap();
        assert_eq!(ext.suffix(), ".ni.dll");
        assert_eq!(ext.to_string(), "*.ni.dll");

        let bare: Extension = ".dll".parse().unwrap();
        assert_eq!(bare.suffix(), ".dll");
    }

    #[test]
    fn extension_rejects_empty_and_nested_globs() {
        assert!(matches!("*".parse::<Extension>(), Err(Error::InvalidExtension(_))));
        assert!(matches!("".parse::<Extension>(), Err(Error::InvalidExtension(_))));
        assert!(matches!("*.*".parse::<Extension>(), Err(Error::InvalidExtension(_))));
    }

    #[test]
    fn base_name_requires_a_non_empty_stem() {
        let ext: Extension = "*.dll".parse().unwrap();
        assert_eq!(ext.base_name("System.Runtime.dll"), Some("System.Runtime"));
        assert_eq!(ext.base_name(".dll"), None);
        assert_eq!(ext.base_name("dll"), None);
        assert_eq!(ext.base_name("a.exe"), None);
    }

    #[test]
    fn base_name_is_case_sensitive() {
        let ext: Extension = "*.dll".parse().unwrap();
        assert_eq!(ext.base_name("A.DLL"), None);
    }

    #[test]
    fn defaults_follow_native_image_priority() {
        let suffixes: Vec<_> = Extension::defaults()
            .iter()
            .map(|e| e.suffix().to_string())
            .collect();
        assert_eq!(
            suffixes,
            [".ni.dll", ".dll", ".ni.exe", ".exe", ".ni.winmd", ".winmd"]
        );
    }

    #[test]
    fn mixed_directory_resolves_each_name_once() {
        let builder = scenario_builder(vec!["A.dll", "B.ni.dll", "B.dll", "C.exe"]);
        let list = builder.build(Path::new("/rt"));

        assert_eq!(list.len(), 3);
        assert!(list.contains("A"));
        assert!(list.contains("B"));
        assert!(list.contains("C"));
        assert!(!list.contains("B.ni"));

        let names = file_names(&list);
        assert_eq!(names, ["B.ni.dll", "A.dll", "C.exe"]);
    }

    #[test]
    fn native_image_beats_il_assembly() {
        let builder = scenario_builder(vec!["foo.dll", "foo.ni.dll"]);
        let list = builder.build(Path::new("/rt"));

        let expected = format!("{}{}", full("/rt", "foo.ni.dll"), PATH_DELIMITER);
        assert_eq!(list.as_str(), expected);
    }

    #[test]
    fn later_pattern_never_displaces_earlier_one() {
        let builder = AssemblyListBuilder::new(exts(&["*.exe", "*.dll"]))
            .with_source(Listing(vec!["tool.dll", "tool.exe"]));
        let list = builder.build(Path::new("/rt"));
        assert_eq!(file_names(&list), ["tool.exe"]);
    }

    #[test]
    fn file_is_judged_by_its_best_pattern_only() {
        // `B.ni.dll` matches `.dll` first here, so it is the assembly `B.ni`
        // and is not reconsidered as `B` by the later `.ni.dll` pass.
        let builder = AssemblyListBuilder::new(exts(&["*.dll", "*.ni.dll"]))
            .with_source(Listing(vec!["B.ni.dll", "B.dll"]));
        let list = builder.build(Path::new("/rt"));

        assert_eq!(list.len(), 2);
        assert!(list.contains("B"));
        assert!(list.contains("B.ni"));
        let names = file_names(&list);
        assert_eq!(names.iter().filter(|n| *n == "B.ni.dll").count(), 1);
    }

    #[test]
    fn enumeration_order_does_not_matter() {
        let forward = scenario_builder(vec!["A.dll", "B.ni.dll", "B.dll", "C.exe", "D.ni.exe"]);
        let backward = scenario_builder(vec!["D.ni.exe", "C.exe", "B.dll", "B.ni.dll", "A.dll"]);

        let a = forward.build(Path::new("/rt"));
        let b = backward.build(Path::new("/rt"));
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn building_twice_gives_the_same_mapping() {
        let builder = scenario_builder(vec!["X.exe", "X.ni.exe", "Y.dll", "Z.ni.dll"]);
        let mapping = |list: &AssemblyList| -> BTreeMap<String, String> {
            list.paths()
                .map(|p| {
                    let name = Path::new(p).file_name().unwrap().to_str().unwrap();
                    let base = name.split('.').next().unwrap().to_string();
                    (base, name.to_string())
                })
                .collect()
        };

        let first = builder.build(Path::new("/rt"));
        let second = builder.build(Path::new("/rt"));
        assert_eq!(mapping(&first), mapping(&second));
        assert_eq!(mapping(&first)["X"], "X.ni.exe");
    }

    #[test]
    fn no_matches_yields_empty_string() {
        let builder = scenario_builder(vec!["readme.txt", "lib.so", ".dll"]);
        let list = builder.build(Path::new("/rt"));
        assert!(list.is_empty());
        assert_eq!(list.as_str(), "");

        let empty = scenario_builder(vec![]).build(Path::new("/rt"));
        assert_eq!(empty.into_string(), "");
    }

    #[test]
    fn unreadable_directory_yields_empty_list() {
        let builder = AssemblyListBuilder::new(exts(&["*.dll"])).with_source(Unreadable);
        let list = builder.build(Path::new("/rt"));
        assert!(list.is_empty());
        assert_eq!(list.to_string(), "");
    }

    #[test]
    fn every_entry_is_delimiter_terminated() {
        let builder = scenario_builder(vec!["A.dll", "C.exe"]);
        let list = builder.build(Path::new("/rt"));
        let expected = format!(
            "{}{d}{}{d}",
            full("/rt", "A.dll"),
            full("/rt", "C.exe"),
            d = PATH_DELIMITER
        );
        assert_eq!(list.as_str(), expected);
    }

    #[test]
    fn append_keeps_names_from_earlier_directories() {
        let builder = AssemblyListBuilder::new(exts(&["*.dll"]));
        let mut list = AssemblyList::new();

        let runtime = builder.clone().with_source(Listing(vec!["System.Runtime.dll"]));
        let app = builder.with_source(Listing(vec!["System.Runtime.dll", "App.dll"]));
        assert_eq!(runtime.append(Path::new("/rt"), &mut list), 1);
        assert_eq!(app.append(Path::new("/app"), &mut list), 1);

        let paths: Vec<_> = list.paths().map(str::to_string).collect();
        assert_eq!(
            paths,
            [full("/rt", "System.Runtime.dll"), full("/app", "App.dll")]
        );
    }

    #[test]
    fn growth_from_small_capacity_preserves_entries() {
        let mut list = AssemblyList::with_capacity(4);
        let mut expected_len = 0;
        let mut inserted = Vec::new();
        for i in 0..200 {
            let base = format!("Assembly{i}");
            let path = format!("/some/fairly/long/runtime/directory/{base}.dll");
            expected_len += path.len() + PATH_DELIMITER.len_utf8();
            assert!(list.insert(&base, &path));
            inserted.push(path);
        }

        assert_eq!(list.len(), 200);
        assert_eq!(list.as_str().len(), expected_len);
        let stored: Vec<_> = list.paths().map(str::to_string).collect();
        assert_eq!(stored, inserted);
    }

    #[test]
    fn delimiter_in_file_name_is_skipped() {
        struct WithDelimiter;

        impl EntrySource for WithDelimiter {
            fn file_names(&self, _directory: &Path) -> io::Result<Vec<String>> {
                Ok(vec![
                    format!("x{PATH_DELIMITER}System.Runtime.dll"),
                    "System.Runtime.dll".to_string(),
                    "Good.dll".to_string(),
                ])
            }
        }

        let builder =
            AssemblyListBuilder::new(exts(&["*.ni.dll", "*.dll"])).with_source(WithDelimiter);
        let list = builder.build(Path::new("/rt"));

        assert_eq!(list.len(), 2);
        assert_eq!(list.paths().count(), 2);
        assert_eq!(file_names(&list), ["Good.dll", "System.Runtime.dll"]);
    }

    #[test]
    fn delimiter_in_directory_yields_empty_list() {
        let dir = format!("/r{}t", PATH_DELIMITER);
        let list = scenario_builder(vec!["A.dll"]).build(Path::new(&dir));
        assert!(list.is_empty());
    }

    #[test]
    fn insert_refuses_paths_with_the_delimiter() {
        let mut list = AssemblyList::new();
        let path = format!("/one/Evil{}A.dll", PATH_DELIMITER);
        assert!(!list.insert("Evil", &path));
        assert!(list.is_empty());
        assert!(!list.contains("Evil"));
        assert_eq!(list.as_str(), "");
    }

    #[test]
    fn insert_refuses_duplicate_base_names() {
        let mut list = AssemblyList::new();
        assert!(list.insert("A", "/one/A.ni.dll"));
        assert!(!list.insert("A", "/one/A.dll"));
        assert_eq!(list.len(), 1);
        assert_eq!(list.paths().collect::<Vec<_>>(), ["/one/A.ni.dll"]);
    }
}
