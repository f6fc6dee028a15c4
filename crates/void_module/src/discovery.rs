//! Module discovery on disk

use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::io;
use std::path::{Path, PathBuf};

/// File name prefix that marks a library as a module
pub const DEFAULT_MODULE_PREFIX: &str = "module_";

/// Lists files under a directory
pub trait DirectoryLister {
    fn list(&self, dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>>;
}

/// Lists files through `std::fs`, sorted for a stable load order
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDirectoryLister;

impl FsDirectoryLister {
    fn walk(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if recursive {
                    Self::walk(&entry.path(), recursive, out)?;
                }
            } else {
                out.push(entry.path());
            }
        }
        Ok(())
    }
}

impl DirectoryLister for FsDirectoryLister {
    fn list(&self, dir: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        Self::walk(dir, recursive, &mut files)?;
        files.sort();
        Ok(files)
    }
}

/// Check if `path` names a module library: the platform library extension
/// and a file name starting with `prefix`, optionally after the platform
/// library prefix (`libmodule_audio.so`)
pub fn is_module_candidate(path: &Path, prefix: &str) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some(DLL_EXTENSION) {
        return false;
    }

    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(prefix)
        || (!DLL_PREFIX.is_empty()
            && name
                .strip_prefix(DLL_PREFIX)
                .is_some_and(|rest| rest.starts_with(prefix)))
}

/// Module name for a library path: the file stem without the platform
/// library prefix
pub fn module_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    let stem = if stem.starts_with(DEFAULT_MODULE_PREFIX) {
        stem
    } else {
        stem.strip_prefix(DLL_PREFIX).unwrap_or(stem)
    };
    stem.to_string()
}
