//! Application directories: discovery and loading.
//!
//! An application is a directory of `*.lua` files. Its runtime is named
//! after the directory and the files are evaluated in file-name order.

use anyhow::{Context, Result};
use ate_lua::RuntimeManager;
use std::path::{Path, PathBuf};
use tracing::info;

/// Lists the subdirectories of `root`, sorted.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("cannot read apps directory {}", root.display()))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Lists the `*.lua` files directly inside `dir`, sorted.
pub fn scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read app directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "lua") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Runtime name for an app directory.
pub fn app_name(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("cannot derive app name from {}", dir.display()))
}

/// Creates one runtime per directory and loads its scripts.
///
/// Returns the runtime names in load order.
pub fn load(manager: &RuntimeManager, dirs: &[PathBuf]) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let name = app_name(dir)?;
        let files = scripts(dir)?;
        let runtime = manager
            .create_runtime(&name)
            .with_context(|| format!("cannot create runtime '{name}'"))?;
        runtime
            .load_script_files(&files)
            .with_context(|| format!("cannot load app '{name}'"))?;
        info!(app = %name, scripts = files.len(), "app loaded");
        names.push(name);
    }
    Ok(names)
}
