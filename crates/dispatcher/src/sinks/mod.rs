//! Sink implementations

mod console;
mod csv;
mod jsonl;
mod memory;

pub use console::ConsoleSink;
pub use csv::CsvSink;
pub use jsonl::JsonlSink;
pub use memory::{MemorySink, MemorySinkReader};

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// `path` parameter of file sinks
pub(crate) fn path_param(params: &HashMap<String, String>) -> io::Result<PathBuf> {
    params.get("path").map(PathBuf::from).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "missing 'path' parameter")
    })
}

/// Open for append, creating parent directories
///
/// Returns the file and whether it was empty before opening.
pub(crate) fn open_append(path: &Path) -> io::Result<(File, bool)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let was_empty = file.metadata()?.len() == 0;
    Ok((file, was_empty))
}
