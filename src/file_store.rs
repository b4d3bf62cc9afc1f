//! Small file-system collaborator used by both persistence layers.
//!
//! The bracket controller and the ladder stores never touch `std::fs`
//! directly; they go through a [`FileStore`] pointed at a data directory.
//! Tests construct stores against temporary directories.

use std::fs;
use std::path::Path;

use anyhow::Context;

/// Read / atomically write / delete files under a data directory.
#[derive(Debug, Clone, Default)]
pub struct FileStore;

impl FileStore {
    /// Returns the file contents, or `None` if the file does not exist.
    pub fn read_if_exists(&self, path: &Path) -> anyhow::Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Replaces the file atomically: the contents are written to a sibling
    /// temporary file which is then renamed over the target, so readers
    /// never observe a partial file.
    pub fn write_atomic(&self, path: &Path, contents: &str) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = Path::new(&tmp);
        fs::write(tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(tmp, path)
            .with_context(|| format!("renaming {} over {}", tmp.display(), path.display()))
    }

    /// Deletes the file if it exists; missing files are not an error.
    pub fn remove_if_exists(&self, path: &Path) -> anyhow::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}
