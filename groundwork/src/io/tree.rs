//! Scaffold tree rooted at a working directory.
//!
//! Every access is scoped to one call: files are read into a [`TextBuffer`],
//! edited in memory, and written back before the call returns.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::buffer::TextBuffer;
use crate::error::StepError;

/// Placeholder written into otherwise empty directories.
pub const KEEP_FILE: &str = ".keep";

/// The working directory a manifest mutates.
#[derive(Debug, Clone)]
pub struct ScaffoldTree {
    root: PathBuf,
}

impl ScaffoldTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of `rel`, refusing paths that leave the root.
    pub fn resolve(&self, rel: &Path) -> Result<PathBuf, StepError> {
        let escapes = rel.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || rel.as_os_str().is_empty() {
            return Err(StepError::PathEscape {
                path: rel.to_path_buf(),
            });
        }
        Ok(self.root.join(rel))
    }

    pub fn exists(&self, rel: &Path) -> Result<bool, StepError> {
        Ok(self.resolve(rel)?.exists())
    }

    pub fn read(&self, rel: &Path) -> Result<TextBuffer, StepError> {
        let abs = self.resolve(rel)?;
        let text = fs::read_to_string(&abs).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StepError::FileMissing {
                path: rel.to_path_buf(),
            },
            _ => StepError::io(rel, err),
        })?;
        let executable = is_executable(&abs).map_err(|err| StepError::io(rel, err))?;
        Ok(TextBuffer::from_text(&text).with_executable(executable))
    }

    #[instrument(skip_all, fields(path = %rel.display()))]
    pub fn write(&self, rel: &Path, buffer: &TextBuffer) -> Result<(), StepError> {
        self.write_bytes(rel, buffer.to_text().as_bytes())?;
        if buffer.executable {
            self.set_executable(rel)?;
        }
        Ok(())
    }

    pub fn write_bytes(&self, rel: &Path, bytes: &[u8]) -> Result<(), StepError> {
        let abs = self.resolve(rel)?;
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent).map_err(|err| StepError::io(rel, err))?;
        }
        debug!(bytes = bytes.len(), "writing file");
        fs::write(&abs, bytes).map_err(|err| StepError::io(rel, err))
    }

    /// Read `rel`, apply `edit`, and write the result back only if `edit` succeeds.
    pub fn edit<T, F>(&self, rel: &Path, edit: F) -> Result<T, StepError>
    where
        F: FnOnce(&mut TextBuffer) -> Result<T, StepError>,
    {
        let mut buffer = self.read(rel)?;
        let before = buffer.clone();
        let out = edit(&mut buffer)?;
        if buffer != before {
            self.write(rel, &buffer)?;
        }
        Ok(out)
    }

    /// Remove a file. Returns `false` when it was already absent.
    pub fn remove(&self, rel: &Path) -> Result<bool, StepError> {
        let abs = self.resolve(rel)?;
        match fs::remove_file(&abs) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StepError::io(rel, err)),
        }
    }

    /// Ensure a directory exists, optionally with a `.keep` placeholder inside.
    pub fn create_dir(&self, rel: &Path, keep: bool) -> Result<(), StepError> {
        let abs = self.resolve(rel)?;
        fs::create_dir_all(&abs).map_err(|err| StepError::io(rel, err))?;
        if keep {
            let marker = abs.join(KEEP_FILE);
            if !marker.exists() {
                fs::write(&marker, b"").map_err(|err| StepError::io(rel.join(KEEP_FILE), err))?;
            }
        }
        Ok(())
    }

    pub fn set_executable(&self, rel: &Path) -> Result<(), StepError> {
        let abs = self.resolve(rel)?;
        if !abs.is_file() {
            return Err(StepError::FileMissing {
                path: rel.to_path_buf(),
            });
        }
        make_executable(&abs).map_err(|err| StepError::io(rel, err))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> std::io::Result<bool> {
    Ok(false)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_escaping_paths() {
        let tree = ScaffoldTree::new("/tmp/app");
        for bad in ["../etc/passwd", "/etc/passwd", "a/../../b", ""] {
            let err = tree.resolve(Path::new(bad)).unwrap_err();
            assert!(matches!(err, StepError::PathEscape { .. }), "{bad}");
        }
        assert_eq!(
            tree.resolve(Path::new("config/routes.rb")).expect("resolve"),
            PathBuf::from("/tmp/app/config/routes.rb")
        );
    }

    #[test]
    fn read_missing_file_is_file_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = ScaffoldTree::new(temp.path());
        let err = tree.read(Path::new("nope.rb")).unwrap_err();
        assert!(matches!(err, StepError::FileMissing { .. }));
    }

    #[test]
    fn write_creates_parents_and_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = ScaffoldTree::new(temp.path());
        let rel = Path::new("config/environments/test.rb");
        tree.write(rel, &TextBuffer::from_text("a\nb\n")).expect("write");
        assert_eq!(tree.read(rel).expect("read").to_text(), "a\nb\n");
    }

    #[test]
    fn failed_edit_leaves_file_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = ScaffoldTree::new(temp.path());
        let rel = Path::new("a.txt");
        tree.write_bytes(rel, b"original\n").expect("write");

        let result: Result<(), StepError> = tree.edit(rel, |buffer| {
            buffer.lines.push("partial".to_string());
            Err(StepError::FileMissing {
                path: PathBuf::from("other"),
            })
        });
        assert!(result.is_err());
        assert_eq!(
            fs::read_to_string(temp.path().join(rel)).expect("read"),
            "original\n"
        );
    }

    #[test]
    fn create_dir_with_keep_writes_placeholder() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = ScaffoldTree::new(temp.path());
        tree.create_dir(Path::new("app/services"), true).expect("mkdir");
        tree.create_dir(Path::new("app/services"), true).expect("mkdir again");
        assert!(temp.path().join("app/services/.keep").is_file());
    }

    #[test]
    fn remove_absent_file_is_noop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = ScaffoldTree::new(temp.path());
        assert!(!tree.remove(Path::new("gone.rb")).expect("remove"));
    }

    #[cfg(unix)]
    #[test]
    fn set_executable_marks_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = ScaffoldTree::new(temp.path());
        let rel = Path::new("bin/setup");
        tree.write_bytes(rel, b"#!/bin/sh\n").expect("write");
        tree.set_executable(rel).expect("chmod");
        assert!(tree.read(rel).expect("read").executable);

        let err = tree.set_executable(Path::new("bin/missing")).unwrap_err();
        assert!(matches!(err, StepError::FileMissing { .. }));
    }
}
