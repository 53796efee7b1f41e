//! Filesystem gateway used to persist zone files and the Corefile

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// The file operations the repository needs. Writes replace the whole file.
pub trait Filesystem: Send + Sync {
    fn load_text_file(&self, path: &Path) -> io::Result<String>;

    fn write_text_file(&self, path: &Path, text: &str) -> io::Result<()>;

    fn delete_file(&self, path: &Path) -> io::Result<()>;

    /// Names of the regular files directly inside `directory`. Hidden files
    /// (temporary files among them) are skipped.
    fn list_filenames(&self, directory: &Path) -> io::Result<Vec<String>>;

    fn create_dir_all(&self, _directory: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// Local disk. Writes go to a hidden temporary file next to the target which
/// is synced and then renamed over it, so readers see either the old or the
/// new content, never a torn file.
#[derive(Debug, Default, Clone)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> LocalFilesystem {
        LocalFilesystem
    }

    fn temp_path(path: &Path) -> io::Result<PathBuf> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", path.display()),
                )
            })?;

        Ok(path.with_file_name(format!(".{}.tmp", file_name)))
    }
}

impl Filesystem for LocalFilesystem {
    fn load_text_file(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn write_text_file(&self, path: &Path, text: &str) -> io::Result<()> {
        let tmp = LocalFilesystem::temp_path(path)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        // Persist the rename itself
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if let Ok(dir) = File::open(dir) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn list_filenames(&self, directory: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let directory = if directory.as_os_str().is_empty() {
            Path::new(".")
        } else {
            directory
        };

        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => names.push(name),
                Ok(_) => {}
                Err(name) => log::warn!("Skipping non UTF-8 file name {:?}", name),
            }
        }

        names.sort();
        Ok(names)
    }

    fn create_dir_all(&self, directory: &Path) -> io::Result<()> {
        if directory.as_os_str().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(directory)
    }
}

/// Filesystem kept in memory, for embedding the store without touching disk
#[derive(Debug, Default)]
pub struct MemoryFilesystem {
    files: Mutex<BTreeMap<PathBuf, String>>,
}

impl MemoryFilesystem {
    pub fn new() -> MemoryFilesystem {
        MemoryFilesystem::default()
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }
}

impl Filesystem for MemoryFilesystem {
    fn load_text_file(&self, path: &Path) -> io::Result<String> {
        self.files.lock().get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn write_text_file(&self, path: &Path, text: &str) -> io::Result<()> {
        self.files.lock().insert(path.to_path_buf(), text.to_string());
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.files.lock().remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn list_filenames(&self, directory: &Path) -> io::Result<Vec<String>> {
        let files = self.files.lock();
        Ok(files
            .keys()
            .filter(|path| path.parent() == Some(directory))
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .filter(|name| !name.starts_with('.'))
            .map(|name| name.to_string())
            .collect())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path.display()))
}
