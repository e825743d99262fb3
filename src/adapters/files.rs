//! Flash filesystem adapter.
//!
//! Implements [`FileStore`] over `std::fs` rooted at one directory.
//!
//! - **`target_os = "espidf"`**: the root is a SPIFFS partition mounted
//!   through the ESP-IDF VFS, so plain `std::fs` calls reach flash.
//! - **all other targets**: any host directory (tests use a temp dir).
//!
//! Names are flat; a name with path separators is rejected.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{info, warn};

use super::utils::is_plain_file_name;
use crate::app::ports::{FileStore, StorageError};

/// VFS mount point of the data partition.
pub const SPIFFS_BASE_PATH: &str = "/spiffs";

fn map_io(e: &io::Error) -> StorageError {
    match e.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound,
        io::ErrorKind::StorageFull => StorageError::Full,
        _ => StorageError::IoError,
    }
}

pub struct FsFileStore {
    root: PathBuf,
    /// Serialises writers from the decoder and scheduler threads.
    write_lock: Mutex<()>,
}

impl FsFileStore {
    /// Store rooted at an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Register the SPIFFS partition with the VFS and return a store on it.
    #[cfg(target_os = "espidf")]
    pub fn mount_spiffs() -> Result<Self, StorageError> {
        use esp_idf_svc::sys::*;

        let Ok(base) = std::ffi::CString::new(SPIFFS_BASE_PATH) else {
            return Err(StorageError::IoError);
        };
        let conf = esp_vfs_spiffs_conf_t {
            base_path: base.as_ptr(),
            partition_label: core::ptr::null(),
            max_files: 8,
            format_if_mount_failed: true,
        };
        // SAFETY: `conf` and `base` outlive the call; the VFS copies the path.
        let ret = unsafe { esp_vfs_spiffs_register(&conf) };
        if ret != ESP_OK as esp_err_t {
            log::error!("SPIFFS: mount failed ({})", ret);
            return Err(StorageError::IoError);
        }
        let (mut total, mut used) = (0usize, 0usize);
        if unsafe { esp_spiffs_info(core::ptr::null(), &mut total, &mut used) } == ESP_OK as esp_err_t {
            info!("SPIFFS: mounted at {} ({} / {} bytes used)", SPIFFS_BASE_PATH, used, total);
        }
        Ok(Self::new(SPIFFS_BASE_PATH))
    }

    /// Host stand-in for the SPIFFS mount: creates `root` if needed.
    #[cfg(not(target_os = "espidf"))]
    pub fn mount_sim(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| map_io(&e))?;
        info!("FileStore(sim): rooted at {}", root.display());
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if !is_plain_file_name(name) {
            warn!("FileStore: rejected file name {:?}", name);
            return Err(StorageError::IoError);
        }
        Ok(self.root.join(name))
    }

    fn with_write_lock<T>(&self, f: impl FnOnce() -> io::Result<T>) -> Result<T, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        f().map_err(|e| map_io(&e))
    }
}

impl FileStore for FsFileStore {
    fn read_lines(&self, name: &str) -> Result<Vec<String>, StorageError> {
        let path = self.path(name)?;
        let file = File::open(path).map_err(|e| map_io(&e))?;
        let mut lines = Vec::new();
        for raw in BufReader::new(file).split(b'\n') {
            let raw = raw.map_err(|e| map_io(&e))?;
            let text = String::from_utf8_lossy(&raw);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        Ok(lines)
    }

    fn write_lines(&self, name: &str, lines: &[String]) -> Result<(), StorageError> {
        let path = self.path(name)?;
        self.with_write_lock(|| {
            let mut file = File::create(&path)?;
            for line in lines {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")?;
            }
            file.flush()
        })
    }

    fn append_line(&self, name: &str, line: &str) -> Result<(), StorageError> {
        let path = self.path(name)?;
        self.with_write_lock(|| {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")
        })
    }

    fn truncate(&self, name: &str) -> Result<(), StorageError> {
        let path = self.path(name)?;
        self.with_write_lock(|| File::create(&path).map(|_| ()))
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_ok_and(|p| p.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> FsFileStore {
        let dir = std::env::temp_dir().join(format!(
            "autosampler-files-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        FsFileStore::mount_sim(&dir).unwrap()
    }

    #[test]
    fn write_then_read_lines() {
        let store = temp_store("rw");
        let lines = vec!["/2O05R at 2025-03-01 08:00:00".to_string(), String::new()];
        store.write_lines("schedule.txt", &lines).unwrap();
        assert_eq!(store.read_lines("schedule.txt").unwrap(), lines);
        assert!(store.exists("schedule.txt"));
    }

    #[test]
    fn append_and_truncate() {
        let store = temp_store("append");
        store.append_line("log.txt", "one").unwrap();
        store.append_line("log.txt", "two").unwrap();
        assert_eq!(store.read_lines("log.txt").unwrap(), vec!["one", "two"]);
        store.truncate("log.txt").unwrap();
        assert!(store.read_lines("log.txt").unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_not_found() {
        let store = temp_store("missing");
        assert_eq!(store.read_lines("nope.txt"), Err(StorageError::NotFound));
        assert!(!store.exists("nope.txt"));
    }

    #[test]
    fn crlf_is_stripped() {
        let store = temp_store("crlf");
        fs::write(store.root().join("seq.txt"), "RINSE 2\r\nPUMP 3\r\n").unwrap();
        assert_eq!(store.read_lines("seq.txt").unwrap(), vec!["RINSE 2", "PUMP 3"]);
    }

    #[test]
    fn path_escape_is_rejected() {
        let store = temp_store("escape");
        assert_eq!(store.truncate("../x.txt"), Err(StorageError::IoError));
    }
}
