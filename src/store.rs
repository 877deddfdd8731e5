use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::crypto::{Cipher, Gpg};
use crate::error::StoreError;

pub const STORE_DIR: &str = ".password-store";
pub const STORE_DIR_ENV: &str = "PASSWORD_STORE_DIR";
pub const GPG_ID_FILE: &str = ".gpg-id";
const ENTRY_SUFFIX: &str = ".gpg";

/// `(directories, entries)` directly below a store path, as basenames.
pub type Listing = (Vec<String>, Vec<String>);

/// The operations the UI needs from a hierarchical password store.
///
/// Paths are `/`-separated and relative to the store root; the root itself
/// is the empty string. An entry and a folder may share a name, so
/// `move_path` and `remove_path` take a trailing `/` to mean the folder.
pub trait PasswordStore {
    fn list_dir(&self, path: &str) -> Result<Listing, StoreError>;
    fn get_key(&self, path: &str) -> Result<String, StoreError>;
    fn set_key(&self, path: &str, content: &str, force: bool) -> Result<(), StoreError>;
    fn move_path(&self, old: &str, new: &str) -> Result<(), StoreError>;
    fn remove_path(&self, path: &str, recursive: bool) -> Result<(), StoreError>;
    fn contains(&self, path: &str) -> bool;
}

/// A `pass(1)` compatible store: one gpg-encrypted file per entry.
pub struct PassStore<C: Cipher = Gpg> {
    root: PathBuf,
    cipher: C,
}

pub fn default_store_dir() -> Result<PathBuf, StoreError> {
    if let Some(dir) = std::env::var_os(STORE_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| StoreError::Init("could not determine home directory".into()))?;
    Ok(home.join(STORE_DIR))
}

impl PassStore<Gpg> {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(default_store_dir()?, Gpg::from_env())
    }
}

impl<C: Cipher> PassStore<C> {
    pub fn open(root: impl Into<PathBuf>, cipher: C) -> Result<Self, StoreError> {
        let root = root.into();
        let meta = fs::metadata(&root)
            .map_err(|e| StoreError::Init(format!("{}: {e}", root.display())))?;
        if !meta.is_dir() {
            return Err(StoreError::Init(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        if !root.join(GPG_ID_FILE).is_file() {
            return Err(StoreError::Init(format!(
                "{} has no {GPG_ID_FILE}; run `pass init` first",
                root.display()
            )));
        }
        debug!(store = %root.display(), "opened password store");
        Ok(Self { root, cipher })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let normalized = normalize(path)?;
        let mut dir = self.root.clone();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            dir.push(segment);
        }
        Ok(dir)
    }

    fn entry_file(&self, path: &str) -> Result<PathBuf, StoreError> {
        let normalized = normalize(path)?;
        if normalized.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut file = self.dir_path(&normalized)?;
        let name = format!(
            "{}{ENTRY_SUFFIX}",
            file.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );
        file.set_file_name(name);
        Ok(file)
    }

    /// Recipients from the nearest `.gpg-id`, searching upwards to the root.
    fn recipients(&self, entry_file: &Path) -> Result<Vec<String>, StoreError> {
        let mut dir = entry_file.parent();
        while let Some(current) = dir {
            let candidate = current.join(GPG_ID_FILE);
            if candidate.is_file() {
                let raw = fs::read_to_string(&candidate)?;
                return Ok(raw
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string)
                    .collect());
            }
            if current == self.root.as_path() {
                break;
            }
            dir = current.parent();
        }
        Err(StoreError::Crypto(format!("no {GPG_ID_FILE} found")))
    }
}

impl<C: Cipher> PasswordStore for PassStore<C> {
    fn list_dir(&self, path: &str) -> Result<Listing, StoreError> {
        let dir = self.dir_path(path)?;
        let read_dir = fs::read_dir(&dir).map_err(|e| StoreError::from_io(path, e))?;

        let mut directories = Vec::new();
        let mut entries = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| StoreError::from_io(path, e))?;
            let name = item.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            // follow symlinks, pass stores may link shared folders in
            let meta = match fs::metadata(item.path()) {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(path, name, "skipping unreadable item: {e}");
                    continue;
                }
            };
            if meta.is_dir() {
                directories.push(name);
            } else if let Some(stem) = name.strip_suffix(ENTRY_SUFFIX) {
                if !stem.is_empty() {
                    entries.push(stem.to_string());
                }
            }
        }
        directories.sort();
        entries.sort();
        Ok((directories, entries))
    }

    fn get_key(&self, path: &str) -> Result<String, StoreError> {
        let file = self.entry_file(path)?;
        let ciphertext = fs::read(&file).map_err(|e| StoreError::from_io(path, e))?;
        let plaintext = self.cipher.decrypt(&ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|_| StoreError::Crypto(format!("'{path}' is not valid UTF-8")))
    }

    fn set_key(&self, path: &str, content: &str, force: bool) -> Result<(), StoreError> {
        let file = self.entry_file(path)?;
        if !force && file.exists() {
            return Err(StoreError::AlreadyExists(normalize(path)?));
        }
        let recipients = self.recipients(&file)?;
        let ciphertext = self.cipher.encrypt(&recipients, content.as_bytes())?;
        ensure_parent_dir(&file).map_err(|e| StoreError::from_io(path, e))?;
        atomic_write(&file, &ciphertext).map_err(|e| StoreError::from_io(path, e))?;
        restrict_file(&file)?;
        debug!(path, "stored entry");
        Ok(())
    }

    fn move_path(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let old_n = normalize(old)?;
        let mut new_n = normalize(new)?;
        if old_n.is_empty() {
            return Err(StoreError::InvalidPath(old.to_string()));
        }
        if new_n.is_empty() && !new.ends_with('/') {
            return Err(StoreError::InvalidPath(new.to_string()));
        }

        let old_file = self.entry_file(&old_n)?;
        let old_dir = self.dir_path(&old_n)?;
        let is_entry = !old.ends_with('/') && old_file.is_file();
        if !is_entry && !old_dir.is_dir() {
            return Err(StoreError::NotFound(old_n));
        }

        // `pass mv a b/` and `pass mv a existing-folder` both move into the folder
        if new.ends_with('/') || (new_n != old_n && self.dir_path(&new_n)?.is_dir()) {
            let base = old_n.rsplit('/').next().unwrap_or(&old_n);
            new_n = join_path(&new_n, base);
        }
        if !is_entry && (new_n == old_n || new_n.starts_with(&format!("{old_n}/"))) {
            return Err(StoreError::InvalidPath(new.to_string()));
        }

        let (src, dst) = if is_entry {
            (old_file, self.entry_file(&new_n)?)
        } else {
            (old_dir, self.dir_path(&new_n)?)
        };
        if dst.exists() {
            return Err(StoreError::AlreadyExists(new_n));
        }
        ensure_parent_dir(&dst).map_err(|e| StoreError::from_io(&new_n, e))?;
        fs::rename(&src, &dst).map_err(|e| StoreError::from_io(&old_n, e))?;
        info!(from = %old_n, to = %new_n, "moved store path");
        Ok(())
    }

    fn remove_path(&self, path: &str, recursive: bool) -> Result<(), StoreError> {
        let normalized = normalize(path)?;
        if normalized.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let file = self.entry_file(&normalized)?;
        let dir = self.dir_path(&normalized)?;
        if !path.ends_with('/') && file.is_file() {
            fs::remove_file(&file).map_err(|e| StoreError::from_io(&normalized, e))?;
        } else if dir.is_dir() {
            let removed = if recursive {
                fs::remove_dir_all(&dir)
            } else {
                fs::remove_dir(&dir)
            };
            removed.map_err(|e| StoreError::from_io(&normalized, e))?;
        } else {
            return Err(StoreError::NotFound(normalized));
        }
        info!(path = %normalized, recursive, "removed store path");
        Ok(())
    }

    fn contains(&self, path: &str) -> bool {
        self.entry_file(path).map(|f| f.is_file()).unwrap_or(false)
    }
}

/// Trim surrounding slashes and reject segments that could escape the store.
pub fn normalize(path: &str) -> Result<String, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.contains('\\'))
    {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Join a folder (with or without slashes) and a name into a store path.
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    let name = name.trim_matches('/');
    match (folder.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => folder.to_string(),
        (false, false) => format!("{folder}/{name}"),
    }
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    let mut missing = Vec::new();
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.exists() {
            break;
        }
        missing.push(dir);
        current = dir.parent();
    }
    for dir in missing.into_iter().rev() {
        fs::create_dir(dir)?;
        restrict_dir(dir)?;
    }
    Ok(())
}

pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("invalid target path"))?;
    if !parent.exists() {
        fs::create_dir_all(parent)?;
        restrict_dir(parent)?;
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub(crate) fn restrict_file(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(())
}

pub(crate) fn restrict_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use tempfile::TempDir;

    use super::*;
    use crate::crypto::PlainCipher;

    /// A store in a temp dir holding `entries` (path, content), stored in plaintext.
    pub fn temp_store(entries: &[(&str, &str)]) -> (TempDir, PassStore<PlainCipher>) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(GPG_ID_FILE), "test@example.com\n").unwrap();
        let store = PassStore::open(dir.path(), PlainCipher).unwrap();
        for (path, content) in entries {
            store.set_key(path, content, false).unwrap();
        }
        (dir, store)
    }
}
