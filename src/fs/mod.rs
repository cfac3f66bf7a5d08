use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::{Context, Result};

use util::PathEncodingError;

/// Utility fns
mod ops;
pub use ops::{copy, symlink};

/// Work-dir artifact names and derived paths
pub mod paths;

/// Script assembly: shebang, env exports, capture epilogue
pub mod script;

/// Pattern-matching walk over a work dir
pub mod walk;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Path is neither file nor dir: {0}")]
    UnknownPathType(String),
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
}

/// All destructive file operations in the crate go through this struct.
///
/// Writes and deletes check that the path in question is a child of one of
/// the whitelisted prefixes (the executor work root, the stage dir, the
/// session staging dir, store dirs), otherwise they are refused. Task
/// scripts themselves are outside this net; the user owns what they run.
#[derive(Debug, Clone, Default)]
pub struct Fs {
    prefixes: Vec<PathBuf>,
}

impl Fs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whitelist a prefix for destructive operations.
    pub fn allow(&mut self, prefix: &Path) {
        self.prefixes.push(prefix.to_path_buf());
    }

    /// Check if path exists on disk.
    pub fn exists<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        path.exists() || path.is_symlink()
    }

    /// Create a directory (and any missing parents).
    pub fn create_dir<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::create_dir_all(path).context("creating dir")?;
        Ok(())
    }

    /// Create a file, and return a writable handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let f = fs::File::create(path).context("creating file")?;
        Ok(f)
    }

    /// Write an entire str to a file.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::write(path, text).context("writing file")?;
        Ok(())
    }

    /// Symlink `link` to `tgt`.
    pub fn symlink<T: AsRef<Path>, U: AsRef<Path>>(&self, tgt: T, link: U) -> Result<()> {
        let (tgt, link) = (tgt.as_ref(), link.as_ref());
        self.check_whitelist(link)?;
        ops::symlink(tgt, link)
            .with_context(|| format!("symlinking {:?} to {:?}", link, tgt))?;
        Ok(())
    }

    /// Copy `src` to `tgt`, recursively if `src` is a directory.
    pub fn copy<T: AsRef<Path>, U: AsRef<Path>>(&self, src: T, tgt: U) -> Result<()> {
        let (src, tgt) = (src.as_ref(), tgt.as_ref());
        self.check_whitelist(tgt)?;
        ops::copy(src, tgt).context("copying file")?;
        Ok(())
    }

    /// Read an entire file into a String.
    pub fn read_to_string<T: AsRef<Path>>(&self, path: T) -> Result<String, io::Error> {
        fs::read_to_string(path)
    }

    fn is_whitelisted(&self, path: &Path) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p))
    }

    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if self.is_whitelisted(path) {
            Ok(())
        } else {
            Err(Error::NotWhitelisted(path.to_str().ok_or(PathEncodingError)?.to_owned()).into())
        }
    }
}
