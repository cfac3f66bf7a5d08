use std::fs;
use std::path::Path;

use anyhow::Result;

use util::PathEncodingError;

use super::Error;

/// Copy `src` to `tgt`, recursively if needed. Symlinks are preserved.
pub fn copy(src: &Path, tgt: &Path) -> Result<()> {
    if src.is_symlink() {
        let link_tgt = fs::read_link(src)?;
        symlink(&link_tgt, tgt)?;
    } else if src.is_file() {
        fs::copy(src, tgt)?;
    } else if src.is_dir() {
        cp_dir(src, tgt)?;
    } else {
        return Err(
            Error::UnknownPathType(src.to_str().ok_or(PathEncodingError)?.to_owned()).into(),
        );
    }
    Ok(())
}

fn cp_dir(src: &Path, tgt: &Path) -> Result<()> {
    fs::create_dir_all(tgt)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_entry = entry.path();
        let tgt_entry = tgt.join(entry.file_name());
        if ty.is_symlink() {
            let link_tgt = fs::read_link(&src_entry)?;
            symlink(&link_tgt, &tgt_entry)?;
        } else if ty.is_dir() {
            cp_dir(&src_entry, &tgt_entry)?;
        } else if ty.is_file() {
            fs::copy(&src_entry, &tgt_entry)?;
        } else {
            return Err(Error::UnknownPathType(
                entry.path().to_str().ok_or(PathEncodingError)?.to_owned(),
            )
            .into());
        }
    }
    Ok(())
}

/// Symlink the given `link` to `tgt`; works for unix and windows.
pub fn symlink(tgt: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(tgt, link)?;

    #[cfg(windows)]
    if tgt.is_dir() {
        std::os::windows::fs::symlink_dir(tgt, link)?;
    } else {
        std::os::windows::fs::symlink_file(tgt, link)?;
    }
    Ok(())
}
