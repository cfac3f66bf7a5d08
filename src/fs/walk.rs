//! Recursive pattern-matching walk over a task work dir, with the
//! depth/hidden/link controls declared on file output params.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};

use process::PathType;

#[derive(Debug, Clone, Copy)]
pub struct WalkOpts {
    pub hidden: bool,
    pub follow_links: bool,
    pub max_depth: Option<usize>,
    pub path_type: PathType,
}

/// All entries under `root` whose work-dir-relative path matches
/// `pattern`, sorted lexicographically by that relative path.
pub fn walk_matches(root: &Path, pattern: &str, opts: &WalkOpts) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(pattern)
        .with_context(|| format!("while compiling output pattern `{pattern}`"))?;
    let match_opts = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: !opts.hidden,
    };

    let mut rel = PathBuf::new();
    let mut found = Vec::new();
    visit(root, &mut rel, 1, &pattern, &match_opts, opts, &mut found)?;
    found.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(found.into_iter().map(|(abs, _)| abs).collect())
}

fn visit(
    dir: &Path,
    rel: &mut PathBuf,
    depth: usize,
    pattern: &Pattern,
    match_opts: &MatchOptions,
    opts: &WalkOpts,
    found: &mut Vec<(PathBuf, String)>,
) -> Result<()> {
    if let Some(max) = opts.max_depth {
        if depth > max {
            return Ok(());
        }
    }
    for entry in fs::read_dir(dir).with_context(|| format!("while walking {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        rel.push(&name);

        let file_type = entry.file_type()?;
        // without follow_links a symlink counts as whatever it is, but we
        // never descend through it:
        let (is_dir, descend) = if file_type.is_symlink() {
            if opts.follow_links {
                let meta = fs::metadata(entry.path());
                let is_dir = meta.map(|m| m.is_dir()).unwrap_or(false);
                (is_dir, is_dir)
            } else {
                (false, false)
            }
        } else {
            (file_type.is_dir(), file_type.is_dir())
        };

        let rel_str = rel.to_string_lossy().into_owned();
        let type_ok = match opts.path_type {
            PathType::File => !is_dir,
            PathType::Dir => is_dir,
            PathType::Any => true,
        };
        if type_ok && pattern.matches_with(&rel_str, *match_opts) {
            found.push((entry.path(), rel_str));
        }

        if descend {
            visit(&entry.path(), rel, depth + 1, pattern, match_opts, opts, found)?;
        }
        rel.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn opts() -> WalkOpts {
        WalkOpts {
            hidden: false,
            follow_links: false,
            max_depth: None,
            path_type: PathType::Any,
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_sorted_matches() -> Result<()> {
        let dir = tempdir()?;
        touch(&dir.path().join("b.txt"));
        touch(&dir.path().join("a.txt"));
        touch(&dir.path().join("c.log"));

        let matches = walk_matches(dir.path(), "*.txt", &opts())?;
        let names: Vec<_> = matches
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        Ok(())
    }

    #[test]
    fn test_hidden_excluded_by_default() -> Result<()> {
        let dir = tempdir()?;
        touch(&dir.path().join(".hidden.txt"));
        touch(&dir.path().join("plain.txt"));

        assert_eq!(walk_matches(dir.path(), "*.txt", &opts())?.len(), 1);

        let mut with_hidden = opts();
        with_hidden.hidden = true;
        assert_eq!(walk_matches(dir.path(), "*.txt", &with_hidden)?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_recursive_and_depth() -> Result<()> {
        let dir = tempdir()?;
        touch(&dir.path().join("top.txt"));
        touch(&dir.path().join("sub/inner.txt"));
        touch(&dir.path().join("sub/deeper/deep.txt"));

        let all = walk_matches(dir.path(), "**/*.txt", &opts())?;
        assert_eq!(all.len(), 3);

        let mut shallow = opts();
        shallow.max_depth = Some(2);
        let two = walk_matches(dir.path(), "**/*.txt", &shallow)?;
        assert_eq!(two.len(), 2);
        Ok(())
    }

    #[test]
    fn test_type_filter() -> Result<()> {
        let dir = tempdir()?;
        touch(&dir.path().join("out/part.txt"));

        let mut dirs_only = opts();
        dirs_only.path_type = PathType::Dir;
        let matches = walk_matches(dir.path(), "out", &dirs_only)?;
        assert_eq!(matches.len(), 1);

        let mut files_only = opts();
        files_only.path_type = PathType::File;
        assert!(walk_matches(dir.path(), "out", &files_only)?.is_empty());
        Ok(())
    }
}
