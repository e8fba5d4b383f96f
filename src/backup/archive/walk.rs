use crate::backup::archive::ExclusionRules;
use crate::backup::function_path;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithFnName;

use dyn_iter::{DynIter, IntoDynIterator};
use function_name::named;
use itertools::Itertools;
use walkdir::{DirEntry, WalkDir};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A file selected for an archive and the name it is stored under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub src: PathBuf,
    /// Path relative to the walked root, `/` separated
    pub name: String,
}

/// Walks `root` recursively and yields every file that is not excluded.
///
/// Directories are skipped, so are entries whose real path cannot be
/// resolved (broken symlinks, symlink loops).
#[named]
pub fn archive_entries<'a>(
    root: &Path,
    exclusions: &'a ExclusionRules,
) -> DynIter<'a, Result<ArchiveEntry>> {
    tracing::debug!("Scanning directory {:?}", root);
    let base = root.to_path_buf();

    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(move |res| match res {
            Ok(de) => process_dir_entry(de, &base, exclusions),
            Err(e) => {
                let unresolvable = e.loop_ancestor().is_some()
                    || e.io_error().map(std::io::Error::kind) == Some(ErrorKind::NotFound);
                if unresolvable {
                    tracing::warn!("Skipping file with invalid path {:?}: {e}", e.path());
                    None
                } else {
                    Some(Err(e.into()))
                }
            }
        })
        .map(move |res| res.with_fn_name(function_path!()))
        .into_dyn_iter()
}

fn process_dir_entry(
    de: DirEntry,
    base: &Path,
    exclusions: &ExclusionRules,
) -> Option<Result<ArchiveEntry>> {
    if de.file_type().is_dir() {
        tracing::trace!("Skipping {:?} not a file", de.path());
        return None;
    }

    let path = de.into_path();
    if let Err(e) = std::fs::canonicalize(&path) {
        tracing::warn!("Skipping file with invalid path {:?}: {e}", path);
        return None;
    }

    let name = match relative_name(base, &path) {
        Ok(name) => name,
        Err(e) => return Some(Err(e)),
    };
    if name.is_empty() {
        tracing::warn!("Skipping file with empty relative path {:?}", path);
        return None;
    }
    if exclusions.matches(&name) {
        tracing::info!("Skipping excluded file: {name}");
        return None;
    }

    tracing::debug!("Adding file: {:?}", path);
    Some(Ok(ArchiveEntry { src: path, name }))
}

/// `path` relative to `base`, joined with `/` whatever the platform.
pub fn relative_name(base: &Path, path: &Path) -> Result<String> {
    Ok(path
        .strip_prefix(base)?
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_files(dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir.join("public/cache"))?;
        std::fs::create_dir_all(dir.join("empty"))?;
        std::fs::write(dir.join(".gitignore"), "*")?;
        std::fs::write(dir.join("a.txt"), "a")?;
        std::fs::write(dir.join("public/logo.png"), "png")?;
        std::fs::write(dir.join("public/cache/1.bin"), "cache")?;
        Ok(())
    }

    fn names(root: &Path, exclusions: &ExclusionRules) -> Vec<String> {
        archive_entries(root, exclusions)
            .map(|e| e.unwrap().name)
            .sorted()
            .collect()
    }

    #[test]
    fn test_archive_entries_lists_files_only() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();

        assert_eq!(
            names(temp_dir.path(), &ExclusionRules::default()),
            vec![".gitignore", "a.txt", "public/cache/1.bin", "public/logo.png"]
        );
    }

    #[test]
    fn test_archive_entries_applies_exclusions() {
        let temp_dir = TempDir::new().unwrap();
        create_test_files(temp_dir.path()).unwrap();
        let exclusions = ExclusionRules::new([".gitignore", "public/cache"]);

        assert_eq!(
            names(temp_dir.path(), &exclusions),
            vec!["a.txt", "public/logo.png"]
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_archive_entries_skips_broken_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("gone.txt"),
            temp_dir.path().join("dangling.txt"),
        )
        .unwrap();

        assert_eq!(
            names(temp_dir.path(), &ExclusionRules::default()),
            vec!["a.txt"]
        );
    }

    #[test]
    fn test_relative_name() {
        let name = relative_name(Path::new("/srv/storage"), Path::new("/srv/storage/a/b.txt"));
        assert_eq!(name.unwrap(), "a/b.txt");
        assert!(relative_name(Path::new("/srv/storage"), Path::new("/etc/passwd")).is_err());
    }
}
