//! Getting local files into the directory Whisparr expects.

use crate::logging::truncate_path;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Translates between Whisparr-side and local paths.
///
/// Keys are Whisparr path prefixes, values the local prefixes they are
/// mounted at. The longest matching prefix wins; unmatched paths pass through.
#[derive(Debug, Clone, Copy)]
pub struct PathMapping<'a> {
    prefixes: &'a BTreeMap<String, String>,
}

impl<'a> PathMapping<'a> {
    pub fn new(prefixes: &'a BTreeMap<String, String>) -> Self {
        Self { prefixes }
    }

    /// Whisparr path -> local path
    pub fn to_local(&self, remote: &Path) -> PathBuf {
        self.translate(remote, self.prefixes.iter().map(|(r, l)| (r.as_str(), l.as_str())))
    }

    /// Local path -> Whisparr path
    pub fn to_remote(&self, local: &Path) -> PathBuf {
        self.translate(local, self.prefixes.iter().map(|(r, l)| (l.as_str(), r.as_str())))
    }

    fn translate<'p>(&self, path: &Path, pairs: impl Iterator<Item = (&'p str, &'p str)>) -> PathBuf {
        pairs
            .filter_map(|(from, to)| {
                path.strip_prefix(from)
                    .ok()
                    .map(|rest| (Path::new(from).components().count(), to, rest))
            })
            .max_by_key(|(depth, _, _)| *depth)
            .map(|(_, to, rest)| {
                if rest.as_os_str().is_empty() {
                    PathBuf::from(to)
                } else {
                    Path::new(to).join(rest)
                }
            })
            .unwrap_or_else(|| path.to_path_buf())
    }
}

/// Where a file ended up after [`ensure_location`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Already in the target directory
    InPlace(PathBuf),
    /// Moved into the target directory under this path
    Moved(PathBuf),
    /// Elsewhere and moving is disabled
    Elsewhere,
}

impl Placement {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Placement::InPlace(p) | Placement::Moved(p) => Some(p),
            Placement::Elsewhere => None,
        }
    }
}

/// Compare directories, resolving symlinks and `..` where they exist on disk.
pub fn same_directory(a: &Path, b: &Path) -> bool {
    let resolve = |p: &Path| p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
    resolve(a) == resolve(b)
}

/// First free name for `file` in `target_dir`: the file's own name, then
/// `stem_1.ext`, `stem_2.ext`, ...
pub fn unique_target_path(target_dir: &Path, file: &Path) -> PathBuf {
    let file_name = file.file_name().map(PathBuf::from).unwrap_or_default();
    let candidate = target_dir.join(&file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate = target_dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Move a file, copying across filesystems when a rename is not possible.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!("rename failed ({}), falling back to copy", rename_err);
            std::fs::copy(from, to).map_err(|_| rename_err)?;
            std::fs::remove_file(from)
        }
    }
}

/// Make sure `file` lives in `target_dir`, moving it there when allowed.
pub fn ensure_location(
    file: &Path,
    target_dir: &Path,
    move_files: bool,
    max_path_length: usize,
) -> io::Result<Placement> {
    let in_place = file
        .parent()
        .map(|parent| same_directory(parent, target_dir))
        .unwrap_or(false);

    if in_place {
        tracing::info!(
            "File already in Whisparr directory: {}",
            truncate_path(file, max_path_length)
        );
        return Ok(Placement::InPlace(file.to_path_buf()));
    }

    if !move_files {
        tracing::debug!(
            "File not in target directory, and MOVE_FILES=false: {}",
            truncate_path(file, max_path_length)
        );
        return Ok(Placement::Elsewhere);
    }

    std::fs::create_dir_all(target_dir)?;

    let target = unique_target_path(target_dir, file);
    move_file(file, &target)?;
    tracing::info!(
        "Moved file to Whisparr directory: {}",
        truncate_path(&target, max_path_length)
    );

    Ok(Placement::Moved(target))
}
