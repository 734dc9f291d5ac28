//! Classifying and unpacking downloaded artifacts.
//!
//! Archives are never unpacked straight into the destination. They are
//! unpacked into a hidden staging directory inside it and [`promote`]d
//! afterwards, so a failed extraction leaves the destination as it was.
use std::{
    fmt::{Display, Formatter},
    io::{BufRead, BufReader, Read},
    path::{Component, Path, PathBuf},
};

use fs_err as fs;
use fs_err::File;
use indicatif::{ProgressBar, ProgressFinish};
use serde::{Deserialize, Serialize};

use crate::{error::ExtractError, progress::ProgressHandler};

/// The kinds of artifacts that can be materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveKind {
    /// Zip and zip compatible containers (jar, war, ear).
    Zip,
    Tar,
    TarGz,
    /// Anything else, copied verbatim.
    PlainCopy,
}

/// Checked in order, longer suffixes first.
const SUFFIXES: &[(&str, ArchiveKind)] = &[
    (".tar.gz", ArchiveKind::TarGz),
    (".tgz", ArchiveKind::TarGz),
    (".zip", ArchiveKind::Zip),
    (".jar", ArchiveKind::Zip),
    (".war", ArchiveKind::Zip),
    (".ear", ArchiveKind::Zip),
    (".gz", ArchiveKind::TarGz),
    (".tar", ArchiveKind::Tar),
];

impl ArchiveKind {
    /// Determines the kind from the trailing suffix of `name`. Matching is
    /// case-sensitive.
    pub fn classify(name: &str) -> Self {
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, kind)| *kind)
            .unwrap_or(ArchiveKind::PlainCopy)
    }
}

impl Display for ArchiveKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveKind::Zip => write!(f, "zip"),
            ArchiveKind::Tar => write!(f, "tar"),
            ArchiveKind::TarGz => write!(f, "tar.gz"),
            ArchiveKind::PlainCopy => write!(f, "plain file"),
        }
    }
}

/// Handle compression formats internally.
enum TarCompression<'a> {
    PlainTar(Box<dyn BufRead + 'a>),
    Gzip(flate2::read::GzDecoder<Box<dyn BufRead + 'a>>),
}

impl Read for TarCompression<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            TarCompression::PlainTar(reader) => reader.read(buf),
            TarCompression::Gzip(reader) => reader.read(buf),
        }
    }
}

/// True if `path` stays below the directory it is joined onto.
fn is_enclosed(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn bytes_progress_bar(handler: &dyn ProgressHandler, len: u64, prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new(len)
        .with_finish(ProgressFinish::AndLeave)
        .with_style(handler.default_bytes_style());
    bar.set_prefix(prefix.to_string());
    handler.add_progress_bar(bar)
}

/// Unpacks `archive` into `target` according to `kind`.
///
/// `fallback_name` is the file name used for [`ArchiveKind::PlainCopy`].
pub fn unpack(
    kind: ArchiveKind,
    archive: &Path,
    target: &Path,
    fallback_name: &str,
    handler: &dyn ProgressHandler,
) -> Result<(), ExtractError> {
    fs::create_dir_all(target)?;
    match kind {
        ArchiveKind::Zip => unpack_zip(archive, target, handler),
        ArchiveKind::Tar => unpack_tar(archive, target, false, handler),
        ArchiveKind::TarGz => unpack_tar(archive, target, true, handler),
        ArchiveKind::PlainCopy => {
            fs::copy(archive, target.join(fallback_name))?;
            Ok(())
        }
    }
}

fn unpack_tar(
    archive: &Path,
    target: &Path,
    gzip: bool,
    handler: &dyn ProgressHandler,
) -> Result<(), ExtractError> {
    let len = archive.metadata().map(|m| m.len()).unwrap_or(1);
    let progress_bar = bytes_progress_bar(handler, len, "Extracting tar");

    let file = File::open(archive)?;
    let buf_reader: Box<dyn BufRead> = Box::new(BufReader::with_capacity(
        1024 * 1024,
        progress_bar.wrap_read(file),
    ));
    let reader = if gzip {
        TarCompression::Gzip(flate2::read::GzDecoder::new(buf_reader))
    } else {
        TarCompression::PlainTar(buf_reader)
    };

    let tar_error = |e: std::io::Error| ExtractError::TarExtractionError(e.to_string());
    let mut archive = tar::Archive::new(reader);
    // Directories are unpacked last so a read-only directory mode does not
    // block unpacking its children.
    let mut directories = Vec::new();
    for entry in archive.entries().map_err(tar_error)? {
        let mut entry = entry.map_err(tar_error)?;
        let path = entry.path().map_err(tar_error)?.into_owned();
        if !is_enclosed(&path) {
            return Err(ExtractError::PathEscape {
                entry: path.display().to_string(),
            });
        }
        if entry.header().entry_type() == tar::EntryType::Directory {
            directories.push((path, entry));
            continue;
        }
        // `unpack_in` refuses entries that would land outside of `target`, for
        // example through a previously unpacked symlink.
        if !entry.unpack_in(target).map_err(tar_error)? {
            return Err(ExtractError::PathEscape {
                entry: path.display().to_string(),
            });
        }
    }
    for (path, mut directory) in directories {
        if !directory.unpack_in(target).map_err(tar_error)? {
            return Err(ExtractError::PathEscape {
                entry: path.display().to_string(),
            });
        }
    }
    make_dirs_writable(target)?;

    progress_bar.finish_with_message("Extracted...");
    Ok(())
}

/// Adds the owner write bit to every directory below `dir`, so the payload
/// can be moved out of the staging directory.
#[cfg(unix)]
fn make_dirs_writable(dir: &Path) -> Result<(), ExtractError> {
    use std::os::unix::fs::PermissionsExt;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        let mode = fs::symlink_metadata(&path)?.permissions().mode();
        if mode & 0o700 != 0o700 {
            fs::set_permissions(&path, std::fs::Permissions::from_mode(mode | 0o700))?;
        }
        make_dirs_writable(&path)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_dirs_writable(_dir: &Path) -> Result<(), ExtractError> {
    Ok(())
}

fn unpack_zip(
    archive: &Path,
    target: &Path,
    handler: &dyn ProgressHandler,
) -> Result<(), ExtractError> {
    let len = archive.metadata().map(|m| m.len()).unwrap_or(1);
    let progress_bar = bytes_progress_bar(handler, len, "Extracting zip");

    let file = File::open(archive)?;
    let buf_reader = BufReader::with_capacity(1024 * 1024, file);
    let wrapped = progress_bar.wrap_read(buf_reader);
    let mut archive =
        zip::ZipArchive::new(wrapped).map_err(|e| ExtractError::InvalidZip(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ExtractError::ZipExtractionError(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractError::PathEscape {
                entry: entry.name().to_string(),
            });
        };
        let out_path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut writer)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))?;
        }
    }

    progress_bar.finish_with_message("Extracted...");
    Ok(())
}

/// Returns the directory whose children make up the payload: the single
/// top-level directory if the archive wrapped everything in one, `staging`
/// otherwise. Only one level is stripped.
fn payload_root(staging: &Path) -> Result<PathBuf, ExtractError> {
    let mut entries = fs::read_dir(staging)?;
    let root = match entries.next().transpose()? {
        Some(dir) if entries.next().is_none() && dir.file_type()?.is_dir() => {
            staging.join(dir.file_name())
        }
        _ => staging.to_path_buf(),
    };
    Ok(root)
}

/// Moves every child of `src` into `dest`. Files replace files of the same
/// name, directories are merged.
fn merge_into(src: &Path, dest: &Path) -> Result<(), ExtractError> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        let is_dir = entry.file_type()?.is_dir();

        match fs::symlink_metadata(&target) {
            Ok(existing) if is_dir && existing.is_dir() => {
                merge_into(&entry.path(), &target)?;
                continue;
            }
            Ok(existing) if existing.is_dir() => fs::remove_dir_all(&target)?,
            Ok(_) => fs::remove_file(&target)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fs::rename(entry.path(), &target)?;
    }
    Ok(())
}

/// Moves the unpacked payload from `staging` into `destination`, stripping a
/// single wrapping root directory.
pub fn promote(staging: &Path, destination: &Path) -> Result<(), ExtractError> {
    let payload = payload_root(staging)?;
    merge_into(&payload, destination)
}
