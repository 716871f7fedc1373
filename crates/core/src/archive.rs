//! Unpacks uploaded ZIP bundles into their own directory under the uploads root.

use crate::error::{IngestError, Result};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::ZipArchive;

/// Folder names an unpacked bundle must contain at its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    pub marketing_dir: String,
    pub interests_dir: String,
}

/// An unpacked upload whose required folders have been checked.
#[derive(Debug, Clone)]
pub struct ExtractedBundle {
    pub id: String,
    pub root: PathBuf,
    pub marketing: PathBuf,
    pub interests: PathBuf,
    pub digest: String,
}

impl ExtractedBundle {
    /// Re-opens a bundle extracted earlier, checking it is still intact on disk.
    pub fn open(id: &str, root: &Path, layout: &BundleLayout) -> Result<Self> {
        let (marketing, interests) = locate(root, layout)?;
        Ok(Self {
            id: id.to_string(),
            root: root.to_path_buf(),
            marketing,
            interests,
            digest: String::new(),
        })
    }

    /// Removes the bundle directory. Failures are logged, not returned.
    pub fn discard(&self) {
        Self::discard_root(&self.root);
    }

    /// Removes a bundle directory known only by its registered root.
    pub fn discard_root(root: &Path) {
        match fs::remove_dir_all(root) {
            Ok(()) => debug!(root = %root.display(), "bundle removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(root = %root.display(), error = %e, "failed to remove bundle"),
        }
    }
}

/// Unpacks `bytes` into a fresh `<uploads_root>/<uuid>` directory.
///
/// At most `max_bytes` of decompressed data are written. The directory is
/// removed again when the archive is unreadable, too large once expanded or
/// lacks one of the layout folders, so a failed upload leaves nothing behind.
pub fn extract_archive(
    bytes: &[u8],
    uploads_root: &Path,
    layout: &BundleLayout,
    max_bytes: u64,
) -> Result<ExtractedBundle> {
    let digest = blake3::hash(bytes).to_hex().to_string();
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let id = Uuid::new_v4().to_string();
    let root = uploads_root.join(&id);
    fs::create_dir_all(&root)?;

    let unpacked = unpack(&mut archive, &root, max_bytes).and_then(|entries| {
        let (marketing, interests) = locate(&root, layout)?;
        Ok((entries, marketing, interests))
    });

    match unpacked {
        Ok((entries, marketing, interests)) => {
            info!(upload = %id, entries, digest = %digest, "archive extracted");
            Ok(ExtractedBundle {
                id,
                root,
                marketing,
                interests,
                digest,
            })
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&root) {
                warn!(root = %root.display(), error = %cleanup, "failed to clean up rejected upload");
            }
            Err(e)
        }
    }
}

fn unpack(archive: &mut ZipArchive<Cursor<&[u8]>>, root: &Path, max_bytes: u64) -> Result<usize> {
    let mut written = 0;
    let mut total: u64 = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry_name(entry.name_raw(), entry.name());
        let relative = sanitize_entry(&name)
            .ok_or_else(|| IngestError::Archive(format!("unsafe entry path `{name}`")))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = root.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| conflict(&name, e))?;
            continue;
        }

        let remaining = max_bytes.saturating_sub(total);
        if entry.size() > remaining {
            return Err(too_large(max_bytes));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| conflict(&name, e))?;
        }
        let mut out = fs::File::create(&target).map_err(|e| conflict(&name, e))?;
        // The declared size may lie; never copy more than the budget allows.
        let copied = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)
            .map_err(|e| IngestError::Archive(format!("{name}: {e}")))?;
        if copied > remaining {
            return Err(too_large(max_bytes));
        }
        total += copied;
        debug!(entry = %relative.display(), bytes = copied, "unpacked");
        written += 1;
    }
    Ok(written)
}

/// An entry whose path clashes with another entry (a file where a folder
/// should be, or the reverse).
fn conflict(name: &str, err: io::Error) -> IngestError {
    IngestError::Archive(format!("cannot write entry `{name}`: {err}"))
}

fn too_large(max_bytes: u64) -> IngestError {
    IngestError::Archive(format!("archive expands to more than {max_bytes} bytes"))
}

/// Prefers the raw name when it is valid UTF-8; many archivers write UTF-8
/// names without setting the language-encoding flag.
fn entry_name(raw: &[u8], decoded: &str) -> String {
    match std::str::from_utf8(raw) {
        Ok(name) => name.to_string(),
        Err(_) => decoded.to_string(),
    }
}

/// Turns an archive entry name into a path relative to the bundle root.
/// Returns `None` for names that would escape it.
pub fn sanitize_entry(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut out = PathBuf::new();
    for part in Path::new(&normalized).components() {
        match part {
            Component::Normal(p) => {
                if p.to_string_lossy().contains(':') {
                    return None;
                }
                out.push(p);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn locate(root: &Path, layout: &BundleLayout) -> Result<(PathBuf, PathBuf)> {
    let marketing = root.join(&layout.marketing_dir);
    if !marketing.is_dir() {
        return Err(IngestError::Structure(layout.marketing_dir.clone()));
    }
    let interests = root.join(&layout.interests_dir);
    if !interests.is_dir() {
        return Err(IngestError::Structure(layout.interests_dir.clone()));
    }
    Ok((marketing, interests))
}
