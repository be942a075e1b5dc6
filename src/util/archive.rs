//! Tarball helpers shared by the catalog backends and the rootfs builder.

use std::io::{Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use walkdir::WalkDir;

/// Returns true when `data` starts with the gzip magic.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Open a tar stream over `data`, transparently un-gzipping it.
pub fn tar_reader(data: &[u8]) -> tar::Archive<Box<dyn Read + '_>> {
    let reader: Box<dyn Read + '_> = if is_gzip(data) {
        Box::new(GzDecoder::new(Cursor::new(data)))
    } else {
        Box::new(Cursor::new(data))
    };
    tar::Archive::new(reader)
}

/// Extract a (possibly gzipped) tarball into `dest`.
///
/// The first `strip` path components of every entry are dropped, so
/// `musl-1.2.3/src/a.c` with `strip = 1` lands at `dest/src/a.c`. Entries
/// that would escape `dest` are rejected.
pub fn extract_tarball(data: &[u8], dest: &Path, strip: usize) -> Result<()> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("failed to create destination directory: {}", dest.display()))?;

    let mut archive = tar_reader(data);
    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = entry.path().context("failed to get entry path")?.into_owned();

        let Some(relative) = strip_components(&entry_path, strip)? else {
            continue;
        };
        let output_path = dest.join(&relative);

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let entry_type = entry.header().entry_type();
        match entry_type {
            tar::EntryType::Directory => {
                std::fs::create_dir_all(&output_path).with_context(|| {
                    format!("failed to create directory: {}", output_path.display())
                })?;
            }
            tar::EntryType::Regular
            | tar::EntryType::Continuous
            | tar::EntryType::Link
            | tar::EntryType::Symlink => {
                entry.unpack(&output_path).with_context(|| {
                    format!("failed to extract file: {}", output_path.display())
                })?;
            }
            _ => {
                tracing::debug!(
                    "Skipping unsupported entry type {:?}: {}",
                    entry_type,
                    entry_path.display()
                );
            }
        }
    }

    Ok(())
}

/// Drop the first `strip` components of `path`; `None` when nothing remains.
fn strip_components(path: &Path, strip: usize) -> Result<Option<PathBuf>> {
    let mut out = PathBuf::new();
    let mut skipped = 0;
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if skipped < strip {
                    skipped += 1;
                } else {
                    out.push(part);
                }
            }
            Component::CurDir => {}
            _ => bail!("tarball entry escapes destination directory: {}", path.display()),
        }
    }
    Ok((!out.as_os_str().is_empty()).then_some(out))
}

/// Write `dir` as a gzipped tarball with sorted entries and zeroed times.
pub fn pack_tar_gz(dir: &Path, out: &mut impl Write) -> Result<()> {
    let encoder = GzBuilder::new().mtime(0).write(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("path outside of {}", dir.display()))?;

        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if entry.file_type().is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder
                .append_data(&mut header, relative, std::io::empty())
                .with_context(|| format!("failed to add {}", relative.display()))?;
        } else if entry.file_type().is_file() {
            let data = std::fs::read(entry.path())
                .with_context(|| format!("failed to read {}", entry.path().display()))?;
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(file_mode(entry.path()));
            header.set_size(data.len() as u64);
            builder
                .append_data(&mut header, relative, data.as_slice())
                .with_context(|| format!("failed to add {}", relative.display()))?;
        }
    }

    let encoder: GzEncoder<_> = builder.into_inner().context("failed to finish tarball")?;
    encoder.finish().context("failed to finish gzip stream")?;
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}
