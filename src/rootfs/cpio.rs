//! Deterministic `newc` cpio archives.
//!
//! Entries are written in path order with sequential inode numbers and
//! zeroed times and ownership, so equal inputs give byte-identical output.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use flate2::{Compression, GzBuilder};
use walkdir::WalkDir;

use crate::util::archive::tar_reader;

pub const MAGIC: &[u8; 6] = b"070701";
const TRAILER: &str = "TRAILER!!!";

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

/// One archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Dir { mode: u32 },
    File { mode: u32, data: Vec<u8> },
    Symlink { target: String },
}

/// Accumulates entries and serializes them in path order.
#[derive(Debug, Default)]
pub struct CpioWriter {
    entries: BTreeMap<String, Entry>,
}

impl CpioWriter {
    pub fn new() -> Self {
        CpioWriter::default()
    }

    /// Add (or replace) `path`. Leading `/` and `./` are dropped.
    pub fn insert(&mut self, path: &str, entry: Entry) {
        let path = normalize(path);
        if !path.is_empty() {
            self.entries.insert(path, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut ino = 1u32;
        for (path, entry) in &self.entries {
            let (mode, nlink, data): (u32, u32, &[u8]) = match entry {
                Entry::Dir { mode } => (S_IFDIR | (mode & 0o7777), 2, &[] as &[u8]),
                Entry::File { mode, data } => (S_IFREG | (mode & 0o7777), 1, data.as_slice()),
                Entry::Symlink { target } => (S_IFLNK | 0o777, 1, target.as_bytes()),
            };
            write_header(&mut out, ino, mode, nlink, data.len(), path);
            out.extend_from_slice(data);
            pad4(&mut out);
            ino += 1;
        }
        write_header(&mut out, 0, 0, 1, 0, TRAILER);
        out
    }
}

fn write_header(out: &mut Vec<u8>, ino: u32, mode: u32, nlink: u32, size: usize, name: &str) {
    let fields = [
        ino,
        mode,
        0, // uid
        0, // gid
        nlink,
        0, // mtime
        size as u32,
        0,
        0,
        0,
        0,
        name.len() as u32 + 1,
        0, // check
    ];
    out.extend_from_slice(MAGIC);
    for field in fields {
        out.extend_from_slice(format!("{:08x}", field).as_bytes());
    }
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    pad4(out);
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn normalize(path: &str) -> String {
    Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Archive the contents of `root`, leaving out the paths in `skip`.
pub fn from_dir(root: &Path, skip: &[PathBuf]) -> Result<Vec<u8>> {
    let mut writer = CpioWriter::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !skip.iter().any(|p| e.path() == p));
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("path outside of {}", root.display()))?
            .to_string_lossy()
            .into_owned();

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .with_context(|| format!("failed to read link {}", entry.path().display()))?;
            writer.insert(
                &relative,
                Entry::Symlink {
                    target: target.to_string_lossy().into_owned(),
                },
            );
        } else if file_type.is_dir() {
            writer.insert(&relative, Entry::Dir { mode: mode_of(entry.path(), 0o755) });
        } else if file_type.is_file() {
            let data = std::fs::read(entry.path())
                .with_context(|| format!("failed to read {}", entry.path().display()))?;
            writer.insert(
                &relative,
                Entry::File {
                    mode: mode_of(entry.path(), 0o644),
                    data,
                },
            );
        }
    }
    Ok(writer.finish())
}

/// Convert a (possibly gzipped) tarball into a cpio archive.
///
/// Later entries for the same path replace earlier ones. Hard links become
/// copies of the file they point at.
pub fn from_tar(data: &[u8]) -> Result<Vec<u8>> {
    let mut writer = CpioWriter::new();
    let mut files: BTreeMap<String, (u32, Vec<u8>)> = BTreeMap::new();
    let mut archive = tar_reader(data);

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let path = normalize(&entry.path().context("invalid entry path")?.to_string_lossy());
        let mode = entry.header().mode().unwrap_or(0o644);

        match entry.header().entry_type() {
            tar::EntryType::Directory => writer.insert(&path, Entry::Dir { mode }),
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                let mut data = Vec::new();
                entry
                    .read_to_end(&mut data)
                    .with_context(|| format!("failed to read {}", path))?;
                files.insert(path.clone(), (mode, data.clone()));
                writer.insert(&path, Entry::File { mode, data });
            }
            tar::EntryType::Symlink => {
                if let Some(target) = entry.link_name().context("invalid link name")? {
                    writer.insert(
                        &path,
                        Entry::Symlink {
                            target: target.to_string_lossy().into_owned(),
                        },
                    );
                }
            }
            tar::EntryType::Link => {
                let Some(target) = entry.link_name().context("invalid link name")? else {
                    continue;
                };
                match files.get(&normalize(&target.to_string_lossy())) {
                    Some((mode, data)) => writer.insert(
                        &path,
                        Entry::File {
                            mode: *mode,
                            data: data.clone(),
                        },
                    ),
                    None => tracing::debug!("skipping dangling hard link {}", path),
                }
            }
            other => tracing::debug!("skipping {:?} entry {}", other, path),
        }
    }

    Ok(writer.finish())
}

/// Names of every member of a `newc` archive, checking its structure.
pub fn list_entries(data: &[u8]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut offset = 0usize;
    loop {
        let header = data
            .get(offset..offset + 110)
            .context("truncated cpio header")?;
        if &header[..6] != MAGIC {
            bail!("not a newc cpio archive (bad magic at offset {})", offset);
        }
        let field = |i: usize| -> Result<usize> {
            let raw = std::str::from_utf8(&header[6 + i * 8..14 + i * 8])?;
            Ok(usize::from_str_radix(raw, 16)?)
        };
        let size = field(6)?;
        let namesize = field(11)?;

        let name_start = offset + 110;
        let name = data
            .get(name_start..name_start + namesize.saturating_sub(1))
            .context("truncated cpio name")?;
        let name = String::from_utf8_lossy(name).into_owned();

        let data_start = align4(name_start + namesize);
        offset = align4(data_start + size);
        if name == TRAILER {
            return Ok(names);
        }
        names.push(name);
    }
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// gzip `data` with a zero header timestamp.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzBuilder::new().mtime(0).write(Vec::new(), Compression::default());
    encoder.write_all(data).context("failed to compress archive")?;
    encoder.finish().context("failed to compress archive")
}

#[cfg(unix)]
fn mode_of(path: &Path, default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::symlink_metadata(path)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(default)
}

#[cfg(not(unix))]
fn mode_of(_path: &Path, default: u32) -> u32 {
    default
}
