//! Local filesystem capacity probe.
//!
//! The only value in this crate that is computed locally; it has nothing to
//! do with JEVis itself and only serves as measurement data.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::report::{Event, Reporter};

const MOUNTS: &str = "/proc/mounts";

/// Usable and total bytes of one filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCapacity {
    pub usable_bytes: u64,
    pub total_bytes: u64,
}

/// Source of filesystem roots and their capacity.
pub trait FileStores: Send + Sync {
    /// Filesystem roots visible to the process.
    fn roots(&self) -> Vec<PathBuf>;

    /// Capacity of the filesystem mounted at `root`.
    fn capacity(&self, root: &Path) -> io::Result<StoreCapacity>;
}

/// The filesystems of the running host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemStores;

impl FileStores for SystemStores {
    fn roots(&self) -> Vec<PathBuf> {
        roots_from_mount_table(fs::read_to_string(MOUNTS))
    }

    fn capacity(&self, root: &Path) -> io::Result<StoreCapacity> {
        let stat = rustix::fs::statvfs(root)?;
        let fragment = stat.f_frsize;
        Ok(StoreCapacity {
            usable_bytes: stat.f_bavail.saturating_mul(fragment),
            total_bytes: stat.f_blocks.saturating_mul(fragment),
        })
    }
}

/// Roots listed in a mount table, or `/` when the table is unreadable or
/// lists no block-device filesystem.
fn roots_from_mount_table(table: io::Result<String>) -> Vec<PathBuf> {
    let roots = match table {
        Ok(contents) => parse_mount_points(&contents),
        Err(e) => {
            tracing::debug!("reading {}: {}; falling back to /", MOUNTS, e);
            Vec::new()
        }
    };

    if roots.is_empty() {
        vec![PathBuf::from("/")]
    } else {
        roots
    }
}

/// One mount point per block device, in table order.
///
/// Bind mounts and subvolumes show up once per mount point but share the
/// device, so only the first mount of each device is kept.
fn parse_mount_points(contents: &str) -> Vec<PathBuf> {
    let mut devices: Vec<&str> = Vec::new();
    let mut roots: Vec<PathBuf> = Vec::new();

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(mount_point)) = (fields.next(), fields.next()) else {
            continue;
        };
        if !device.starts_with('/') || devices.contains(&device) {
            continue;
        }

        devices.push(device);
        roots.push(PathBuf::from(unescape_mount_field(mount_point)));
    }

    roots
}

/// Decode the octal escapes (`\040` for space, ...) used in the mount table.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let octal = i + 3 < bytes.len()
            && bytes[i] == b'\\'
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b));
        if octal {
            let code = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            out.push(u8::try_from(code).unwrap_or(b'?'));
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Sum of the total capacity of every root.
///
/// Each root is reported with its usable and total bytes. A root that cannot
/// be queried is reported as a failure and contributes nothing.
pub fn total_capacity(stores: &dyn FileStores, reporter: &dyn Reporter) -> u64 {
    let mut total: u64 = 0;

    for root in stores.roots() {
        let name = root.display().to_string();
        match stores.capacity(&root) {
            Ok(capacity) => {
                reporter.report(Event::DiskRoot {
                    root: name,
                    usable_bytes: capacity.usable_bytes,
                    total_bytes: capacity.total_bytes,
                });
                total = total.saturating_add(capacity.total_bytes);
            }
            Err(e) => reporter.report(Event::DiskRootFailed {
                root: name,
                error: e.to_string(),
            }),
        }
    }

    total
}
