//! # Disk Space Probing
//!
//! The sync coordinator asks a `DiskSpaceProbe` how many bytes are usable on
//! the volume holding the data directory. `None` means the platform could not
//! say; callers treat that as "enough".
//!
//! `SysinfoProbe` resolves the path to its volume by longest mount-point
//! prefix:
//!
//! ```text
//! /var/lib/arbordb/data   mounts: /  /var  /var/lib
//!                                          ^^^^^^^^ wins
//! ```
//!
//! `FixedDiskSpace` returns whatever it was last set to and is used to drive
//! the read-only transition deterministically.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sysinfo::Disks;

pub trait DiskSpaceProbe: Send + Sync {
    /// Usable bytes on the volume holding `path`, or `None` if unknown.
    fn usable_space(&self, path: &Path) -> Option<u64>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProbe;

impl SysinfoProbe {
    pub fn new() -> Self {
        Self
    }
}

impl DiskSpaceProbe for SysinfoProbe {
    fn usable_space(&self, path: &Path) -> Option<u64> {
        let resolved = resolve(path);
        let disks = Disks::new_with_refreshed_list();

        disks
            .list()
            .iter()
            .filter(|disk| resolved.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Canonical form of `path`, or of its nearest existing ancestor.
fn resolve(path: &Path) -> PathBuf {
    let mut candidate = path;
    loop {
        if let Ok(canonical) = candidate.canonicalize() {
            return canonical;
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => return path.to_path_buf(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FixedDiskSpace {
    usable: Mutex<Option<u64>>,
}

impl FixedDiskSpace {
    pub fn new(usable: Option<u64>) -> Self {
        Self {
            usable: Mutex::new(usable),
        }
    }

    pub fn set(&self, usable: Option<u64>) {
        *self.usable.lock() = usable;
    }
}

impl DiskSpaceProbe for FixedDiskSpace {
    fn usable_space(&self, _path: &Path) -> Option<u64> {
        *self.usable.lock()
    }
}

impl<P: DiskSpaceProbe + ?Sized> DiskSpaceProbe for std::sync::Arc<P> {
    fn usable_space(&self, path: &Path) -> Option<u64> {
        (**self).usable_space(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fixed_probe_reports_the_configured_value() {
        let probe = FixedDiskSpace::new(Some(10));
        assert_eq!(probe.usable_space(Path::new("/anywhere")), Some(10));

        probe.set(None);
        assert_eq!(probe.usable_space(Path::new("/anywhere")), None);
    }

    #[test]
    fn resolve_falls_back_to_existing_ancestor() {
        let dir = tempdir().expect("should create temp dir");
        let missing = dir.path().join("not").join("yet");

        let resolved = resolve(&missing);
        let canonical = dir.path().canonicalize().expect("should canonicalize");
        assert_eq!(resolved, canonical);
    }

    #[test]
    fn sysinfo_probe_does_not_panic_on_temp_dir() {
        let dir = tempdir().expect("should create temp dir");
        // Containers may expose no disks at all; either answer is acceptable.
        let _ = SysinfoProbe::new().usable_space(dir.path());
    }
}
