// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Archive origins
//!
//! Archives are tar files, optionally gzip-compressed. An [`ArchiveFs`] is
//! an indexed, read-only view of one archive. The [`ArchiveTable`] keeps at
//! most one live view per archive location so repeated lookups share it.

use bytes::Bytes;
use dashmap::DashMap;
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open an archive for sequential reading, decompressing if needed
fn open_stream(path: &Path) -> io::Result<Box<dyn Read>> {
    let mut reader = BufReader::new(File::open(path)?);
    let compressed = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if compressed {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Normalize an entry path as stored in the archive
fn entry_name(path: &Path) -> String {
    let name = path.to_string_lossy().replace('\\', "/");
    name.trim_start_matches("./").trim_start_matches('/').to_string()
}

/// Read the file entries at the start of an archive that live under `prefix`.
///
/// Scanning stops at the first file entry outside `prefix`, so only the
/// leading block of the archive is decoded.
pub fn scan_leading(path: &Path, prefix: &str) -> io::Result<Vec<(String, Bytes)>> {
    let mut archive = tar::Archive::new(open_stream(path)?);
    let mut found = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = entry_name(&entry.path()?);
        if !name.starts_with(prefix) {
            break;
        }
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        found.push((name, Bytes::from(data)));
    }

    Ok(found)
}

/// Indexed read-only view of an archive
#[derive(Debug)]
pub struct ArchiveFs {
    path: PathBuf,
    entries: HashMap<String, Bytes>,
}

impl ArchiveFs {
    /// Read and index every file entry of the archive at `path`
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut archive = tar::Archive::new(open_stream(path)?);
        let mut entries = HashMap::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry_name(&entry.path()?);
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            entries.insert(name, Bytes::from(data));
        }

        debug!("Indexed {} entries of {}", entries.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Archive location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content of an entry
    pub fn read(&self, entry: &str) -> Option<Bytes> {
        self.entries.get(entry).cloned()
    }

    /// Whether the archive holds `entry`
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains_key(entry)
    }

    /// Names of entries starting with `prefix`, sorted
    pub fn entries_under(&self, prefix: &str) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .keys()
            .map(String::as_str)
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of file entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive has no file entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Live archive views, at most one per location
#[derive(Debug, Default)]
pub struct ArchiveTable {
    open: DashMap<PathBuf, Arc<ArchiveFs>>,
}

impl ArchiveTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Live view for `path`, if one is open
    pub fn get(&self, path: &Path) -> Option<Arc<ArchiveFs>> {
        self.open.get(path).map(|entry| entry.clone())
    }

    /// Return the live view for `path`, opening and keeping it if needed
    pub fn open(&self, path: &Path) -> io::Result<Arc<ArchiveFs>> {
        if let Some(fs) = self.get(path) {
            return Ok(fs);
        }
        // Index outside the map lock; a concurrent opener may win the insert.
        let fs = Arc::new(ArchiveFs::open(path)?);
        Ok(self.open.entry(path.to_path_buf()).or_insert(fs).clone())
    }

    /// Scoped view for a single lookup.
    ///
    /// Reuses a live view when there is one. Otherwise the view is opened
    /// for the lifetime of the returned handle only and never enters the
    /// table.
    pub fn acquire(&self, path: &Path) -> io::Result<ArchiveHandle> {
        if let Some(fs) = self.get(path) {
            return Ok(ArchiveHandle { fs, owned: false });
        }

        let fs = Arc::new(ArchiveFs::open(path)?);
        debug!("Opened one-off archive view {}", path.display());
        Ok(ArchiveHandle { fs, owned: true })
    }

    /// Number of live views
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Whether no view is live
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

/// Archive view handed out by [`ArchiveTable::acquire`]
///
/// An owned view is private to the handle and closed when it drops.
pub struct ArchiveHandle {
    fs: Arc<ArchiveFs>,
    owned: bool,
}

impl ArchiveHandle {
    /// Whether dropping this handle closes the view
    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Deref for ArchiveHandle {
    type Target = ArchiveFs;

    fn deref(&self) -> &ArchiveFs {
        &self.fs
    }
}

impl Drop for ArchiveHandle {
    fn drop(&mut self) {
        if self.owned {
            debug!("Closed one-off archive view {}", self.fs.path().display());
        }
    }
}
