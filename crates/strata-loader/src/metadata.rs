// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Per-origin descriptor cache
//!
//! Every origin may carry a descriptor (a `Key: Value` table) and a set of
//! signing identities. Both are read lazily on first use and memoized per
//! canonical location; concurrent first callers share one computation.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::archive::{scan_leading, ArchiveTable};
use crate::config::LoaderConfig;

/// Descriptor data derived from an origin's contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginDescriptor {
    entries: BTreeMap<String, String>,
    signers: Vec<String>,
}

impl OriginDescriptor {
    /// Parse the main section of a descriptor.
    ///
    /// Lines are `Key: Value`; a line starting with a single space continues
    /// the previous value. The first blank line ends the main section.
    pub fn parse(text: &str) -> Self {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();
        let mut last: Option<String> = None;

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                if let Some(value) = last.as_ref().and_then(|key| entries.get_mut(key)) {
                    value.push_str(rest);
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_string();
                entries.insert(key.clone(), value.trim_start().to_string());
                last = Some(key);
            }
        }

        Self {
            entries,
            signers: Vec::new(),
        }
    }

    /// Attach signing identities
    pub fn with_signers(mut self, signers: Vec<String>) -> Self {
        self.signers = signers;
        self
    }

    /// Value for a descriptor key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// All descriptor entries
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Signing identities, in archive order
    pub fn signers(&self) -> &[String] {
        &self.signers
    }

    /// Whether neither entries nor signers are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.signers.is_empty()
    }
}

/// Memoized descriptor lookup keyed by canonical origin location
pub struct MetadataCache {
    descriptor_path: String,
    signer_suffix: String,
    archives: Arc<ArchiveTable>,
    cache: DashMap<PathBuf, Arc<OnceLock<Arc<OriginDescriptor>>>>,
}

impl MetadataCache {
    /// Create a cache sharing archive views with `archives`
    pub fn new(config: &LoaderConfig, archives: Arc<ArchiveTable>) -> Self {
        Self {
            descriptor_path: config.descriptor_path.clone(),
            signer_suffix: config.signer_suffix.clone(),
            archives,
            cache: DashMap::new(),
        }
    }

    /// Descriptor for the origin at `location`, computed at most once
    pub fn descriptor_for(&self, location: &Path) -> Arc<OriginDescriptor> {
        let cell = self
            .cache
            .entry(location.to_path_buf())
            .or_default()
            .clone();
        cell.get_or_init(|| Arc::new(self.compute(location))).clone()
    }

    /// Whether a descriptor for `location` has been computed
    pub fn is_cached(&self, location: &Path) -> bool {
        self.cache
            .get(location)
            .is_some_and(|cell| cell.get().is_some())
    }

    fn compute(&self, location: &Path) -> OriginDescriptor {
        let result = if location.is_dir() {
            self.read_directory(location)
        } else {
            self.read_archive(location)
        };

        match result {
            Ok(descriptor) => {
                debug!(
                    "Read descriptor of {} ({} entries, {} signers)",
                    location.display(),
                    descriptor.entries.len(),
                    descriptor.signers.len()
                );
                descriptor
            }
            Err(e) => {
                warn!("Failed to load descriptor of {}: {}", location.display(), e);
                OriginDescriptor::default()
            }
        }
    }

    fn read_directory(&self, base: &Path) -> io::Result<OriginDescriptor> {
        let path = base.join(&self.descriptor_path);
        if !path.is_file() {
            return Ok(OriginDescriptor::default());
        }
        Ok(OriginDescriptor::parse(&std::fs::read_to_string(path)?))
    }

    fn read_archive(&self, archive: &Path) -> io::Result<OriginDescriptor> {
        let meta_dir = self.meta_dir();

        let mut descriptor = None;
        let mut signers = Vec::new();
        for (name, data) in scan_leading(archive, &meta_dir)? {
            if name == self.descriptor_path {
                descriptor = Some(data);
            } else if name.ends_with(&self.signer_suffix) {
                signers.push(signer_identity(&data));
            }
        }

        if let Some(data) = descriptor {
            return Ok(OriginDescriptor::parse(&String::from_utf8_lossy(&data)).with_signers(signers));
        }

        // Descriptor not in the leading block; look anywhere in the archive.
        let fs = self.archives.acquire(archive)?;
        let Some(data) = fs.read(&self.descriptor_path) else {
            return Ok(OriginDescriptor::default().with_signers(signers));
        };
        if signers.is_empty() {
            signers = fs
                .entries_under(&meta_dir)
                .into_iter()
                .filter(|name| name.ends_with(&self.signer_suffix))
                .filter_map(|name| fs.read(name))
                .map(|data| signer_identity(&data))
                .collect();
        }
        Ok(OriginDescriptor::parse(&String::from_utf8_lossy(&data)).with_signers(signers))
    }

    fn meta_dir(&self) -> String {
        match self.descriptor_path.rfind('/') {
            Some(pos) => self.descriptor_path[..=pos].to_string(),
            None => String::new(),
        }
    }
}

fn signer_identity(data: &Bytes) -> String {
    String::from_utf8_lossy(data).trim().to_string()
}
