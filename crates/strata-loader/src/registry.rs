// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Registry of code sources and the resource search path built on it
//!
//! Origins are kept in registration order behind a copy-on-write snapshot:
//! registration swaps in a new snapshot under the write lock, lookups clone
//! the current snapshot and release the lock before touching the disk.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::archive::ArchiveTable;
use crate::error::{LoaderError, Result};
use crate::origin::{Origin, OriginKind, OriginTag, OriginTagStore, Resource, ResourceLocation};

/// Immutable view of the registered origins
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    order: Vec<Origin>,
    members: HashSet<PathBuf>,
}

impl RegistrySnapshot {
    /// Origins in registration order
    pub fn origins(&self) -> &[Origin] {
        &self.order
    }

    /// Whether `location` (canonical) is registered
    pub fn contains(&self, location: &Path) -> bool {
        self.members.contains(location)
    }
}

/// Ordered, append-only set of origins
pub struct CodeSourceRegistry {
    state: RwLock<Arc<RegistrySnapshot>>,
    tags: Arc<OriginTagStore>,
    archives: Arc<ArchiveTable>,
}

impl CodeSourceRegistry {
    /// Create an empty registry
    pub fn new(tags: Arc<OriginTagStore>, archives: Arc<ArchiveTable>) -> Self {
        Self {
            state: RwLock::new(Arc::new(RegistrySnapshot::default())),
            tags,
            archives,
        }
    }

    /// Register an origin.
    ///
    /// Returns `false` if the canonical location was already registered, in
    /// which case nothing changes. The tag, if any, is stored on first
    /// registration only.
    pub fn register(&self, path: impl AsRef<Path>, tag: Option<OriginTag>) -> Result<bool> {
        let origin = Origin::new(path)?;

        let mut state = self.state.write();
        if state.contains(origin.location()) {
            debug!("Origin {} already registered", origin);
            return Ok(false);
        }

        let mut order = Vec::with_capacity(state.order.len() + 1);
        order.extend(state.order.iter().cloned());
        order.push(origin.clone());
        let mut members = state.members.clone();
        members.insert(origin.location().to_path_buf());

        if let Some(tag) = tag {
            self.tags.put(origin.location(), tag);
        }
        *state = Arc::new(RegistrySnapshot { order, members });
        drop(state);

        info!("Registered origin {} ({:?}, tag {:?})", origin, origin.kind(), tag);
        Ok(true)
    }

    /// Current snapshot of the registered origins
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.state.read().clone()
    }

    /// Whether `location` (canonical) is registered
    pub fn contains(&self, location: &Path) -> bool {
        self.state.read().contains(location)
    }

    /// Origins in registration order
    pub fn origins(&self) -> Vec<Origin> {
        self.snapshot().order.clone()
    }

    /// Number of registered origins
    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    /// Whether no origin is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tag store shared with this registry
    pub fn tags(&self) -> &Arc<OriginTagStore> {
        &self.tags
    }

    /// Read `resource` from the first origin that has it
    pub fn resolve(&self, resource: &str) -> Result<Option<(Origin, Resource)>> {
        let snapshot = self.snapshot();
        for origin in snapshot.origins() {
            if let Some(found) = self.read_from(origin, resource)? {
                return Ok(Some((origin.clone(), found)));
            }
        }
        Ok(None)
    }

    /// Read `resource` from every origin that has it, in order
    pub fn resolve_all(&self, resource: &str) -> Result<Vec<(Origin, Resource)>> {
        let snapshot = self.snapshot();
        let mut found = Vec::new();
        for origin in snapshot.origins() {
            if let Some(hit) = self.read_from(origin, resource)? {
                found.push((origin.clone(), hit));
            }
        }
        Ok(found)
    }

    /// Location of `resource` in the first origin that has it
    pub fn find(&self, resource: &str) -> Option<ResourceLocation> {
        let snapshot = self.snapshot();
        snapshot
            .origins()
            .iter()
            .find(|origin| self.has(origin, resource))
            .map(|origin| origin.locate(resource))
    }

    /// Locations of `resource` in every origin that has it, in order
    pub fn find_all(&self, resource: &str) -> Vec<ResourceLocation> {
        let snapshot = self.snapshot();
        snapshot
            .origins()
            .iter()
            .filter(|origin| self.has(origin, resource))
            .map(|origin| origin.locate(resource))
            .collect()
    }

    /// Whether a location found outside the registry belongs to a registered
    /// origin. Locations without a filesystem code source never are.
    pub fn is_shadowed(&self, candidate: &ResourceLocation, resource: &str) -> bool {
        match candidate.code_source(resource) {
            Some(source) => self.contains(&source),
            None => false,
        }
    }

    fn has(&self, origin: &Origin, resource: &str) -> bool {
        if !stays_inside(resource) {
            return false;
        }
        match origin.kind() {
            OriginKind::Directory => origin.location().join(resource).is_file(),
            OriginKind::Archive => match self.archives.open(origin.location()) {
                Ok(fs) => fs.contains(resource),
                Err(e) => {
                    warn!("Skipping unreadable archive {}: {}", origin, e);
                    false
                }
            },
        }
    }

    fn read_from(&self, origin: &Origin, resource: &str) -> Result<Option<Resource>> {
        if !stays_inside(resource) {
            debug!("Refusing resource name {} outside any origin", resource);
            return Ok(None);
        }
        match origin.kind() {
            OriginKind::Directory => {
                let path = origin.location().join(resource);
                if !path.is_file() {
                    return Ok(None);
                }
                let bytes = std::fs::read(&path).map_err(|source| LoaderError::Read {
                    name: resource.to_string(),
                    location: ResourceLocation::File(path.clone()),
                    source,
                })?;
                Ok(Some(Resource {
                    location: ResourceLocation::File(path),
                    bytes: bytes.into(),
                }))
            }
            OriginKind::Archive => {
                let fs = match self.archives.open(origin.location()) {
                    Ok(fs) => fs,
                    Err(e) => {
                        warn!("Skipping unreadable archive {}: {}", origin, e);
                        return Ok(None);
                    }
                };
                Ok(fs.read(resource).map(|bytes| Resource {
                    location: origin.locate(resource),
                    bytes,
                }))
            }
        }
    }
}

/// Whether `resource` names a path below an origin root: relative, and
/// made of plain components only.
fn stays_inside(resource: &str) -> bool {
    !resource.is_empty()
        && Path::new(resource)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
