// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Origins, origin tags and resource locations

use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{LoaderError, Result};

/// How an origin stores its resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginKind {
    /// Exploded directory tree
    Directory,
    /// Single-file archive
    Archive,
}

/// A registered location supplying symbol definitions and resources
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    location: PathBuf,
    kind: OriginKind,
}

impl Origin {
    /// Normalize `path` into an origin. The path must exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let location = normalize_existing(path)?;
        let kind = if location.is_dir() {
            OriginKind::Directory
        } else {
            OriginKind::Archive
        };
        Ok(Self { location, kind })
    }

    /// Canonical location of the origin
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Storage kind
    pub fn kind(&self) -> OriginKind {
        self.kind
    }

    /// Location of `resource` inside this origin
    pub fn locate(&self, resource: &str) -> ResourceLocation {
        match self.kind {
            OriginKind::Directory => ResourceLocation::File(self.location.join(resource)),
            OriginKind::Archive => ResourceLocation::Archive {
                archive: self.location.clone(),
                entry: resource.to_string(),
            },
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location.display())
    }
}

/// Canonicalize a path that must already exist
pub fn normalize_existing(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|source| LoaderError::OriginUnavailable {
            path: path.to_path_buf(),
            source,
        })
}

/// Provenance class attached to an origin at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginTag {
    /// The host application's own archive
    Primary,
    /// The loader's internal support code
    Support,
    /// Auxiliary archive registered before the host starts
    Early,
    /// Locally provided by a module-loading subsystem
    Local,
}

impl OriginTag {
    /// Whether definitions from this origin yield to local ones
    pub fn is_early(self) -> bool {
        matches!(self, OriginTag::Early)
    }
}

/// Process-wide store of origin tags, keyed by canonical location
#[derive(Debug, Default)]
pub struct OriginTagStore {
    tags: DashMap<PathBuf, OriginTag>,
}

impl OriginTagStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tag for a location
    pub fn put(&self, location: impl Into<PathBuf>, tag: OriginTag) {
        self.tags.insert(location.into(), tag);
    }

    /// Look up the tag for a location
    pub fn get(&self, location: &Path) -> Option<OriginTag> {
        self.tags.get(location).map(|entry| *entry)
    }

    /// Number of tagged locations
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether no location is tagged
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Where a resource was found
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceLocation {
    /// Plain file on disk
    File(PathBuf),
    /// Entry inside an archive
    Archive {
        /// Archive file
        archive: PathBuf,
        /// Entry path inside the archive
        entry: String,
    },
    /// Anything else a fallback loader may hand out
    Other(Url),
}

impl ResourceLocation {
    /// Code source that served `resource` from this location.
    ///
    /// For a plain file this strips the resource's own path components,
    /// so `/lib/a/b/C.sym` for `a/b/C.sym` yields `/lib`. The result is
    /// canonicalized when the path exists.
    pub fn code_source(&self, resource: &str) -> Option<PathBuf> {
        let source = match self {
            ResourceLocation::File(path) => {
                let depth = resource.split('/').filter(|part| !part.is_empty()).count();
                let mut base = path.as_path();
                for _ in 0..depth {
                    base = base.parent()?;
                }
                base.to_path_buf()
            }
            ResourceLocation::Archive { archive, .. } => archive.clone(),
            ResourceLocation::Other(_) => return None,
        };
        Some(source.canonicalize().unwrap_or(source))
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLocation::File(path) => write!(f, "file://{}", path.display()),
            ResourceLocation::Archive { archive, entry } => {
                write!(f, "archive:file://{}!/{}", archive.display(), entry)
            }
            ResourceLocation::Other(url) => write!(f, "{}", url),
        }
    }
}

/// A resource together with the location it was read from
#[derive(Debug, Clone)]
pub struct Resource {
    /// Where the bytes came from
    pub location: ResourceLocation,
    /// Raw content
    pub bytes: Bytes,
}
