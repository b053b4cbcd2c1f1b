// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Symbol load pipeline
//!
//! Turns a symbol name into a defined [`Symbol`]:
//!
//! 1. Return the existing definition if the name is already defined
//! 2. Route bootstrap and support names to their own loaders
//! 3. Fetch raw bytes from the registered origins, or from the fallback
//!    loader when provenance sanctions it
//! 4. Run the installed transformer
//! 5. Define the symbol with its origin's descriptor
//!
//! Names the pipeline cannot define itself are delegated to the fallback
//! loader, unless a registered origin shadows the fallback's copy.
//!
//! Every request for a name runs under that name's lock, so concurrent
//! requests collapse into one fetch, one transformation and one definition.

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::archive::ArchiveTable;
use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::fallback::{BootstrapLoader, FallbackLoader, NoBootstrap};
use crate::metadata::{MetadataCache, OriginDescriptor};
use crate::naming::{namespace_of, resource_name, symbol_name};
use crate::origin::{OriginTag, OriginTagStore, ResourceLocation};
use crate::provenance::ProvenanceTracker;
use crate::registry::CodeSourceRegistry;
use crate::symbol::{DefinedBy, Symbol};
use crate::transform::{TransformSlot, Transformer};

/// Raw definition located for a symbol
struct Fetched {
    bytes: Bytes,
    code_source: Option<PathBuf>,
    via_fallback: bool,
}

/// Builder for [`SymbolLoadPipeline`]
pub struct PipelineBuilder {
    config: LoaderConfig,
    fallback: Arc<dyn FallbackLoader>,
    bootstrap: Arc<dyn BootstrapLoader>,
    tags: Arc<OriginTagStore>,
    archives: Arc<ArchiveTable>,
}

impl PipelineBuilder {
    /// Use `config` instead of the defaults
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Platform loader for bootstrap names
    pub fn bootstrap(mut self, bootstrap: Arc<dyn BootstrapLoader>) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Share an origin tag store with other loaders
    pub fn tags(mut self, tags: Arc<OriginTagStore>) -> Self {
        self.tags = tags;
        self
    }

    /// Share archive views with other loaders
    pub fn archives(mut self, archives: Arc<ArchiveTable>) -> Self {
        self.archives = archives;
        self
    }

    /// Build the pipeline
    pub fn build(self) -> SymbolLoadPipeline {
        SymbolLoadPipeline {
            registry: CodeSourceRegistry::new(self.tags, self.archives.clone()),
            metadata: MetadataCache::new(&self.config, self.archives),
            provenance: ProvenanceTracker::new(),
            transform: TransformSlot::new(),
            fallback: self.fallback,
            bootstrap: self.bootstrap,
            defined: DashMap::new(),
            locks: DashMap::new(),
            namespaces: DashSet::new(),
            config: self.config,
        }
    }
}

/// The layered loader: registry, metadata, provenance and transformer
/// composed into one symbol namespace
pub struct SymbolLoadPipeline {
    config: LoaderConfig,
    registry: CodeSourceRegistry,
    metadata: MetadataCache,
    provenance: ProvenanceTracker,
    transform: TransformSlot,
    fallback: Arc<dyn FallbackLoader>,
    bootstrap: Arc<dyn BootstrapLoader>,
    defined: DashMap<String, Arc<Symbol>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    namespaces: DashSet<String>,
}

impl SymbolLoadPipeline {
    /// Start building a pipeline over `fallback`
    pub fn builder(fallback: Arc<dyn FallbackLoader>) -> PipelineBuilder {
        PipelineBuilder {
            config: LoaderConfig::default(),
            fallback,
            bootstrap: Arc::new(NoBootstrap),
            tags: Arc::new(OriginTagStore::new()),
            archives: Arc::new(ArchiveTable::new()),
        }
    }

    /// Pipeline with default configuration and no bootstrap loader
    pub fn new(fallback: Arc<dyn FallbackLoader>) -> Self {
        Self::builder(fallback).build()
    }

    /// Register an origin; see [`CodeSourceRegistry::register`]
    pub fn register_origin(&self, path: impl AsRef<Path>, tag: Option<OriginTag>) -> Result<bool> {
        self.registry.register(path, tag)
    }

    /// Install the transformer. Fails if one is already installed.
    pub fn install_transform(&self, transformer: Arc<dyn Transformer>) -> Result<()> {
        self.transform.install(transformer)
    }

    /// Whether a transformer is installed
    pub fn is_transform_installed(&self) -> bool {
        self.transform.is_installed()
    }

    /// Load a symbol by name (`a.b.C` or `a/b/C`)
    pub fn load(&self, name: &str) -> Result<Arc<Symbol>> {
        self.load_inner(&symbol_name(name), false)
    }

    /// Load a symbol, defining it from the fallback loader's bytes when no
    /// registered origin has it. The name is then recorded as
    /// fallback-sourced.
    pub fn load_with_fallback(&self, name: &str) -> Result<Arc<Symbol>> {
        self.load_inner(&symbol_name(name), true)
    }

    /// Whether this pipeline has defined `name`
    pub fn is_loaded(&self, name: &str) -> bool {
        let name = symbol_name(name);
        let lock = self.lock_for(&name);
        let _guard = lock.lock();
        self.defined.contains_key(&name)
    }

    /// Location of a resource: registered origins first, then the fallback
    pub fn resource(&self, resource: &str) -> Option<ResourceLocation> {
        self.registry
            .find(resource)
            .or_else(|| self.fallback.resolve_resource(resource).map(|r| r.location))
    }

    /// Content of a resource: registered origins first, then the fallback
    pub fn resource_bytes(&self, resource: &str) -> Result<Option<Bytes>> {
        if let Some((_, found)) = self.registry.resolve(resource)? {
            return Ok(Some(found.bytes));
        }
        Ok(self.fallback.resolve_resource(resource).map(|r| r.bytes))
    }

    /// Every location of a resource. The fallback is only consulted when no
    /// registered origin has it.
    pub fn resources(&self, resource: &str) -> Vec<ResourceLocation> {
        let found = self.registry.find_all(resource);
        if !found.is_empty() {
            return found;
        }
        self.fallback
            .resolve_resources(resource)
            .into_iter()
            .map(|r| r.location)
            .collect()
    }

    /// Untransformed definition of a symbol, from any source
    pub fn raw_bytes(&self, name: &str) -> Result<Option<Bytes>> {
        let name = symbol_name(name);
        Ok(self.fetch(&name, true)?.map(|fetched| fetched.bytes))
    }

    /// Definition of a symbol, optionally run through the transformer
    pub fn symbol_bytes(&self, name: &str, run_transforms: bool) -> Result<Option<Bytes>> {
        let name = symbol_name(name);
        let Some(fetched) = self.fetch(&name, true)? else {
            return Ok(None);
        };
        if run_transforms {
            self.apply_transform(&name, fetched.bytes).map(Some)
        } else {
            Ok(Some(fetched.bytes))
        }
    }

    /// Namespaces of every symbol this pipeline defined, sorted
    pub fn defined_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.namespaces.iter().map(|n| n.key().clone()).collect();
        namespaces.sort_unstable();
        namespaces
    }

    /// Number of symbols this pipeline defined
    pub fn defined_count(&self) -> usize {
        self.defined.len()
    }

    /// The origin registry
    pub fn registry(&self) -> &CodeSourceRegistry {
        &self.registry
    }

    /// The descriptor cache
    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// The provenance tracker
    pub fn provenance(&self) -> &ProvenanceTracker {
        &self.provenance
    }

    /// The origin tag store
    pub fn tags(&self) -> &Arc<OriginTagStore> {
        self.registry.tags()
    }

    /// Active configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(name) {
            return lock.clone();
        }
        self.locks.entry(name.to_string()).or_default().clone()
    }

    fn load_inner(&self, name: &str, allow_fallback: bool) -> Result<Arc<Symbol>> {
        let lock = self.lock_for(name);
        let _guard = lock.lock();

        if let Some(existing) = self.defined.get(name) {
            return Ok(existing.clone());
        }

        if self.config.is_support(name) {
            return self
                .fallback
                .load_symbol_if_present(name)
                .ok_or_else(|| self.not_found(name));
        }
        if self.config.is_bootstrap(name) {
            return self
                .bootstrap
                .load_symbol(name)
                .ok_or_else(|| self.not_found(name));
        }

        if let Some(symbol) = self.try_define(name, allow_fallback)? {
            return Ok(symbol);
        }
        self.delegate(name)
    }

    /// Define `name` from a registered origin, or from the fallback's bytes
    /// when sanctioned. `Ok(None)` when neither applies.
    fn try_define(&self, name: &str, allow_fallback: bool) -> Result<Option<Arc<Symbol>>> {
        let allow_fallback = allow_fallback || self.provenance.is_fallback_sourced(name);

        let Some(fetched) = self.fetch(name, allow_fallback)? else {
            return Ok(None);
        };
        let bytes = self.apply_transform(name, fetched.bytes)?;

        let defined_by = if fetched.via_fallback {
            self.provenance.mark_fallback_sourced(name);
            DefinedBy::LayeredFromFallback
        } else {
            DefinedBy::Layered
        };

        let descriptor = match &fetched.code_source {
            Some(source) => self.metadata.descriptor_for(source),
            None => Arc::new(OriginDescriptor::default()),
        };

        if let Some(namespace) = namespace_of(name) {
            self.namespaces.insert(namespace.to_string());
        }

        let mut symbol = Symbol::new(name, bytes, defined_by).with_descriptor(descriptor);
        if let Some(source) = fetched.code_source {
            symbol = symbol.with_code_source(source);
        }

        debug!("Defined {} ({} bytes)", name, symbol.bytes().len());
        // A definer that got here first wins; adopt its symbol.
        let symbol = self
            .defined
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(symbol))
            .clone();
        Ok(Some(symbol))
    }

    fn fetch(&self, name: &str, allow_fallback: bool) -> Result<Option<Fetched>> {
        let resource = resource_name(name, &self.config.resource_suffix);

        if let Some((origin, found)) = self.registry.resolve(&resource)? {
            return Ok(Some(Fetched {
                bytes: found.bytes,
                code_source: Some(origin.location().to_path_buf()),
                via_fallback: false,
            }));
        }

        if !allow_fallback {
            return Ok(None);
        }

        let Some(found) = self.fallback.resolve_resource(&resource) else {
            return Ok(None);
        };
        if self.registry.is_shadowed(&found.location, &resource) {
            warn!(
                "Fallback copy of {} at {} is shadowed by a registered origin",
                name, found.location
            );
            return Err(LoaderError::Shadowed {
                name: name.to_string(),
                location: found.location,
            });
        }

        Ok(Some(Fetched {
            code_source: found.location.code_source(&resource),
            bytes: found.bytes,
            via_fallback: true,
        }))
    }

    fn apply_transform(&self, name: &str, bytes: Bytes) -> Result<Bytes> {
        let Some(transformer) = self.transform.get() else {
            return Ok(bytes);
        };
        if !self.config.can_transform(name) {
            return Ok(bytes);
        }
        transformer.transform(name, bytes).map_err(|source| {
            error!("Transformation of {} failed: {}", name, source);
            LoaderError::Transform {
                name: name.to_string(),
                source,
            }
        })
    }

    /// Hand `name` to the fallback loader, refusing stale copies
    fn delegate(&self, name: &str) -> Result<Arc<Symbol>> {
        let resource = resource_name(name, &self.config.resource_suffix);

        let Some(found) = self.fallback.resolve_resource(&resource) else {
            return self
                .bootstrap
                .load_symbol(name)
                .ok_or_else(|| self.not_found(name));
        };

        if self.registry.is_shadowed(&found.location, &resource) {
            warn!(
                "Symbol {} is present in the fallback loader but its location {} is shadowed",
                name, found.location
            );
            return Err(LoaderError::Shadowed {
                name: name.to_string(),
                location: found.location,
            });
        }

        self.fallback
            .load_symbol_if_present(name)
            .ok_or_else(|| self.not_found(name))
    }

    fn not_found(&self, name: &str) -> LoaderError {
        if self.config.debug_lookups {
            warn!("Cannot find symbol {}", name);
        }
        LoaderError::not_found(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Resource;

    /// Fallback loader that knows nothing
    struct Empty;

    impl FallbackLoader for Empty {
        fn resolve_resource(&self, _name: &str) -> Option<Resource> {
            None
        }

        fn load_symbol_if_present(&self, _name: &str) -> Option<Arc<Symbol>> {
            None
        }
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let pipeline = SymbolLoadPipeline::new(Arc::new(Empty));
        let err = pipeline.load("app.Missing").unwrap_err();
        assert!(matches!(err, LoaderError::NotFound { ref name } if name == "app.Missing"));
    }

    #[test]
    fn test_load_from_directory_origin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::write(dir.path().join("app/Main.sym"), "main").unwrap();

        let pipeline = SymbolLoadPipeline::new(Arc::new(Empty));
        pipeline.register_origin(dir.path(), Some(OriginTag::Primary)).unwrap();

        let symbol = pipeline.load("app/Main").unwrap();
        assert_eq!(symbol.name(), "app.Main");
        assert_eq!(symbol.bytes().as_ref(), b"main");
        assert_eq!(symbol.defined_by(), &DefinedBy::Layered);
        assert_eq!(symbol.code_source(), Some(dir.path().canonicalize().unwrap().as_path()));
        assert!(pipeline.is_loaded("app.Main"));
        assert_eq!(pipeline.defined_namespaces(), vec!["app".to_string()]);
    }

    #[test]
    fn test_bootstrap_names_skip_origins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("std")).unwrap();
        std::fs::write(dir.path().join("std/Reader.sym"), "shadow").unwrap();

        let pipeline = SymbolLoadPipeline::new(Arc::new(Empty));
        pipeline.register_origin(dir.path(), None).unwrap();

        assert!(pipeline.load("std.Reader").unwrap_err().is_not_found());
        assert_eq!(pipeline.defined_count(), 0);
    }
}
