// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # strata-loader
//!
//! A layered symbol loader for long-running host processes.
//!
//! Symbols (named binary definitions such as `app.Main` or `app.Main$Inner`)
//! are assembled from several origins into one namespace:
//!
//! - the host's primary archive
//! - the loader's own support code
//! - auxiliary extension archives registered before the host starts
//!
//! Each new definition can be rewritten by an installed [`Transformer`]
//! before it becomes active. Names no registered origin provides are handed
//! to a pre-existing [`FallbackLoader`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_loader::{OriginTag, SearchPathLoader, SymbolLoadPipeline};
//!
//! let fallback = Arc::new(SearchPathLoader::new(&["lib"], ".sym")?);
//! let pipeline = SymbolLoadPipeline::new(fallback);
//! pipeline.register_origin("server.tar", Some(OriginTag::Primary))?;
//! let main = pipeline.load("app.Main")?;
//! ```
//!
//! ## Components
//!
//! - [`CodeSourceRegistry`]: ordered, append-only origin set
//! - [`MetadataCache`]: memoized per-origin descriptors
//! - [`ProvenanceTracker`]: symbols satisfied via the fallback loader
//! - [`SymbolLoadPipeline`]: fetch, transform, define
//! - [`ConflictResolver`] and [`ModuleLoader`]: origin priority for
//!   secondary module loaders

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod archive;
pub mod config;
pub mod conflict;
pub mod error;
pub mod fallback;
pub mod metadata;
pub mod module_loader;
pub mod naming;
pub mod origin;
pub mod pipeline;
pub mod provenance;
pub mod registry;
pub mod symbol;
pub mod transform;

// Re-exports
pub use archive::{ArchiveFs, ArchiveHandle, ArchiveTable};
pub use config::LoaderConfig;
pub use conflict::{ConflictResolver, LocalLookup};
pub use error::{LoaderError, Result, TransformError};
pub use fallback::{BootstrapLoader, FallbackLoader, NoBootstrap, SearchPathLoader};
pub use metadata::{MetadataCache, OriginDescriptor};
pub use module_loader::ModuleLoader;
pub use origin::{Origin, OriginKind, OriginTag, OriginTagStore, Resource, ResourceLocation};
pub use pipeline::{PipelineBuilder, SymbolLoadPipeline};
pub use provenance::ProvenanceTracker;
pub use registry::{CodeSourceRegistry, RegistrySnapshot};
pub use symbol::{DefinedBy, Symbol};
pub use transform::{TransformSlot, Transformer};

/// Version of the loader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
