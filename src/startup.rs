// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host startup: locate origins, assemble the layered loader

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_loader::{
    LoaderConfig, OriginTag, SearchPathLoader, SymbolLoadPipeline, TransformError,
};
use tracing::{debug, info, warn};

/// Environment variable naming the primary archive
pub const PRIMARY_ENV: &str = "STRATA_PRIMARY";

/// Descriptor key naming the host's entry symbol
pub const ENTRY_KEY: &str = "Entry-Symbol";

/// Descriptor key listing an archive's transform configurations
pub const TRANSFORM_CONFIGS_KEY: &str = "Transform-Configs";

const ARCHIVE_SUFFIXES: &[&str] = &[".tar", ".tgz", ".tar.gz"];

/// Whether `path` names a loadable archive
pub fn is_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Find the primary archive: `--primary`, then `STRATA_PRIMARY`, then the
/// first archive-looking host argument.
pub fn locate_primary(explicit: Option<&Path>, args: &[String]) -> Result<PathBuf> {
    let candidate = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(PRIMARY_ENV).map(PathBuf::from))
        .or_else(|| {
            args.iter()
                .map(PathBuf::from)
                .find(|arg| is_archive(arg))
        });

    let Some(primary) = candidate else {
        bail!("No primary archive given; pass --primary or set {}", PRIMARY_ENV);
    };
    if !primary.is_file() {
        bail!("Primary archive {} does not exist", primary.display());
    }
    Ok(primary)
}

/// Host arguments with the loader's own arguments removed
pub fn strip_args(args: &[String], primary: &Path) -> Vec<String> {
    args.iter()
        .filter(|arg| Path::new(arg.as_str()) != primary)
        .cloned()
        .collect()
}

/// Auxiliary archives in `dir`, sorted by path. A missing directory has none.
pub fn collect_extensions(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        debug!("No extension directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_archive(&path) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Location of the loader's own code: the directory of the running executable
pub fn default_support() -> Option<PathBuf> {
    match std::env::current_exe() {
        Ok(exe) => exe.parent().map(Path::to_path_buf),
        Err(e) => {
            warn!("Cannot locate the loader executable: {}", e);
            None
        }
    }
}

/// Origins to register, in registration order
#[derive(Debug, Clone, Default)]
pub struct StartupPlan {
    /// Host's primary archive
    pub primary: PathBuf,
    /// Loader support code, if any
    pub support: Option<PathBuf>,
    /// Auxiliary archives, registered early
    pub extensions: Vec<PathBuf>,
    /// Search path of the fallback loader
    pub classpath: Vec<PathBuf>,
}

/// Build the fallback loader and pipeline and register every origin
pub fn assemble(plan: &StartupPlan, config: LoaderConfig) -> Result<Arc<SymbolLoadPipeline>> {
    let fallback = SearchPathLoader::new(&plan.classpath, &config.resource_suffix)
        .context("Building the fallback search path")?;
    let pipeline = SymbolLoadPipeline::builder(Arc::new(fallback))
        .config(config)
        .build();

    pipeline
        .register_origin(&plan.primary, Some(OriginTag::Primary))
        .with_context(|| format!("Registering primary archive {}", plan.primary.display()))?;
    if let Some(support) = &plan.support {
        pipeline
            .register_origin(support, Some(OriginTag::Support))
            .with_context(|| format!("Registering support code {}", support.display()))?;
    }
    for extension in &plan.extensions {
        if let Err(e) = pipeline.register_origin(extension, Some(OriginTag::Early)) {
            warn!("Skipping extension {}: {}", extension.display(), e);
        }
    }

    info!("Registered {} origin(s)", pipeline.registry().len());
    Ok(Arc::new(pipeline))
}

/// Compute every origin's descriptor in parallel
pub fn prewarm(pipeline: &SymbolLoadPipeline) -> usize {
    let origins = pipeline.registry().origins();
    origins
        .par_iter()
        .map(|origin| pipeline.metadata().descriptor_for(origin.location()))
        .filter(|descriptor| !descriptor.is_empty())
        .count()
}

/// Transform configurations declared by the registered origins, with the
/// origin declaring each
pub fn transform_configs(pipeline: &SymbolLoadPipeline) -> Vec<(String, PathBuf)> {
    let mut configs = Vec::new();
    for origin in pipeline.registry().origins() {
        let descriptor = pipeline.metadata().descriptor_for(origin.location());
        let Some(value) = descriptor.get(TRANSFORM_CONFIGS_KEY) else {
            continue;
        };
        for name in value.split([',', ' ']).filter(|n| !n.is_empty()) {
            if configs.iter().any(|(existing, _)| existing == name) {
                warn!("Duplicate transform config {} in {}", name, origin);
                continue;
            }
            configs.push((name.to_string(), origin.location().to_path_buf()));
        }
    }
    configs
}

/// Install the identity transformer
pub fn install_passthrough(pipeline: &SymbolLoadPipeline) -> Result<()> {
    pipeline.install_transform(Arc::new(
        |name: &str, bytes: Bytes| -> std::result::Result<Bytes, TransformError> {
            tracing::trace!("Passing {} through unchanged", name);
            Ok(bytes)
        },
    ))?;
    Ok(())
}

/// Entry symbol: explicit, else the primary archive's descriptor
pub fn entry_symbol(pipeline: &SymbolLoadPipeline, explicit: Option<&str>, primary: &Path) -> Result<String> {
    if let Some(entry) = explicit {
        return Ok(entry.to_string());
    }
    let location = primary
        .canonicalize()
        .with_context(|| format!("Resolving {}", primary.display()))?;
    match pipeline.metadata().descriptor_for(&location).get(ENTRY_KEY) {
        Some(entry) => Ok(entry.to_string()),
        None => bail!(
            "{} declares no {}; pass --entry",
            primary.display(),
            ENTRY_KEY
        ),
    }
}
