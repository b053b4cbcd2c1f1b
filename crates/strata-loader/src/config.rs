// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration

use serde::Deserialize;
use std::path::Path;

use crate::error::{LoaderError, Result};

/// Environment variable that turns on per-lookup diagnostics
pub const DEBUG_ENV: &str = "STRATA_DEBUG_LOADER";

/// Prefix of environment variables overriding configuration keys
pub const ENV_PREFIX: &str = "STRATA_LOADER_";

/// Configuration for a loader instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoaderConfig {
    /// Name prefixes served only by the bootstrap loader
    pub bootstrap_prefixes: Vec<String>,

    /// Name prefixes of shared support code, served by the support loader
    pub support_prefixes: Vec<String>,

    /// The loader's own symbol name, always served by the support loader
    pub self_name: String,

    /// Suffix mapping a symbol name to its resource
    pub resource_suffix: String,

    /// Descriptor path inside an origin
    pub descriptor_path: String,

    /// Suffix of signing-identity entries next to the descriptor
    pub signer_suffix: String,

    /// Resource names a module loader never resolves (case-insensitive)
    pub reserved_resources: Vec<String>,

    /// Name prefixes the transformer never sees
    pub transform_exclusions: Vec<String>,

    /// Log every failed lookup
    pub debug_lookups: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            bootstrap_prefixes: vec!["std.".to_string()],
            support_prefixes: vec!["strata.shared.".to_string()],
            self_name: "strata.loader.LayeredLoader".to_string(),
            resource_suffix: ".sym".to_string(),
            descriptor_path: "META-INF/MANIFEST.MF".to_string(),
            signer_suffix: ".sig".to_string(),
            reserved_resources: vec!["manifest.json".to_string()],
            transform_exclusions: Vec::new(),
            debug_lookups: false,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.load_from_env();
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| LoaderError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| LoaderError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply `STRATA_LOADER_*` and `STRATA_DEBUG_LOADER` variables
    pub fn load_from_env(&mut self) {
        if std::env::var_os(DEBUG_ENV).is_some() {
            self.debug_lookups = true;
        }
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                let config_key = config_key.to_lowercase().replace('_', "-");
                self.set(&config_key, &value);
            }
        }
    }

    /// Set a configuration value. List values are comma-separated.
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "bootstrap-prefixes" => self.bootstrap_prefixes = split_list(value),
            "support-prefixes" => self.support_prefixes = split_list(value),
            "self-name" => self.self_name = value.to_string(),
            "resource-suffix" => self.resource_suffix = value.to_string(),
            "descriptor-path" => self.descriptor_path = value.to_string(),
            "signer-suffix" => self.signer_suffix = value.to_string(),
            "reserved-resources" => self.reserved_resources = split_list(value),
            "transform-exclusions" => self.transform_exclusions = split_list(value),
            "debug-lookups" => self.debug_lookups = value == "true" || value == "1",
            _ => {}
        }
    }

    /// Whether `name` is served by the bootstrap loader
    pub fn is_bootstrap(&self, name: &str) -> bool {
        self.bootstrap_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Whether `name` is served by the support loader
    pub fn is_support(&self, name: &str) -> bool {
        name == self.self_name
            || self.support_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Whether the transformer may see `name`
    pub fn can_transform(&self, name: &str) -> bool {
        !self.transform_exclusions.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Whether `resource` is reserved for module-loader self-description
    pub fn is_reserved_resource(&self, resource: &str) -> bool {
        self.reserved_resources
            .iter()
            .any(|r| r.eq_ignore_ascii_case(resource))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
