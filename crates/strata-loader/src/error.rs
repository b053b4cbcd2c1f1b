// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the loader

use std::path::PathBuf;
use thiserror::Error;

use crate::origin::ResourceLocation;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Failure reported by an installed transformer
pub type TransformError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while registering origins or loading symbols
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Symbol resolves nowhere
    #[error("Cannot find symbol '{name}'")]
    NotFound {
        /// Fully-qualified symbol name
        name: String,
    },

    /// The fallback loader returned a location that a registered origin now owns
    #[error("Symbol '{name}' is present in the fallback loader but its location {location} is shadowed by a registered origin")]
    Shadowed {
        /// Fully-qualified symbol name
        name: String,
        /// Location reported by the fallback loader
        location: ResourceLocation,
    },

    /// The installed transformer rejected a definition
    #[error("Transformation of '{name}' failed")]
    Transform {
        /// Fully-qualified symbol name
        name: String,
        /// Transformer failure
        #[source]
        source: TransformError,
    },

    /// A transformer was installed twice
    #[error("Transformer is already installed")]
    DoubleInstall,

    /// Reading a resource failed
    #[error("Failed to read '{name}' from {location}")]
    Read {
        /// Resource name
        name: String,
        /// Where the read was attempted
        location: ResourceLocation,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// An origin path could not be normalized
    #[error("Origin {path} is unavailable")]
    OriginUnavailable {
        /// Path as given by the caller
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Loader configuration could not be read
    #[error("Invalid loader configuration {path}: {reason}")]
    Config {
        /// Configuration file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },
}

impl LoaderError {
    /// Create a not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Whether the error means the symbol is simply unavailable
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Shadowed { .. })
    }
}
