// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Install-once transformation capability

use bytes::Bytes;
use std::sync::{Arc, OnceLock};
use tracing::info;

use crate::error::{LoaderError, Result, TransformError};

/// Rewrites a symbol's raw definition before it is defined
pub trait Transformer: Send + Sync {
    /// Transform the raw definition of `name`
    fn transform(&self, name: &str, bytes: Bytes) -> std::result::Result<Bytes, TransformError>;
}

impl<F> Transformer for F
where
    F: Fn(&str, Bytes) -> std::result::Result<Bytes, TransformError> + Send + Sync,
{
    fn transform(&self, name: &str, bytes: Bytes) -> std::result::Result<Bytes, TransformError> {
        self(name, bytes)
    }
}

/// Slot holding the transformer once installed. Never uninstalled.
#[derive(Default)]
pub struct TransformSlot {
    installed: OnceLock<Arc<dyn Transformer>>,
}

impl TransformSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the transformer; fails if one is already installed
    pub fn install(&self, transformer: Arc<dyn Transformer>) -> Result<()> {
        self.installed
            .set(transformer)
            .map_err(|_| LoaderError::DoubleInstall)?;
        info!("Transformer installed");
        Ok(())
    }

    /// The installed transformer, if any
    pub fn get(&self) -> Option<&Arc<dyn Transformer>> {
        self.installed.get()
    }

    /// Whether a transformer is installed
    pub fn is_installed(&self) -> bool {
        self.installed.get().is_some()
    }
}
