// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Fixtures shared by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_loader::{DefinedBy, FallbackLoader, Resource, ResourceLocation, Symbol};

/// Write a directory origin holding `files`
pub fn write_dir(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    for (name, data) in files {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }
    root.to_path_buf()
}

/// Write a tar archive holding `files`, in the given order
pub fn write_tar(path: &Path, files: &[(&str, &str)]) -> PathBuf {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
    path.to_path_buf()
}

/// Fallback loader double with scripted resources and fetch counting
#[derive(Default)]
pub struct ScriptedFallback {
    resources: Mutex<HashMap<String, Resource>>,
    symbols: Mutex<HashMap<String, Arc<Symbol>>>,
    fetches: AtomicUsize,
}

impl ScriptedFallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `resource` from `location`
    pub fn serve(&self, resource: &str, location: ResourceLocation, bytes: &str) {
        self.resources.lock().insert(
            resource.to_string(),
            Resource {
                location,
                bytes: Bytes::from(bytes.to_string()),
            },
        );
    }

    /// Provide the fallback's own definition of `name`
    pub fn define(&self, name: &str, bytes: &str) -> Arc<Symbol> {
        let symbol = Arc::new(Symbol::new(name, bytes.to_string(), DefinedBy::Fallback));
        self.symbols.lock().insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Number of resource lookups that found something
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl FallbackLoader for ScriptedFallback {
    fn resolve_resource(&self, name: &str) -> Option<Resource> {
        let found = self.resources.lock().get(name).cloned();
        if found.is_some() {
            self.fetches.fetch_add(1, Ordering::SeqCst);
        }
        found
    }

    fn load_symbol_if_present(&self, name: &str) -> Option<Arc<Symbol>> {
        self.symbols.lock().get(name).cloned()
    }
}
