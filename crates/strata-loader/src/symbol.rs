// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Defined symbols

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::metadata::OriginDescriptor;

/// Loader that defined a symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinedBy {
    /// The layered loader, from a registered origin
    Layered,
    /// The layered loader, from bytes served by the fallback loader
    LayeredFromFallback,
    /// The fallback loader itself
    Fallback,
    /// The platform bootstrap loader
    Bootstrap,
    /// A named module loader
    Module(String),
}

/// A named, immutable binary definition
#[derive(Debug, Clone)]
pub struct Symbol {
    name: String,
    bytes: Bytes,
    code_source: Option<PathBuf>,
    descriptor: Arc<OriginDescriptor>,
    defined_by: DefinedBy,
}

impl Symbol {
    /// Create a symbol with no code source and an empty descriptor
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>, defined_by: DefinedBy) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            code_source: None,
            descriptor: Arc::new(OriginDescriptor::default()),
            defined_by,
        }
    }

    /// Attach the code source the definition came from
    pub fn with_code_source(mut self, code_source: impl Into<PathBuf>) -> Self {
        self.code_source = Some(code_source.into());
        self
    }

    /// Attach origin metadata
    pub fn with_descriptor(mut self, descriptor: Arc<OriginDescriptor>) -> Self {
        self.descriptor = descriptor;
        self
    }

    /// Fully-qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Final (possibly transformed) definition
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Canonical location of the defining origin, if known
    pub fn code_source(&self) -> Option<&Path> {
        self.code_source.as_deref()
    }

    /// Descriptor of the defining origin
    pub fn descriptor(&self) -> &Arc<OriginDescriptor> {
        &self.descriptor
    }

    /// Signing identities of the defining origin
    pub fn signers(&self) -> &[String] {
        self.descriptor.signers()
    }

    /// Which loader defined the symbol
    pub fn defined_by(&self) -> &DefinedBy {
        &self.defined_by
    }
}
