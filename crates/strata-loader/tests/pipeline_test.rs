// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Layered loading behaviour: origins, fallback delegation, provenance,
//! transformation and concurrent loads.

mod common;

use bytes::Bytes;
use common::{write_dir, write_tar, ScriptedFallback};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use strata_loader::{
    DefinedBy, FallbackLoader, LoaderError, OriginTag, ResourceLocation, SearchPathLoader,
    SymbolLoadPipeline, TransformError, Transformer,
};

const CALLERS: usize = 64;

fn counting_transformer(calls: Arc<AtomicUsize>) -> Arc<dyn Transformer> {
    Arc::new(move |_name: &str, bytes: Bytes| -> Result<Bytes, TransformError> {
        calls.fetch_add(1, Ordering::SeqCst);
        let mut out = b"T:".to_vec();
        out.extend_from_slice(&bytes);
        Ok(Bytes::from(out))
    })
}

#[test]
fn test_registered_origin_wins_over_fallback() {
    let dir = tempfile::tempdir().unwrap();
    write_dir(dir.path(), &[("app/Main.sym", "layered")]);

    let fallback = Arc::new(ScriptedFallback::new());
    fallback.define("app.Main", "fallback");
    let pipeline = SymbolLoadPipeline::new(fallback.clone());
    pipeline.register_origin(dir.path(), Some(OriginTag::Primary)).unwrap();

    let symbol = pipeline.load("app.Main").unwrap();
    assert_eq!(symbol.bytes().as_ref(), b"layered");
    assert_eq!(symbol.defined_by(), &DefinedBy::Layered);
}

#[test]
fn test_unregistered_name_delegates_to_fallback() {
    let fallback = Arc::new(ScriptedFallback::new());
    let remote = ResourceLocation::Other(url::Url::parse("mem://host/app/Util.sym").unwrap());
    fallback.serve("app/Util.sym", remote, "util");
    let own = fallback.define("app.Util", "util");

    let pipeline = SymbolLoadPipeline::new(fallback.clone());
    let symbol = pipeline.load("app.Util").unwrap();

    assert!(Arc::ptr_eq(&symbol, &own));
    assert!(!pipeline.is_loaded("app.Util"));
    // Delegation alone does not make the name fallback-sourced.
    assert!(!pipeline.provenance().is_fallback_sourced("app.Util"));
}

#[test]
fn test_missing_everywhere_is_not_found() {
    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    let err = pipeline.load("app.Nowhere").unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("app.Nowhere"));
}

#[test]
fn test_nested_symbols_follow_enclosing_provenance() {
    let lib = tempfile::tempdir().unwrap();
    write_dir(
        lib.path(),
        &[("app/Outer.sym", "outer"), ("app/Outer$Inner.sym", "inner")],
    );
    let fallback = Arc::new(SearchPathLoader::new(&[lib.path()], ".sym").unwrap());
    let pipeline = SymbolLoadPipeline::new(fallback.clone());

    let outer = pipeline.load_with_fallback("app.Outer").unwrap();
    assert_eq!(outer.defined_by(), &DefinedBy::LayeredFromFallback);
    assert_eq!(outer.code_source(), Some(lib.path().canonicalize().unwrap().as_path()));
    assert!(pipeline.provenance().is_marked("app.Outer"));

    // The nested symbol is defined by the layered loader too, not delegated.
    let inner = pipeline.load("app.Outer$Inner").unwrap();
    assert_eq!(inner.defined_by(), &DefinedBy::LayeredFromFallback);
    assert_eq!(inner.bytes().as_ref(), b"inner");
    assert!(pipeline.provenance().is_marked("app.Outer$Inner"));
    assert_eq!(fallback.defined(), 0);
    assert_eq!(pipeline.defined_namespaces(), vec!["app".to_string()]);
}

#[test]
fn test_shadowed_fallback_copy_is_refused() {
    let registered = tempfile::tempdir().unwrap();
    write_dir(registered.path(), &[("app/Fresh.sym", "fresh")]);

    let fallback = Arc::new(ScriptedFallback::new());
    // The fallback still thinks the registered directory holds app/Stale.sym.
    let stale = ResourceLocation::File(registered.path().join("app/Stale.sym"));
    fallback.serve("app/Stale.sym", stale, "stale");
    fallback.define("app.Stale", "stale");

    let pipeline = SymbolLoadPipeline::new(fallback.clone());
    pipeline.register_origin(registered.path(), None).unwrap();

    let err = pipeline.load("app.Stale").unwrap_err();
    assert!(matches!(err, LoaderError::Shadowed { ref name, .. } if name == "app.Stale"));
    assert!(err.is_not_found());

    let err = pipeline.load_with_fallback("app.Stale").unwrap_err();
    assert!(matches!(err, LoaderError::Shadowed { .. }));
    assert_eq!(pipeline.defined_count(), 0);
}

#[test]
fn test_other_scheme_locations_are_never_shadowed() {
    let registered = tempfile::tempdir().unwrap();
    let fallback = Arc::new(ScriptedFallback::new());
    let remote = ResourceLocation::Other(url::Url::parse("mem://host/app/Remote.sym").unwrap());
    fallback.serve("app/Remote.sym", remote, "remote");

    let pipeline = SymbolLoadPipeline::new(fallback.clone());
    pipeline.register_origin(registered.path(), None).unwrap();

    let symbol = pipeline.load_with_fallback("app.Remote").unwrap();
    assert_eq!(symbol.bytes().as_ref(), b"remote");
    assert_eq!(symbol.code_source(), None);
    assert!(symbol.descriptor().is_empty());
}

#[test]
fn test_second_install_fails() {
    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    assert!(!pipeline.is_transform_installed());

    let calls = Arc::new(AtomicUsize::new(0));
    pipeline.install_transform(counting_transformer(calls.clone())).unwrap();
    let err = pipeline
        .install_transform(counting_transformer(calls))
        .unwrap_err();
    assert!(matches!(err, LoaderError::DoubleInstall));
    assert!(pipeline.is_transform_installed());
}

#[test]
fn test_definitions_after_install_are_transformed() {
    let dir = tempfile::tempdir().unwrap();
    write_dir(dir.path(), &[("app/Early.sym", "early"), ("app/Late.sym", "late")]);

    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    pipeline.register_origin(dir.path(), None).unwrap();

    let early = pipeline.load("app.Early").unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    pipeline.install_transform(counting_transformer(calls.clone())).unwrap();
    let late = pipeline.load("app.Late").unwrap();

    // Already-defined symbols are not retroactively rewritten.
    assert_eq!(early.bytes().as_ref(), b"early");
    assert!(Arc::ptr_eq(&early, &pipeline.load("app.Early").unwrap()));
    assert_eq!(late.bytes().as_ref(), b"T:late");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(pipeline.raw_bytes("app.Late").unwrap().unwrap().as_ref(), b"late");
    assert_eq!(
        pipeline.symbol_bytes("app.Early", true).unwrap().unwrap().as_ref(),
        b"T:early"
    );
    assert_eq!(
        pipeline.symbol_bytes("app.Early", false).unwrap().unwrap().as_ref(),
        b"early"
    );
}

#[test]
fn test_transform_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_dir(dir.path(), &[("app/Bad.sym", "bad")]);

    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    pipeline.register_origin(dir.path(), None).unwrap();
    pipeline
        .install_transform(Arc::new(
            |name: &str, _bytes: Bytes| -> Result<Bytes, TransformError> {
                Err(format!("cannot rewrite {}", name).into())
            },
        ))
        .unwrap();

    let err = pipeline.load("app.Bad").unwrap_err();
    assert!(matches!(err, LoaderError::Transform { ref name, .. } if name == "app.Bad"));
    assert!(!err.is_not_found());
    assert!(!pipeline.is_loaded("app.Bad"));
}

#[test]
fn test_excluded_names_bypass_transform() {
    let dir = tempfile::tempdir().unwrap();
    write_dir(dir.path(), &[("vendor/Lib.sym", "lib")]);

    let mut config = strata_loader::LoaderConfig::default();
    config.set("transform-exclusions", "vendor.");
    let pipeline = SymbolLoadPipeline::builder(Arc::new(ScriptedFallback::new()))
        .config(config)
        .build();
    pipeline.register_origin(dir.path(), None).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    pipeline.install_transform(counting_transformer(calls.clone())).unwrap();

    assert_eq!(pipeline.load("vendor.Lib").unwrap().bytes().as_ref(), b"lib");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_loads_define_once() {
    let dir = tempfile::tempdir().unwrap();
    write_dir(dir.path(), &[("app/Hot.sym", "hot")]);

    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    pipeline.register_origin(dir.path(), Some(OriginTag::Primary)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    pipeline.install_transform(counting_transformer(calls.clone())).unwrap();

    let barrier = Barrier::new(CALLERS);
    let symbols: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    pipeline.load("app.Hot").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.defined_count(), 1);
    assert!(symbols.iter().all(|s| Arc::ptr_eq(s, &symbols[0])));
    assert_eq!(symbols[0].bytes().as_ref(), b"T:hot");
}

#[test]
fn test_concurrent_fallback_loads_fetch_once() {
    let fallback = Arc::new(ScriptedFallback::new());
    let remote = ResourceLocation::Other(url::Url::parse("mem://host/app/Lazy.sym").unwrap());
    fallback.serve("app/Lazy.sym", remote, "lazy");

    let pipeline = SymbolLoadPipeline::new(fallback.clone());
    let barrier = Barrier::new(CALLERS);
    let symbols: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    pipeline.load_with_fallback("app.Lazy").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(fallback.fetches(), 1);
    assert!(symbols.iter().all(|s| Arc::ptr_eq(s, &symbols[0])));
    assert!(pipeline.provenance().is_marked("app.Lazy"));
}

#[test]
fn test_archive_origin_carries_descriptor_and_signers() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_tar(
        &dir.path().join("server.tar"),
        &[
            ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0\nEntry-Symbol: app.Main\n"),
            ("META-INF/RELEASE.sig", "release-key\n"),
            ("app/Main.sym", "main"),
        ],
    );

    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    pipeline.register_origin(&archive, Some(OriginTag::Primary)).unwrap();

    let symbol = pipeline.load("app.Main").unwrap();
    assert_eq!(symbol.bytes().as_ref(), b"main");
    assert_eq!(symbol.descriptor().get("Entry-Symbol"), Some("app.Main"));
    assert_eq!(symbol.signers(), ["release-key".to_string()]);

    let canonical = archive.canonicalize().unwrap();
    assert!(pipeline.metadata().is_cached(&canonical));
    assert!(Arc::ptr_eq(
        symbol.descriptor(),
        &pipeline.metadata().descriptor_for(&canonical)
    ));
}

#[test]
fn test_descriptor_after_leading_block_is_found() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_tar(
        &dir.path().join("late.tar"),
        &[
            ("app/Main.sym", "main"),
            ("META-INF/MANIFEST.MF", "Implementation-Title: late\n"),
        ],
    );

    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    pipeline.register_origin(&archive, None).unwrap();

    let symbol = pipeline.load("app.Main").unwrap();
    assert_eq!(symbol.descriptor().get("Implementation-Title"), Some("late"));
    assert!(symbol.signers().is_empty());
}

#[test]
fn test_gzip_archive_origin() {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let dir = tempfile::tempdir().unwrap();
    let plain = write_tar(&dir.path().join("plain.tar"), &[("app/Zip.sym", "zipped")]);
    let gz_path = dir.path().join("ext.tgz");
    let mut encoder = GzEncoder::new(std::fs::File::create(&gz_path).unwrap(), Compression::default());
    std::io::copy(&mut std::fs::File::open(&plain).unwrap(), &mut encoder).unwrap();
    encoder.finish().unwrap();

    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    pipeline.register_origin(&gz_path, Some(OriginTag::Early)).unwrap();
    assert_eq!(pipeline.load("app.Zip").unwrap().bytes().as_ref(), b"zipped");
}

#[test]
fn test_registration_reaches_names_the_fallback_already_saw() {
    let lib = tempfile::tempdir().unwrap();
    write_dir(lib.path(), &[("app/Late.sym", "old")]);
    let ext = tempfile::tempdir().unwrap();
    write_dir(ext.path(), &[("app/Late.sym", "new")]);

    let fallback = Arc::new(SearchPathLoader::new(&[lib.path()], ".sym").unwrap());
    assert!(fallback.load_symbol_if_present("app.Late").is_some());

    let pipeline = SymbolLoadPipeline::new(fallback);
    pipeline.register_origin(ext.path(), Some(OriginTag::Early)).unwrap();

    let symbol = pipeline.load("app.Late").unwrap();
    assert_eq!(symbol.bytes().as_ref(), b"new");
    assert_eq!(symbol.defined_by(), &DefinedBy::Layered);
}

#[test]
fn test_resource_lookups_prefer_registered_origins() {
    let registered = tempfile::tempdir().unwrap();
    write_dir(registered.path(), &[("data/config.txt", "mine")]);
    let lib = tempfile::tempdir().unwrap();
    write_dir(lib.path(), &[("data/config.txt", "theirs"), ("data/only.txt", "fallback")]);

    let fallback = Arc::new(SearchPathLoader::new(&[lib.path()], ".sym").unwrap());
    let pipeline = SymbolLoadPipeline::new(fallback);
    pipeline.register_origin(registered.path(), None).unwrap();

    assert_eq!(
        pipeline.resource_bytes("data/config.txt").unwrap().unwrap().as_ref(),
        b"mine"
    );
    assert_eq!(pipeline.resources("data/config.txt").len(), 1);
    assert_eq!(
        pipeline.resource_bytes("data/only.txt").unwrap().unwrap().as_ref(),
        b"fallback"
    );
    assert!(pipeline.resource("data/none.txt").is_none());
}

#[test]
fn test_resource_names_outside_origins_are_not_served() {
    let root = tempfile::tempdir().unwrap();
    let origin = root.path().join("origin");
    write_dir(&origin, &[("app/Main.sym", "main")]);
    write_dir(&root.path().join("outside"), &[("Secret.sym", "not-in-any-origin")]);

    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    pipeline.register_origin(&origin, None).unwrap();

    let absolute = root.path().join("outside/Secret.sym");
    assert!(pipeline.resource_bytes(absolute.to_str().unwrap()).unwrap().is_none());
    assert!(pipeline.resource_bytes("../outside/Secret.sym").unwrap().is_none());
    assert!(pipeline.resource("../outside/Secret.sym").is_none());
    assert!(pipeline.resources("../outside/Secret.sym").is_empty());
    assert!(pipeline.resource_bytes("app/Main.sym").unwrap().is_some());
}

#[test]
fn test_truncated_extension_does_not_stop_loading() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.tar");
    let mut header = tar::Header::new_gnu();
    header.set_path("META-INF/MANIFEST.MF").unwrap();
    header.set_size(1 << 60);
    header.set_mode(0o644);
    header.set_cksum();
    let mut bytes = header.as_bytes().to_vec();
    bytes.extend_from_slice(b"nothing!");
    std::fs::write(&broken, bytes).unwrap();

    let good = tempfile::tempdir().unwrap();
    write_dir(good.path(), &[("app/Main.sym", "main")]);

    let pipeline = SymbolLoadPipeline::new(Arc::new(ScriptedFallback::new()));
    pipeline.register_origin(&broken, Some(OriginTag::Early)).unwrap();
    pipeline.register_origin(good.path(), Some(OriginTag::Primary)).unwrap();

    assert_eq!(pipeline.load("app.Main").unwrap().bytes().as_ref(), b"main");
    assert!(pipeline.metadata().descriptor_for(&broken.canonicalize().unwrap()).is_empty());
}
