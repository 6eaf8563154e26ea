//! Instantiation tests
//!
//! Artifacts are resolved through a hook, fetched and instantiated off the
//! caller's path, and validated against the binding table before any call
//! is allowed.

mod common;

use common::{canvas, loader, loader_with, ADD_ONLY, RED_CANVAS, SPINNING_ADD, WRONG_ADD};
use glbridge::artifact::FetchError;
use glbridge::registry::ExportError;
use glbridge::{Arg, BridgeConfig, CallError, LoadError, Loader, SurfaceHost};
use std::cell::Cell;

#[tokio::test]
async fn add_through_a_resolved_module() {
    let loader = loader(canvas(4, 4), &[("app", RED_CANVAS)]);
    let mut module = loader
        .instantiate(|| "mem:app".to_string())
        .await
        .expect("failed to instantiate");

    assert_eq!(module.uri(), "mem:app");
    assert_eq!(module.add(2, 3).unwrap(), 5);
    assert_eq!(module.add(-1, 1).unwrap(), 0);
    assert_eq!(module.add(100, 200).unwrap(), 300);
}

#[tokio::test]
async fn add_wraps_on_overflow() {
    let loader = loader(canvas(4, 4), &[("app", RED_CANVAS)]);
    let mut module = loader.instantiate(|| "mem:app".to_string()).await.unwrap();

    assert_eq!(module.add(i32::MAX, 1).unwrap(), i32::MIN);
    assert_eq!(module.add(i32::MIN, -1).unwrap(), i32::MAX);
}

#[tokio::test]
async fn resolver_runs_before_instantiation_resolves() {
    let loader = loader(canvas(4, 4), &[("app", RED_CANVAS)]);
    let calls = Cell::new(0);

    let mut pending = loader.instantiate(|| {
        calls.set(calls.get() + 1);
        "mem:app".to_string()
    });

    // The resolver has already run, but the load task has not had a chance to.
    assert_eq!(calls.get(), 1);
    assert_eq!(pending.uri(), "mem:app");
    assert!(pending.try_resolve().is_none());

    let mut module = pending.await.unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(module.add(1, 1).unwrap(), 2);
}

#[tokio::test]
async fn missing_artifact_fails_instantiation() {
    let loader = loader(canvas(4, 4), &[]);
    let err = loader
        .instantiate(|| "mem:absent".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Fetch(FetchError::NotFound(_))));

    let fs_loader = Loader::new(BridgeConfig::default(), SurfaceHost::new()).unwrap();
    let err = fs_loader
        .instantiate(|| "/definitely/not/here/app.wasm".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Fetch(FetchError::NotFound(_))));
}

#[tokio::test]
async fn unsupported_location_fails_instantiation() {
    let loader = loader(canvas(4, 4), &[]);
    let err = loader
        .instantiate(|| "https://cdn.example/app.wasm".to_string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::Fetch(FetchError::UnsupportedScheme(_))
    ));
}

#[tokio::test]
async fn invalid_bytes_fail_to_compile() {
    let mut fetcher = glbridge::MemoryFetcher::new();
    fetcher.insert("junk", b"not a wasm module".to_vec());
    let loader = Loader::with_fetcher(BridgeConfig::default(), canvas(4, 4), fetcher).unwrap();

    let err = loader
        .instantiate(|| "mem:junk".to_string())
        .await
        .unwrap_err();
    match err {
        LoadError::Compile { uri, .. } => assert_eq!(uri, "mem:junk"),
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_export_fails_instantiation() {
    let loader = loader(canvas(4, 4), &[("partial", ADD_ONLY)]);
    let err = loader
        .instantiate(|| "mem:partial".to_string())
        .await
        .unwrap_err();
    match err {
        LoadError::Exports { source, .. } => assert_eq!(
            source,
            ExportError::MissingFunction {
                name: "render".into()
            }
        ),
        other => panic!("expected export error, got {other:?}"),
    }
}

#[tokio::test]
async fn mismatched_signature_fails_instantiation() {
    let loader = loader(canvas(4, 4), &[("wrong", WRONG_ADD)]);
    let err = loader
        .instantiate(|| "mem:wrong".to_string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoadError::Exports {
            source: ExportError::SignatureMismatch { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn unknown_import_fails_instantiation() {
    const NEEDS_TEXTURES: &str = r#"
    (module
        (import "gl" "bind_texture" (func (param i32 i32)))
        (memory (export "memory") 1)
        (func (export "alloc") (param i32) (result i32) (i32.const 1024))
        (func (export "dealloc") (param i32 i32))
        (func (export "add") (param i32 i32) (result i32) (i32.const 0))
        (func (export "render") (param i32 i32))
    )
    "#;
    let loader = loader(canvas(4, 4), &[("textures", NEEDS_TEXTURES)]);
    let err = loader
        .instantiate(|| "mem:textures".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, LoadError::Instantiate { .. }));
}

#[tokio::test]
async fn only_registered_bindings_are_callable() {
    let loader = loader(canvas(4, 4), &[("app", RED_CANVAS)]);
    let mut module = loader.instantiate(|| "mem:app".to_string()).await.unwrap();

    // `alloc` is exported, but it is not part of the binding table.
    match module.call("alloc", &[Arg::I32(16)]) {
        Err(CallError::UnknownBinding(name)) => assert_eq!(name, "alloc"),
        other => panic!("unexpected: {other:?}"),
    }

    assert!(matches!(
        module.call("add", &[Arg::I32(1)]),
        Err(CallError::ArgumentCount {
            expected: 2,
            actual: 1,
            ..
        })
    ));
    assert!(matches!(
        module.call("add", &[Arg::Str("1"), Arg::I32(2)]),
        Err(CallError::ArgumentType { index: 0, .. })
    ));
    assert_eq!(
        module
            .call("add", &[Arg::I32(20), Arg::I32(22)])
            .unwrap()
            .as_i32(),
        Some(42)
    );
}

#[tokio::test]
async fn fuel_exhaustion_traps_without_poisoning_the_module() {
    let config = BridgeConfig {
        fuel_per_call: Some(10_000),
        ..BridgeConfig::default()
    };
    let loader = loader_with(config, canvas(4, 4), &[("spin", SPINNING_ADD)]);
    let mut module = loader.instantiate(|| "mem:spin".to_string()).await.unwrap();

    match module.add(1, 2) {
        Err(CallError::Trap { name, .. }) => assert_eq!(name, "add"),
        other => panic!("expected trap, got {other:?}"),
    }

    // Each call is refuelled.
    module.render("canvas").unwrap();
    assert!(matches!(module.add(1, 2), Err(CallError::Trap { .. })));
}

#[tokio::test]
async fn instances_share_nothing() {
    let loader = loader(canvas(4, 4), &[("app", RED_CANVAS)]);
    let mut first = loader.instantiate(|| "mem:app".to_string()).await.unwrap();
    let second = loader.instantiate(|| "mem:app".to_string()).await.unwrap();

    first.render("canvas").unwrap();

    assert_eq!(first.graphics().context_count(), 1);
    assert_eq!(second.graphics().context_count(), 0);
    assert_eq!(first.digest(), second.digest());
}
