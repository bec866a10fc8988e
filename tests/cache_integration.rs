//! Integration tests for the process-wide context cache
//!
//! These tests touch the global cache and must not run in parallel.

mod common;

use chromaflow::pipeline::cache::{self, BackendContext};
use chromaflow::pipeline::nodes::{GAMMA, MATRIX};
use chromaflow::pipeline::{
    fingerprint_text, ContextCache, ModuleRegistry, NodeId, Options, Pipeline, SharedContext,
};
use chromaflow::EngineConfig;
use common::mock_helpers::{mocked_module, MockProducer};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn global_pipeline(registry: &Arc<ModuleRegistry>) -> Pipeline {
    Pipeline::new(Arc::clone(registry), EngineConfig::default())
}

fn matrix_node(pipeline: &mut Pipeline, gain: f64) -> NodeId {
    pipeline
        .new_node(MATRIX, Options::new().with("gain", gain))
        .unwrap()
}

#[test]
#[serial]
fn test_pipelines_share_global_contexts() {
    common::init_tracing();
    cache::global().clear();
    let registry = Arc::new(ModuleRegistry::with_builtins());

    let mut first = global_pipeline(&registry);
    let mut second = global_pipeline(&registry);
    assert!(Arc::ptr_eq(first.cache(), second.cache()));

    let a = matrix_node(&mut first, 0.5);
    let b = matrix_node(&mut second, 0.5);
    let ctx_a = first.set_context(a, false).unwrap().unwrap();
    let ctx_b = second.set_context(b, false).unwrap().unwrap();

    assert!(Arc::ptr_eq(&ctx_a, &ctx_b));
    assert_eq!(cache::global().len(), 1);
}

#[test]
#[serial]
fn test_different_options_get_different_entries() {
    cache::global().clear();
    let registry = Arc::new(ModuleRegistry::with_builtins());
    let mut pipeline = global_pipeline(&registry);

    let dim = matrix_node(&mut pipeline, 0.5);
    let bright = matrix_node(&mut pipeline, 2.0);
    let ctx_dim = pipeline.set_context(dim, false).unwrap().unwrap();
    let ctx_bright = pipeline.set_context(bright, false).unwrap().unwrap();

    assert!(!Arc::ptr_eq(&ctx_dim, &ctx_bright));
    assert_ne!(
        pipeline.context_key(dim).unwrap(),
        pipeline.context_key(bright).unwrap()
    );
    assert_eq!(cache::global().len(), 2);
}

#[test]
#[serial]
fn test_mock_producer_runs_once_across_pipelines() {
    cache::global().clear();
    let mut producer = MockProducer::new();
    producer
        .expect_produce()
        .times(1)
        .returning(|_| Ok(Some(vec![7, 7])));

    let mut registry = ModuleRegistry::new();
    registry.register(mocked_module("test/shared", producer));
    let registry = Arc::new(registry);

    let contexts: Vec<SharedContext> = (0..3)
        .map(|_| {
            let mut pipeline = global_pipeline(&registry);
            let id = pipeline.new_node("test/shared", Options::new()).unwrap();
            pipeline.set_context(id, false).unwrap().unwrap()
        })
        .collect();

    assert!(contexts.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(contexts[0].bytes, vec![7, 7]);
}

#[test]
#[serial]
fn test_force_replaces_entry_for_later_pipelines() {
    cache::global().clear();
    let registry = Arc::new(ModuleRegistry::with_builtins());

    let mut first = global_pipeline(&registry);
    let a = matrix_node(&mut first, 0.5);
    let old = first.set_context(a, false).unwrap().unwrap();
    let fresh = first.set_context(a, true).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&old, &fresh));
    assert_eq!(*old, *fresh);

    let mut second = global_pipeline(&registry);
    let b = matrix_node(&mut second, 0.5);
    let found = second.set_context(b, false).unwrap().unwrap();
    assert!(Arc::ptr_eq(&found, &fresh));

    // The replaced payload stays alive for whoever still holds it
    assert_eq!(Arc::strong_count(&old), 1);
}

#[test]
#[serial]
fn test_disabled_cache_leaves_table_untouched() {
    cache::global().clear();
    let registry = Arc::new(ModuleRegistry::with_builtins());
    let config = EngineConfig {
        cache_enabled: false,
        ..EngineConfig::default()
    };
    let mut pipeline = Pipeline::new(registry, config);

    let id = pipeline
        .new_node(GAMMA, Options::new().with("gamma", 2.0))
        .unwrap();
    let ctx = pipeline.set_context(id, false).unwrap().unwrap();

    assert_eq!(ctx.kind, "lut");
    assert!(cache::global().is_empty());
}

#[test]
fn test_concurrent_lookups_produce_once() {
    let cache = Arc::new(ContextCache::new());
    let produced = Arc::new(AtomicUsize::new(0));
    let key = cache::cache_key("matrix", fingerprint_text("shared"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let produced = Arc::clone(&produced);
            let key = key.clone();
            thread::spawn(move || {
                cache
                    .get_or_try_insert_with(&key, || {
                        produced.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new(BackendContext::new("matrix", vec![1, 2, 3])))
                    })
                    .unwrap()
                    .0
            })
        })
        .collect();

    let results: Vec<SharedContext> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(produced.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(cache.stats().inserts, 1);
    assert_eq!(cache.stats().hits, 7);
}
