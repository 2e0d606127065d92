//! Building a store from a configuration file.

mod support;

use std::fs;
use std::path::PathBuf;

use support::ctx;
use support::models::{Observation, Plot, Variable};
use uri_store::{
    CacheKind, InMemoryRelationalStore, InMemoryTripleStore, StoreConfig, StoreError, UriStore,
};

const CONFIG: &str = r#"
base_uri = "http://phenome.example.org/"
default_timeout_ms = 5000

[cache]
default = "in_memory"

[[cache.class]]
model = "plot"
kind = "lru"
options = [{ key = "capacity", value = "2" }]

[[cache.class]]
model = "observation"
enabled = false

[[cache.class]]
model = "variable"
options = [{ key = "eviction", value = "fifo" }]
"#;

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("uri_store_{}_{}.toml", name, std::process::id()));
    fs::write(&path, contents).unwrap();
    path
}

fn store_from(config: StoreConfig) -> UriStore {
    UriStore::builder(config)
        .backend(InMemoryTripleStore::new())
        .backend(InMemoryRelationalStore::new())
        .register::<Plot>()
        .register::<Observation>()
        .register::<Variable>()
        .build()
        .unwrap()
}

#[test]
fn file_configures_base_uri_and_caches() {
    let path = write_config("full", CONFIG);
    let config = StoreConfig::load_from_file(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let store = store_from(config);
    assert_eq!(store.caches().kind("plot"), CacheKind::Lru);
    assert_eq!(store.caches().kind("observation"), CacheKind::None);
    // unknown option: the class runs uncached rather than failing
    assert_eq!(store.caches().kind("variable"), CacheKind::None);

    let ctx = ctx();
    let uri = store.persist(&ctx, &mut Plot::named("North")).unwrap();
    assert_eq!(uri.as_str(), "http://phenome.example.org/plot/north");
    assert!(store.default_context().deadline().is_some());
}

#[test]
fn lru_capacity_bounds_cached_instances() {
    let path = write_config("lru", CONFIG);
    let store = store_from(StoreConfig::load_from_file(&path).unwrap());
    fs::remove_file(&path).unwrap();
    let ctx = ctx();

    for name in ["a", "b", "c"] {
        let uri = store.persist(&ctx, &mut Plot::named(name)).unwrap();
        let _: Plot = store.get(&ctx, &uri).unwrap();
    }
    assert_eq!(store.caches().cache("plot").len(), 2);
}

#[test]
fn bad_file_is_a_config_error() {
    let path = write_config("bad", "base_uri = 42\n");
    let err = StoreConfig::load_from_file(&path).unwrap_err();
    fs::remove_file(&path).unwrap();

    let err: StoreError = err.into();
    assert!(matches!(err, StoreError::Config(_)));
    assert!(!err.is_retryable());
}
