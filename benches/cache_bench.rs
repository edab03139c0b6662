//! Benchmarks for the caching core's hot paths.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ldcache::config::{CacheManagerConfig, StrategyConfig};
use ldcache::entry::DataType;
use ldcache::eviction;
use ldcache::keys::{self, KeyObfuscator};
use ldcache::manager::{CacheManager, SetOptions};
use ldcache::routing::RoutingCache;
use ldcache::strategy::StorageStrategy;
use std::time::Duration;

fn bench_key_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_validation");
    group.bench_function("short_key", |b| {
        b.iter(|| black_box(keys::validate_key("user:123:profile")));
    });
    let long_key = "a".repeat(200);
    group.bench_function("near_max_length_key", |b| {
        b.iter(|| black_box(keys::validate_key(&long_key)));
    });
    group.finish();
}

fn bench_key_obfuscation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_obfuscation");
    let obfuscator = KeyObfuscator::new("ck_");
    group.bench_function("obfuscate", |b| {
        b.iter(|| black_box(obfuscator.obfuscate("user:42:profile")));
    });
    let obfuscated = obfuscator.obfuscate("user:42:profile");
    group.bench_function("deobfuscate", |b| {
        b.iter(|| black_box(obfuscator.deobfuscate(&obfuscated)));
    });
    group.finish();
}

fn bench_routing_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing_cache");
    for capacity in [100, 1_000, 10_000] {
        let cache = RoutingCache::new(capacity);
        for i in 0..capacity {
            cache.put(&format!("key-{i}"), "memory");
        }
        group.bench_with_input(BenchmarkId::new("get_hit", capacity), &capacity, |b, _| {
            b.iter(|| black_box(cache.get("key-0")));
        });
        group.bench_with_input(BenchmarkId::new("put", capacity), &capacity, |b, _| {
            b.iter(|| cache.put("key-hot", "memory"));
        });
    }
    group.finish();
}

fn bench_eviction_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("eviction_policy_victim_selection");
    for name in ["lru", "lfu", "fifo", "mru", "random", "ttl", "arc"] {
        let policy = eviction::by_name(name);
        for i in 0..1_000 {
            policy.record_add(&format!("key-{i}"), Some(Duration::from_secs(60)));
        }
        group.bench_with_input(BenchmarkId::new("get_eviction_key", name), name, |b, _| {
            b.iter(|| black_box(policy.get_eviction_key()));
        });
    }
    group.finish();
}

fn bench_strategy_decisions(c: &mut Criterion) {
    let mut group = c.benchmark_group("storage_strategy");
    let strategy = StorageStrategy::new(StrategyConfig::default(), true, "memory");
    group.bench_function("decision_cache_hit", |b| {
        strategy.recommend(512, Some(Duration::from_secs(10)), DataType::String);
        b.iter(|| black_box(strategy.recommend(512, Some(Duration::from_secs(10)), DataType::String)));
    });
    group.bench_function("decision_cache_miss_varied_buckets", |b| {
        let mut size = 1usize;
        b.iter(|| {
            size = size.wrapping_add(997);
            black_box(strategy.recommend(size, Some(Duration::from_secs(10)), DataType::String))
        });
    });
    group.finish();
}

fn bench_manager_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_manager");
    group.throughput(Throughput::Elements(1));
    let rt = tokio::runtime::Runtime::new().unwrap();
    let manager = rt.block_on(CacheManager::new(CacheManagerConfig::default()));

    group.bench_function("set", |b| {
        b.iter(|| {
            rt.block_on(async {
                manager
                    .set("bench-key", serde_json::json!("bench-value"), SetOptions::default())
                    .await
                    .unwrap();
            });
        });
    });

    rt.block_on(async {
        manager
            .set("bench-hit", serde_json::json!("bench-value"), SetOptions::default())
            .await
            .unwrap();
    });
    group.bench_function("get_hit", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(manager.get("bench-hit").await.unwrap()) });
        });
    });

    group.bench_function("get_miss", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(manager.get("bench-missing").await.unwrap()) });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_key_validation,
    bench_key_obfuscation,
    bench_routing_cache,
    bench_eviction_policies,
    bench_strategy_decisions,
    bench_manager_set_get,
);
criterion_main!(benches);
