use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tiercache::cache::entry::{DefaultSizer, EntryPriority};
use tiercache::cache::eviction::LruPolicy;
use tiercache::cache::storage::{InMemoryCache, MemoryCacheConfig};

fn l1_put_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("l1_in_memory");
    for size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("put", size), &size, |b, &size| {
            b.iter(|| {
                let cache: InMemoryCache<String, String> = InMemoryCache::new(
                    "bench",
                    MemoryCacheConfig::default(),
                    Arc::new(LruPolicy::default()),
                    Arc::new(DefaultSizer),
                );
                for i in 0..size {
                    cache.put_sync(format!("key-{i}"), format!("value-{i}"), EntryPriority::Normal, None);
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("get_hit", size), &size, |b, &size| {
            let cache: InMemoryCache<String, String> = InMemoryCache::new(
                "bench",
                MemoryCacheConfig::default(),
                Arc::new(LruPolicy::default()),
                Arc::new(DefaultSizer),
            );
            for i in 0..size {
                cache.put_sync(format!("key-{i}"), format!("value-{i}"), EntryPriority::Normal, None);
            }
            b.iter(|| {
                for i in 0..size {
                    let _ = cache.try_get(&format!("key-{i}"));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, l1_put_get);
criterion_main!(benches);
