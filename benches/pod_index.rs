use criterion::{black_box, criterion_group, criterion_main, Criterion};
use podtag::index::PodIndex;
use podtag::k8s::{IdentityScheme, PodRecord};

fn populated(pods: usize) -> PodIndex {
    let index = PodIndex::new();
    for i in 0..pods {
        let record = PodRecord::new(format!("ns-{}", i % 20), format!("pod-{}", i))
            .with_label("app", format!("app-{}", i % 50))
            .with_label("tier", "backend");
        index.set(IdentityScheme::Namespaced.identity_of(&record), record);
    }
    index
}

fn bench_get(c: &mut Criterion) {
    let index = populated(10_000);
    let hit = IdentityScheme::Namespaced.parse("ns-7/pod-4207").unwrap();
    let miss = IdentityScheme::Namespaced.parse("ns-7/absent").unwrap();

    c.bench_function("pod_index_get_hit", |b| b.iter(|| index.get(black_box(&hit))));
    c.bench_function("pod_index_get_miss", |b| {
        b.iter(|| index.get(black_box(&miss)))
    });
}

fn bench_set(c: &mut Criterion) {
    let index = populated(10_000);
    let record = PodRecord::new("ns-3", "pod-3").with_label("app", "replaced");
    let identity = IdentityScheme::Namespaced.identity_of(&record);

    c.bench_function("pod_index_set_replace", |b| {
        b.iter(|| index.set(identity.clone(), black_box(record.clone())))
    });
}

criterion_group!(benches, bench_get, bench_set);
criterion_main!(benches);
