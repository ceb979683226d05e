use criterion::{criterion_group, criterion_main, Criterion};
use routegate::{
    RouteKind, RouteTable, RouteTableBuilder, StageKey, TableConfig,
    TableStage, TwoLevelRouteTableBuilder,
};

fn new_table() -> RouteTable<String> {
    let mut builder = RouteTableBuilder::default();
    for i in 0..100 {
        builder.add(
            &format!("host-{i}.example.com"),
            format!("exact-{i}"),
            RouteKind::Exact,
            0,
        );
        builder.add(
            &format!("svc-{i}."),
            format!("prefix-{i}"),
            RouteKind::Prefix,
            0,
        );
    }
    builder.build()
}

fn bench_find_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("find all");

    group.bench_function("exact", |b| {
        let table = new_table();
        b.iter(|| {
            let found = table.find_all("host-50.example.com");
            if found.is_empty() {
                panic!("match failed");
            }
        });
    });

    group.bench_function("prefix cached", |b| {
        let table = new_table();
        b.iter(|| {
            let found = table.find_all("svc-50.local");
            if found.is_empty() {
                panic!("match failed");
            }
        });
    });

    group.bench_function("prefix uncached", |b| {
        let table = new_table();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let found = table.find_all(&format!("svc-50.local-{i}"));
            if found.is_empty() {
                panic!("match failed");
            }
        });
    });

    group.finish();
}

#[derive(Debug, Clone)]
struct BenchRoute {
    path: &'static str,
}

impl StageKey for BenchRoute {
    fn stage_key(&self) -> &str {
        self.path
    }
}

fn bench_two_level(c: &mut Criterion) {
    c.bench_function("host and path", |b| {
        let mut builder: TwoLevelRouteTableBuilder<TableStage<BenchRoute>> =
            TwoLevelRouteTableBuilder::new(TableConfig::default(), 128)
                .unwrap();
        builder.add(
            "example.com",
            RouteKind::Exact,
            0,
            BenchRoute { path: "/api" },
        );
        builder.add(
            "example.com",
            RouteKind::Exact,
            0,
            BenchRoute { path: "/" },
        );
        let table = builder.build();
        b.iter(|| {
            let found = table.match_route(
                "example.com",
                "/api/users",
                &(),
                |_, _| true,
            );
            if found.is_none() {
                panic!("match failed");
            }
        });
    });
}

criterion_group!(benches, bench_find_all, bench_two_level);
criterion_main!(benches);
