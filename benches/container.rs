#![allow(dead_code)]

use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;
use wirebox::{Callback, Container, Dependencies, InstantiateErrorKind, Registry, Scope::*};

struct A(Arc<B>, Arc<C>);
struct B(i32);
struct C(Arc<CA>);
struct CA(Arc<CAA>);
struct CAA(Arc<CAAA>);
struct CAAA;

#[inline]
fn registry(scope: wirebox::Scope) -> Registry {
    Registry::new()
        .provide("caaa", &[], |_| Ok::<_, InstantiateErrorKind>(CAAA), scope)
        .provide("caa", &["caaa"], |deps: Dependencies| Ok::<_, InstantiateErrorKind>(CAA(deps.require(0)?)), scope)
        .provide_async(
            "ca",
            &["caa"],
            |deps: Dependencies| async move { Ok::<_, InstantiateErrorKind>(CA(deps.require(0)?)) },
            scope,
        )
        .provide_callback(
            "c",
            &["ca"],
            |deps: Dependencies, callback: Callback<C>| match deps.require(0) {
                Ok(ca) => callback.ok(C(ca)),
                Err(err) => callback.err(err),
            },
            scope,
        )
        .provide("b", &[], |_| Ok::<_, InstantiateErrorKind>(B(2)), scope)
        .provide(
            "a",
            &["b", "c"],
            |deps: Dependencies| Ok::<_, InstantiateErrorKind>(A(deps.require(0)?, deps.require(1)?)),
            scope,
        )
}

#[inline]
async fn container_get(container: &Container) {
    let _ = container.get_as::<A>("a").await.unwrap().unwrap();
}

fn criterion_benchmark(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let prototypes = Container::new(registry(Prototype));
    let singletons = Container::new(registry(Singleton));
    runtime.block_on(container_get(&singletons));

    c.bench_function("container_new", |b| b.iter(|| Container::new(registry(Singleton))))
        .bench_function("container_get", |b| {
            b.to_async(&runtime).iter(|| container_get(&prototypes))
        })
        .bench_function("container_get_with_cache", |b| {
            b.to_async(&runtime).iter(|| container_get(&singletons))
        })
        .bench_function("container_bootstrap", |b| {
            b.to_async(&runtime)
                .iter(|| async { Container::new(registry(Singleton)).bootstrap(true).await.unwrap() })
        })
        .bench_function("container_get_many", |b| {
            b.to_async(&runtime)
                .iter(|| async { prototypes.get_many(["a", "b", "b", "c"]).await.unwrap() })
        });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
