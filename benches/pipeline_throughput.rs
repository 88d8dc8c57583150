//! Pipeline Throughput Benchmarks
//!
//! Measures end-to-end operation latency through the workflow pipeline
//! against an in-memory backend: writes with a transaction per operation,
//! searches that stream straight into the operation, and simple binds that
//! verify salted password hashes.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ldap_workflow::auth::password::{self, PasswordScheme};
use ldap_workflow::backend::{Backend, InMemoryBackend};
use ldap_workflow::dn::Dn;
use ldap_workflow::entry::{Attribute, Entry};
use ldap_workflow::operation::{Modification, SearchScope};
use ldap_workflow::{DirectoryServer, Operation};
use std::sync::Arc;
use tokio::runtime::Runtime;

const BASE: &str = "o=bench";
const PEOPLE: &str = "ou=people,o=bench";

fn dn(raw: &str) -> Dn {
    Dn::parse(raw).expect("benchmark DN should parse")
}

fn person(id: usize) -> Entry {
    let uid = format!("user{}", id);
    Entry::new(dn(&format!("uid={},{}", uid, PEOPLE)))
        .with_object_classes(["top", "person", "organizationalPerson", "inetOrgPerson"])
        .with_attribute("uid", [uid.clone()])
        .with_attribute("cn", [format!("User {}", id)])
        .with_attribute("sn", ["Bench"])
        .with_attribute(
            "userPassword",
            [password::encode("password", PasswordScheme::SaltedSha256)],
        )
}

/// Build a server whose backend holds `population` people.
fn populated_server(rt: &Runtime, population: usize) -> DirectoryServer {
    rt.block_on(async {
        let backend = InMemoryBackend::new("userRoot", vec![dn(BASE)]);
        let mut entries = vec![
            Entry::new(dn(BASE))
                .with_object_classes(["top", "organization"])
                .with_attribute("o", ["bench"]),
            Entry::new(dn(PEOPLE))
                .with_object_classes(["top", "organizationalUnit"])
                .with_attribute("ou", ["people"]),
        ];
        entries.extend((0..population).map(person));
        backend
            .import(entries)
            .await
            .expect("benchmark import should succeed");

        DirectoryServer::builder()
            .with_backend("userRoot", Arc::new(backend) as Arc<dyn Backend>)
            .build()
            .expect("benchmark server should build")
    })
}

fn bench_writes(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("write_pipeline");
    group.throughput(Throughput::Elements(1));

    let server = populated_server(&rt, 100);
    let mut next = 100;
    group.bench_function("add", |b| {
        b.iter(|| {
            next += 1;
            let uid = format!("user{}", next);
            let op = Operation::add(
                format!("uid={},{}", uid, PEOPLE),
                vec![
                    Attribute::new("objectClass", vec!["inetOrgPerson".into()]),
                    Attribute::single("uid", uid.clone()),
                    Attribute::single("cn", uid.clone()),
                    Attribute::single("sn", "Bench"),
                ],
            );
            black_box(rt.block_on(server.execute(op)))
        })
    });

    group.bench_function("modify", |b| {
        b.iter(|| {
            let op = Operation::modify(
                format!("uid=user1,{}", PEOPLE),
                vec![Modification::replace("description", &["benchmark"])],
            );
            black_box(rt.block_on(server.execute(op)))
        })
    });

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("search_pipeline");

    for population in [10, 100, 1000].iter() {
        let server = populated_server(&rt, *population);
        group.throughput(Throughput::Elements(*population as u64));
        group.bench_with_input(
            BenchmarkId::new("subtree", population),
            population,
            |b, _| {
                b.iter(|| {
                    let op = Operation::search(BASE, SearchScope::Subtree, "(objectClass=person)");
                    black_box(rt.block_on(server.execute(op)))
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("equality", population),
            population,
            |b, _| {
                b.iter(|| {
                    let op = Operation::search(BASE, SearchScope::Subtree, "(uid=user5)");
                    black_box(rt.block_on(server.execute(op)))
                })
            },
        );
    }

    group.finish();
}

fn bench_bind(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let server = populated_server(&rt, 10);

    c.bench_function("simple_bind", |b| {
        b.iter(|| {
            let op = Operation::simple_bind(format!("uid=user1,{}", PEOPLE), "password");
            black_box(rt.block_on(server.execute(op)))
        })
    });
}

criterion_group!(benches, bench_writes, bench_search, bench_bind);
criterion_main!(benches);
