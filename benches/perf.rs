use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fieldstore::FieldStore;
use fieldstore::config::FieldStoreConfig;
use fieldstore::permission::{Principal, Role};
use fieldstore::repository::{FieldValues, PageRequest};
use tempfile::tempdir;

const OWNERS: usize = 200;
const RECORDS_PER_OWNER: usize = 25;

fn setup_store() -> (tempfile::TempDir, FieldStore) {
    let dir = tempdir().expect("temp");
    let store = FieldStore::open(FieldStoreConfig::in_memory(), dir.path()).expect("open");
    for owner in 0..OWNERS {
        let principal = Principal::new(format!("user-{owner}@bench"), Role::A, "Bench");
        for n in 0..RECORDS_PER_OWNER {
            let values = FieldValues::from([
                ("name".to_string(), format!("member-{owner}-{n}")),
                ("sno".to_string(), n.to_string()),
                ("remarks".to_string(), format!("batch {}", n % 7)),
            ]);
            store.records().create(&principal, &values).expect("seed");
        }
    }
    (dir, store)
}

fn bench_scoped_listing(c: &mut Criterion) {
    let (_dir, store) = setup_store();
    let owner = Principal::new("user-7@bench", Role::A, "Bench");
    let admin = Principal::new("hq@bench", Role::X, "HQ");

    c.bench_function("owner_list_all", |b| {
        b.iter(|| {
            let rows = store.records().list(black_box(&owner), "").expect("list");
            black_box(rows.len());
        })
    });

    c.bench_function("owner_search_term", |b| {
        b.iter(|| {
            let rows = store
                .records()
                .list(black_box(&owner), black_box("batch 3"))
                .expect("search");
            black_box(rows.len());
        })
    });

    c.bench_function("elevated_search_term", |b| {
        b.iter(|| {
            let rows = store
                .records()
                .list(black_box(&admin), black_box("member-19"))
                .expect("search");
            black_box(rows.len());
        })
    });

    c.bench_function("elevated_first_page", |b| {
        b.iter(|| {
            let page = store
                .records()
                .list_page(black_box(&admin), "", PageRequest::new(50))
                .expect("page");
            black_box(page.items.len());
        })
    });
}

criterion_group!(benches, bench_scoped_listing);
criterion_main!(benches);
