//! Migration pipeline behaviour on real store files.

use std::fs;
use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{EnvFlags, EnvOpenOptions};

use strata_schema::parent_child::{self, CHILD, PARENT};
use strata_schema::{
    AttributeDescription, AttributeType, ModelDelta, SchemaRegistry, SchemaVersion, Value,
    VersionedRegistry,
};
use strata_store::{Record, RecordReader};
use strata_store_lmdb::environment::{entity_db_name, lock_path, temp_path};
use strata_store_lmdb::{EnvOptions, LmdbEnvironment, MigrationError, MigrationPipeline};

fn v(n: u32) -> SchemaVersion {
    SchemaVersion::new(n)
}

/// A v0 store with two parents, one of them owning two children.
fn seed_v0(path: &Path) {
    let model = parent_child::registry().model_for(v(0)).unwrap();
    let env = LmdbEnvironment::create(path, &EnvOptions::default(), &model).unwrap();
    let mut batch = env.write_batch().unwrap();
    let ada = batch
        .insert(
            PARENT,
            [("title1", Value::from("Ada")), ("orderIndex", Value::Integer(0))],
        )
        .unwrap();
    batch
        .insert(PARENT, [("orderIndex", Value::Integer(1))])
        .unwrap();
    for (text, rating) in [("first", 5), ("second", 2)] {
        let child = batch
            .insert(
                CHILD,
                [("text", Value::from(text)), ("rating", Value::Integer(rating))],
            )
            .unwrap();
        batch.relate(PARENT, ada, "childs", child).unwrap();
    }
    batch.commit().unwrap();
    env.close().unwrap();
}

type Contents = (Option<SchemaVersion>, Vec<Record>, Vec<Record>);

fn contents(path: &Path, version: SchemaVersion) -> Contents {
    let model = parent_child::registry().model_for(version).unwrap();
    let env = LmdbEnvironment::open_existing(path, &EnvOptions::default(), &model).unwrap();
    let result = {
        let snapshot = env.snapshot().unwrap();
        (
            snapshot.schema_version().unwrap(),
            snapshot.fetch(PARENT).unwrap(),
            snapshot.fetch(CHILD).unwrap(),
        )
    };
    env.close().unwrap();
    result
}

/// A store seeded at v0 and brought up to `version`.
fn seeded_at(version: u32) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.mdb");
    seed_v0(&path);
    let registry = parent_child::registry();
    MigrationPipeline::new(&registry, EnvOptions::default())
        .migrate(&path, v(0), v(version))
        .unwrap();
    (dir, path)
}

#[test]
fn any_range_equals_single_steps() {
    let registry = parent_child::registry();
    let pipeline = MigrationPipeline::new(&registry, EnvOptions::default());
    let latest = registry.current_version().get();

    for a in 0..latest {
        for b in a + 1..=latest {
            let (_whole_dir, whole) = seeded_at(a);
            let report = pipeline.migrate(&whole, v(a), v(b)).unwrap();
            assert_eq!(report.steps.len(), (b - a) as usize, "{a} -> {b}");

            let (_stepped_dir, stepped) = seeded_at(a);
            for n in a..b {
                let report = pipeline.migrate(&stepped, v(n), v(n + 1)).unwrap();
                assert_eq!(report.steps.len(), 1);
                assert_eq!(report.steps[0].records, 4);
            }

            let whole = contents(&whole, v(b));
            assert_eq!(whole.0, Some(v(b)), "{a} -> {b}");
            assert_eq!(whole, contents(&stepped, v(b)), "{a} -> {b}");
        }
    }
}

#[test]
fn held_store_is_not_migrated_and_does_not_block() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.mdb");
    seed_v0(&path);
    let model = parent_child::registry().model_for(v(0)).unwrap();
    let held = LmdbEnvironment::open_existing(&path, &EnvOptions::default(), &model).unwrap();

    let registry = parent_child::registry();
    let pipeline = MigrationPipeline::new(&registry, EnvOptions::default());
    let err = pipeline.migrate(&path, v(0), v(1)).unwrap_err();
    assert!(err.is_in_use());
    assert!(!temp_path(&path).exists());
    assert_eq!(held.snapshot().unwrap().fetch(PARENT).unwrap().len(), 2);

    drop(held);
    pipeline.migrate(&path, v(0), v(1)).unwrap();
    assert_eq!(contents(&path, v(1)).0, Some(v(1)));
}

#[test]
fn rename_carries_values_and_relationships() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.mdb");
    seed_v0(&path);

    let registry = parent_child::registry();
    MigrationPipeline::new(&registry, EnvOptions::default())
        .migrate(&path, v(0), v(2))
        .unwrap();

    let (version, parents, children) = contents(&path, v(2));
    assert_eq!(version, Some(v(2)));
    assert_eq!(parents[0].text("title2"), Some("Ada"));
    assert_eq!(parents[0].value("email"), &Value::Null);
    assert_eq!(parents[1].value("title2"), &Value::Null);
    assert_eq!(parents[0].related("childs").len(), 2);
    assert!(children.iter().all(|c| c.related("parent") == [parents[0].id]));

    assert!(!temp_path(&path).exists());
    assert!(!lock_path(&temp_path(&path)).exists());
}

#[test]
fn partial_migration_stops_at_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.mdb");
    seed_v0(&path);

    let registry = parent_child::registry();
    let pipeline = MigrationPipeline::new(&registry, EnvOptions::default());
    pipeline.migrate(&path, v(0), v(1)).unwrap();
    assert_eq!(
        LmdbEnvironment::probe_version(&path, &EnvOptions::default()).unwrap(),
        Some(v(1))
    );
}

#[test]
fn version_mismatch_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.mdb");
    seed_v0(&path);
    let before = contents(&path, v(0));

    let registry = parent_child::registry();
    let err = MigrationPipeline::new(&registry, EnvOptions::default())
        .migrate(&path, v(1), v(3))
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::VersionMismatch { expected, found: Some(found) }
            if expected == v(1) && found == v(0)
    ));

    assert_eq!(contents(&path, v(0)), before);
    assert!(!temp_path(&path).exists());
}

#[test]
fn stale_temp_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.mdb");
    seed_v0(&path);
    fs::write(temp_path(&path), b"left over from a crash").unwrap();

    let registry = parent_child::registry();
    MigrationPipeline::new(&registry, EnvOptions::default())
        .migrate(&path, v(0), v(1))
        .unwrap();
    assert!(!temp_path(&path).exists());
    assert_eq!(contents(&path, v(1)).1.len(), 2);
}

#[test]
fn undecodable_record_aborts_step_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.mdb");
    seed_v0(&path);
    corrupt_record(&path, PARENT);

    let registry = parent_child::registry();
    let err = MigrationPipeline::new(&registry, EnvOptions::default())
        .migrate(&path, v(0), v(3))
        .unwrap_err();
    assert!(matches!(err, MigrationError::Storage(_)));

    assert!(!temp_path(&path).exists());
    assert!(!lock_path(&temp_path(&path)).exists());
    assert_eq!(
        LmdbEnvironment::probe_version(&path, &EnvOptions::default()).unwrap(),
        Some(v(0))
    );
}

#[test]
fn unmappable_step_fails_before_touching_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Model.mdb");
    seed_v0(&path);

    // v1 adds a required attribute with no default.
    let registry = VersionedRegistry::new(
        parent_child::STORE_NAME,
        parent_child::registry().model_for(v(0)).unwrap().entities,
    )
    .with_delta(ModelDelta::AddAttribute {
        entity: PARENT.to_string(),
        attribute: AttributeDescription::new("code", AttributeType::String),
    });

    let err = MigrationPipeline::new(&registry, EnvOptions::default())
        .migrate(&path, v(0), v(1))
        .unwrap_err();
    assert!(err.configuration().is_some());
    assert!(!temp_path(&path).exists());
    assert_eq!(
        LmdbEnvironment::probe_version(&path, &EnvOptions::default()).unwrap(),
        Some(v(0))
    );
}

/// Append a record whose bytes do not decode.
fn corrupt_record(path: &Path, entity: &str) {
    let options = EnvOptions::default();
    let mut builder = EnvOpenOptions::new();
    builder.map_size(options.map_size).max_dbs(options.max_dbs);
    let env = unsafe {
        builder.flags(EnvFlags::NO_SUB_DIR);
        builder.open(path).unwrap()
    };
    let mut wtxn = env.write_txn().unwrap();
    let db = env
        .open_database::<Bytes, Bytes>(&wtxn, Some(&entity_db_name(entity)))
        .unwrap()
        .unwrap();
    db.put(&mut wtxn, u64::MAX.to_be_bytes().as_slice(), &[0xffu8, 0xff, 0xff][..])
        .unwrap();
    wtxn.commit().unwrap();
    env.prepare_for_closing().wait();
}
