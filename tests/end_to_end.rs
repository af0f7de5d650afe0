//! End-to-end workspace tests: write through the public surface, restart,
//! replay, and verify the rebuilt store.

use std::sync::Arc;
use std::time::Duration;

use quarry::{
    BlockSpec, DecisionLog, LogConfig, MemoryIndex, MutationKind, Record, RecoveryManager,
    Sequencer, StoreConfig, StoreCore,
};
use tempfile::TempDir;

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        blocks: vec![BlockSpec::new("data", 64), BlockSpec::new("system", 8)],
        default_block: "data".to_string(),
        log: LogConfig {
            db_path: dir.path().join("quarry.db"),
            batch_size: 8,
            write_frequency: Duration::from_millis(50),
            writer_threads: 2,
            read_batch: 16,
        },
    }
}

struct Store {
    core: Arc<StoreCore>,
    sequencer: Arc<Sequencer>,
    log: Arc<DecisionLog>,
    recovery: RecoveryManager,
}

fn open(cfg: &StoreConfig) -> Store {
    let log = Arc::new(DecisionLog::new(cfg.log.clone()));
    log.open().unwrap();
    let sequencer = Arc::new(Sequencer::new(Arc::clone(&log)).unwrap());
    let core = Arc::new(StoreCore::new(cfg, Arc::new(MemoryIndex::new())));
    let recovery = RecoveryManager::new(Arc::clone(&core), Arc::clone(&sequencer));
    Store {
        core,
        sequencer,
        log,
        recovery,
    }
}

impl Store {
    fn put(&self, record: Record) {
        let d = self.sequencer.decide(MutationKind::Create, record).unwrap();
        self.core.apply(&d).unwrap();
    }
}

#[test]
fn write_restart_read() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    let ids: Vec<String> = (0..20).map(|_| uuid::Uuid::new_v4().to_string()).collect();
    {
        let store = open(&cfg);
        for id in &ids {
            store.put(Record::new(id.clone(), serde_json::json!({ "key": id })));
        }
        store.log.flush().unwrap();
        store.log.close().unwrap();
    }

    let store = open(&cfg);
    let report = store.recovery.initialize().unwrap();
    assert_eq!(report.applied, ids.len());
    for id in &ids {
        let rec = store.core.read(id).unwrap();
        assert_eq!(rec.payload["key"], serde_json::json!(id));
    }
    let stats = store.core.stats();
    assert_eq!(stats.occupied + stats.available, stats.capacity);
}

#[test]
fn full_lifecycle_with_relationships_and_clear() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let store = open(&cfg);

    // Deferred relationship: parent names child before child exists.
    store.put(Record::with_related(
        "parent",
        serde_json::json!({ "role": "root" }),
        vec!["child".to_string()],
    ));
    store.put(Record::new("child", serde_json::json!({ "role": "leaf" })));

    let view = store.core.expand_record("parent", 1).unwrap();
    assert_eq!(view.len(), 2);
    let child_slot = store.core.index().slot_for_id("child").unwrap();
    assert_eq!(view.root_node().links, vec![child_slot]);

    // Update parent's payload; edge survives.
    let d = store
        .sequencer
        .decide(
            MutationKind::Update,
            Record::with_related(
                "parent",
                serde_json::json!({ "role": "root", "v": 2 }),
                vec!["child".to_string()],
            ),
        )
        .unwrap();
    store.core.apply(&d).unwrap();
    let parent_slot = store.core.index().slot_for_id("parent").unwrap();
    assert!(store.core.graph().is_linked(parent_slot, child_slot));

    // Clear: table empty, log empty, sequencing restarts at 1.
    store.recovery.clear().unwrap();
    assert_eq!(store.core.stats().occupied, 0);
    assert_eq!(store.log.last_sequence().unwrap(), 0);
    let fresh = store
        .sequencer
        .decide(MutationKind::Create, Record::new("new", serde_json::Value::Null))
        .unwrap();
    assert_eq!(fresh.sequence, 1);
}
