//! End-to-end flows over the in-memory backend, wrapped in the retry
//! decorator the way an application wires the stores at startup.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use trove_core::memory::MemoryStore;
use trove_core::retry::{RetryConfig, RetryingStore};
use trove_track::{
    CleanUpdater, CompleteUpdater, ErrorAggregator, HarvestedRecord, HarvestedRecordStore,
    IndexTarget, Notification, NotificationLog, ProcessedRecord, ProcessedRecordStore,
    RecordCounters, RecordState, TaskByState, TaskInfo, TaskInfoStore, TaskState, TaskStateIndex,
};

type Store = RetryingStore<MemoryStore>;

fn store() -> Arc<Store> {
    Arc::new(RetryingStore::new(
        Arc::new(MemoryStore::new()),
        RetryConfig {
            max_attempts: 2,
            delay_ms: 1,
        },
    ))
}

#[tokio::test]
async fn complete_if_empty_end_to_end() {
    let store = store();
    let records = HarvestedRecordStore::new(store.clone());

    // A dataset with three records: one already indexed to preview, one
    // harvested but never indexed, one unknown to the store.
    let mut indexed = HarvestedRecord::from_latest_harvest("ds-1", "rec-indexed", Utc::now(), None);
    let original_md5 = Uuid::new_v4();
    indexed.preview_harvest_date = Some(Utc::now());
    indexed.preview_harvest_md5 = Some(original_md5);
    records.insert(&indexed).await.expect("insert indexed");

    let empty = HarvestedRecord::from_latest_harvest("ds-1", "rec-empty", Utc::now(), None);
    records.insert(&empty).await.expect("insert empty");

    let pass_md5 = Uuid::new_v4();
    let mut updater = CompleteUpdater::new(
        store,
        "ds-1",
        IndexTarget::Preview,
        Utc::now(),
        pass_md5,
    );
    for id in ["rec-indexed", "rec-empty", "rec-unknown"] {
        updater.execute_record(id).await.expect("execute");
    }
    updater.close().await.expect("close");

    // Already-indexed record keeps its original stamp.
    let found = records
        .find("ds-1", "rec-indexed")
        .await
        .expect("find")
        .expect("record");
    assert_eq!(found.preview_harvest_md5, Some(original_md5));

    // The never-indexed record is stamped by this pass.
    let found = records
        .find("ds-1", "rec-empty")
        .await
        .expect("find")
        .expect("record");
    assert_eq!(found.preview_harvest_md5, Some(pass_md5));

    // The unknown record was created by the conditional upsert with only
    // the preview pair set.
    let found = records
        .find("ds-1", "rec-unknown")
        .await
        .expect("find")
        .expect("record");
    assert_eq!(found.preview_harvest_md5, Some(pass_md5));
    assert!(found.latest_harvest_date.is_none());
}

#[tokio::test]
async fn clean_updater_flushes_large_dataset_in_batches() {
    let store = store();
    let records = HarvestedRecordStore::new(store.clone());

    for i in 0..1500 {
        let mut record =
            HarvestedRecord::from_latest_harvest("ds-1", format!("rec-{i}"), Utc::now(), None);
        record.published_harvest_date = Some(Utc::now());
        record.published_harvest_md5 = Some(Uuid::new_v4());
        records.insert(&record).await.expect("insert");
    }

    let mut updater = CleanUpdater::new(store, "ds-1", IndexTarget::Publish);
    for i in 0..1500 {
        updater
            .execute_record(&format!("rec-{i}"))
            .await
            .expect("execute");
    }
    let cleaned = updater.close().await.expect("close");
    assert_eq!(cleaned, 1500);

    let scanned = records.scan_dataset("ds-1").collect().await.expect("scan");
    assert_eq!(scanned.len(), 1500);
    assert!(scanned
        .iter()
        .all(|r| r.published_harvest_date.is_none() && r.published_harvest_md5.is_none()));
    // Cleaning never touches the harvest itself.
    assert!(scanned.iter().all(|r| r.latest_harvest_date.is_some()));
}

#[tokio::test]
async fn notification_count_across_bucket_boundary() {
    let store = store();
    let log = NotificationLog::new(store);

    // Fill bucket 0 completely (sequences 1..=9999 end it) and spill five
    // rows into bucket 1.
    for n in (1..=9_999).chain(10_000..=10_004) {
        log.append(&Notification::new(
            1,
            n,
            "indexing",
            format!("resource-{n}"),
            RecordState::Success,
        ))
        .await
        .expect("append");
    }

    assert_eq!(log.count_processed(1).await.expect("count"), 10_004);

    // A range straddling the boundary comes back complete and ordered.
    let range = log.range(1, 9_998, 10_002).await.expect("range");
    assert_eq!(
        range.iter().map(|n| n.resource_num).collect::<Vec<_>>(),
        vec![9_998, 9_999, 10_000, 10_001, 10_002]
    );

    log.delete_all(1).await.expect("delete");
    assert_eq!(log.count_processed(1).await.expect("count"), 0);
}

#[tokio::test]
async fn task_lifecycle_with_state_index() {
    let store = store();
    let tasks = TaskInfoStore::new(store.clone());
    let index = TaskStateIndex::new(store.clone());
    let records = ProcessedRecordStore::new(store.clone());
    let errors = ErrorAggregator::new(store);

    // Submit.
    let info = TaskInfo::new(77, "validation", TaskState::Queued);
    tasks.insert(&info).await.expect("insert task");
    index
        .insert(&TaskByState {
            state: TaskState::Queued,
            topology_name: "validation".into(),
            task_id: 77,
            application_id: Some("app-1".into()),
            topic_name: Some("validation_topic".into()),
            start_time: None,
        })
        .await
        .expect("index task");

    // A scheduler picks the oldest queued validation task.
    let picked = index
        .find_one_by_states_and_topology(&[TaskState::Queued], "validation")
        .await
        .expect("pick")
        .expect("task available");
    assert_eq!(picked.task_id, 77);

    // Start processing: state moves, index follows.
    tasks
        .update_state(77, TaskState::CurrentlyProcessing, "started")
        .await
        .expect("update state");
    index
        .insert(&TaskByState {
            state: TaskState::CurrentlyProcessing,
            ..picked.clone()
        })
        .await
        .expect("index move");
    index
        .delete(TaskState::Queued, "validation", 77)
        .await
        .expect("index cleanup");

    // Process two records, one of which fails.
    records
        .insert(&ProcessedRecord {
            task_id: 77,
            record_id: "rec-ok".into(),
            attempt_number: 1,
            dst_identifier: None,
            topology_name: Some("validation".into()),
            state: RecordState::Success,
            start_time: Some(Utc::now()),
            info_text: None,
            additional_informations: None,
        })
        .await
        .expect("insert record");
    records
        .update_state(77, "rec-bad", RecordState::Error)
        .await
        .expect("record error");
    errors
        .report(77, "schema validation failed", "rec-bad", None)
        .await
        .expect("report error");

    tasks
        .update_counters(
            77,
            RecordCounters {
                processed: 2,
                processed_errors: 1,
                ..RecordCounters::default()
            },
        )
        .await
        .expect("counters");

    // Finish.
    tasks
        .end_task(77, TaskState::Processed, "completed", Utc::now())
        .await
        .expect("end");

    let finished = tasks.require(77).await.expect("require");
    assert_eq!(finished.state, TaskState::Processed);
    assert_eq!(finished.processed_records_count, 2);
    assert_eq!(finished.processed_errors_count, 1);
    assert_eq!(errors.total_errors(77).await.expect("total"), 1);

    // The queued partition no longer offers the task.
    assert!(index
        .find_one_by_states_and_topology(&[TaskState::Queued], "validation")
        .await
        .expect("pick")
        .is_none());
}

#[tokio::test]
async fn dataset_scan_covers_sparse_buckets() {
    let store = store();
    let records = HarvestedRecordStore::new(store);

    // Few records relative to 64 buckets, so most buckets are empty and
    // the scan has to skip them without terminating early.
    for i in 0..7 {
        let record =
            HarvestedRecord::from_latest_harvest("sparse", format!("only-{i}"), Utc::now(), None);
        records.insert(&record).await.expect("insert");
    }

    let mut seen = records
        .scan_dataset("sparse")
        .collect()
        .await
        .expect("scan")
        .into_iter()
        .map(|r| r.record_local_id)
        .collect::<Vec<_>>();
    seen.sort();
    assert_eq!(
        seen,
        (0..7).map(|i| format!("only-{i}")).collect::<Vec<_>>()
    );
}
