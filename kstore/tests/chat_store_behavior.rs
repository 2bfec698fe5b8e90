use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use kprovider::{Message, Role};
use kstore::{
    ChatFilter, ChatRecord, ChatStore, ChatStoreOptions, StoreErrorKind, StoreHooks,
    StoreOperation,
};
use tokio_util::sync::CancellationToken;

fn record(id: &str, minutes: i64, text: &str) -> ChatRecord {
    let base = Utc
        .with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    ChatRecord::new(id, vec![Message::user(text), Message::assistant("ok")])
        .with_create_time(base + Duration::minutes(minutes))
}

async fn file_ids(path: &Path) -> Vec<String> {
    tokio::fs::read_to_string(path)
        .await
        .expect("chat file should be readable")
        .lines()
        .map(|line| {
            serde_json::from_str::<serde_json::Value>(line).expect("line should be json")["id"]
                .as_str()
                .expect("id")
                .to_string()
        })
        .collect()
}

#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

impl StoreHooks for RecordingHooks {
    fn on_line_skipped(&self, _path: &Path, line: usize, _reason: &str) {
        self.events
            .lock()
            .expect("events lock")
            .push(format!("skipped:{line}"));
    }

    fn on_rollback(&self, operation: StoreOperation, key: &str, _error: &kstore::StoreError) {
        self.events
            .lock()
            .expect("events lock")
            .push(format!("rollback:{}:{key}", operation.as_str()));
    }
}

#[tokio::test]
async fn records_survive_reopen_sorted_newest_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("k-cli/chats.jsonl");

    let store = ChatStore::open(&path).await.expect("store should open");
    for (id, minutes) in [("old", 0), ("new", 20), ("mid", 10)] {
        store
            .add(record(id, minutes, "hello"))
            .await
            .expect("add should succeed");
    }
    store.shutdown().await;

    assert_eq!(file_ids(&path).await, vec!["new", "mid", "old"]);

    let reopened = ChatStore::open(&path).await.expect("store should reopen");
    let listed = reopened
        .list(ChatFilter::new())
        .await
        .expect("list should succeed");
    assert_eq!(
        listed.iter().map(|record| record.id.as_str()).collect::<Vec<_>>(),
        vec!["new", "mid", "old"]
    );
    let expected = record("new", 20, "hello");
    assert_eq!(listed[0].messages, expected.messages);
    assert_eq!(listed[0].create_time, expected.create_time);
    reopened.shutdown().await;
}

#[tokio::test]
async fn missing_records_follow_the_absent_id_rules() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChatStore::open(dir.path().join("chats.jsonl"))
        .await
        .expect("store should open");

    assert_eq!(store.get("nope").await.expect("get"), None);
    assert!(!store.delete("nope").await.expect("delete"));
    let error = store
        .update(record("nope", 0, "x"))
        .await
        .expect_err("update should fail");
    assert_eq!(error.kind, StoreErrorKind::NotFound);

    let error = store
        .add(record("", 0, "x"))
        .await
        .expect_err("empty id should be rejected");
    assert_eq!(error.kind, StoreErrorKind::InvalidInput);
    store.shutdown().await;
}

#[tokio::test]
async fn failed_persistence_rolls_the_cache_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("data");
    let hooks = Arc::new(RecordingHooks::default());
    let store = ChatStore::open_with(
        root.join("chats.jsonl"),
        ChatStoreOptions::default(),
        hooks.clone(),
    )
    .await
    .expect("store should open");
    let original = store
        .add(record("keep", 0, "original"))
        .await
        .expect("add should succeed");

    tokio::fs::remove_dir_all(&root)
        .await
        .expect("directory should be removed");

    let add = store.add(record("fresh", 5, "x")).await;
    assert_eq!(add.map_err(|error| error.kind), Err(StoreErrorKind::Storage));
    assert_eq!(store.get("fresh").await.expect("get"), None);

    let mut changed = original.clone();
    changed.update_messages(vec![Message::user("changed")]);
    assert!(store.update(changed).await.is_err());
    assert_eq!(store.get("keep").await.expect("get"), Some(original.clone()));

    assert!(store.delete("keep").await.is_err());
    assert_eq!(store.get("keep").await.expect("get"), Some(original));

    assert_eq!(
        hooks.events.lock().expect("events lock").as_slice(),
        ["rollback:add:fresh", "rollback:update:keep", "rollback:delete:keep"]
    );
    store.shutdown().await;
}

#[tokio::test]
async fn list_filters_by_keyword_and_limit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChatStore::open(dir.path().join("chats.jsonl"))
        .await
        .expect("store should open");
    store.add(record("a", 0, "Hello world")).await.expect("add");
    store.add(record("b", 1, "goodbye")).await.expect("add");
    store.add(record("c", 2, "say HELLO")).await.expect("add");

    let listed = store
        .list(ChatFilter::new().with_keyword("hello"))
        .await
        .expect("list");
    assert_eq!(
        listed.iter().map(|record| record.id.as_str()).collect::<Vec<_>>(),
        vec!["c", "a"]
    );

    let limited = store
        .list(ChatFilter::new().with_keyword("hello").with_limit(1))
        .await
        .expect("list");
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, "c");
    store.shutdown().await;
}

#[tokio::test]
async fn concurrent_writers_each_get_exactly_one_response() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chats.jsonl");
    let store = Arc::new(
        ChatStore::open_with(&path, ChatStoreOptions::new(3, 4), Arc::new(kstore::NoopStoreHooks))
            .await
            .expect("store should open"),
    );

    let tasks = (0..40)
        .map(|index| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .add(record(&format!("chat-{index:02}"), index, "hello"))
                    .await
            })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await
            .expect("task should finish")
            .expect("add should succeed");
    }

    assert_eq!(store.list(ChatFilter::new()).await.expect("list").len(), 40);
    let ids = file_ids(&path).await;
    assert_eq!(ids.len(), 40);
    assert_eq!(ids.first().map(String::as_str), Some("chat-39"));
    store.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_idempotent_and_rejects_new_work() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChatStore::open(dir.path().join("chats.jsonl"))
        .await
        .expect("store should open");
    store.add(record("a", 0, "hi")).await.expect("add");

    store.shutdown().await;
    store.shutdown().await;

    assert!(store.is_shutdown());
    let error = store.get("a").await.expect_err("store is shut down");
    assert_eq!(error.kind, StoreErrorKind::Shutdown);
    assert_eq!(error.message, "repository is shutdown");
}

#[tokio::test]
async fn cancelled_submissions_are_never_enqueued() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ChatStore::open(dir.path().join("chats.jsonl"))
        .await
        .expect("store should open");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let error = store
        .add_async(record("ghost", 0, "boo"), &cancel)
        .await
        .await
        .expect_err("submission should be cancelled");
    assert_eq!(error.kind, StoreErrorKind::Cancelled);

    assert_eq!(store.get("ghost").await.expect("get"), None);
    store.shutdown().await;
}

#[tokio::test]
async fn load_skips_malformed_lines_and_strips_system_messages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chats.jsonl");
    let mut dirty = record("dirty", 0, "hello");
    dirty.messages.insert(0, Message::system("leaked"));
    let line = serde_json::to_string(&dirty).expect("encode");
    tokio::fs::write(&path, format!("not json\n\n{line}\n"))
        .await
        .expect("seed file");

    let hooks = Arc::new(RecordingHooks::default());
    let store = ChatStore::open_with(&path, ChatStoreOptions::default(), hooks.clone())
        .await
        .expect("store should open");

    let loaded = store.get("dirty").await.expect("get").expect("record");
    assert!(loaded.messages.iter().all(|message| message.role != Role::System));
    assert_eq!(
        hooks.events.lock().expect("events lock").as_slice(),
        ["skipped:1"]
    );
    store.shutdown().await;
}

#[tokio::test]
async fn load_skips_lines_that_are_not_utf8() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chats.jsonl");
    let line = serde_json::to_string(&record("valid", 0, "hello")).expect("encode");
    let mut contents = b"\xff\xfe garbage\n".to_vec();
    contents.extend_from_slice(line.as_bytes());
    contents.push(b'\n');
    tokio::fs::write(&path, contents).await.expect("seed file");

    let hooks = Arc::new(RecordingHooks::default());
    let store = ChatStore::open_with(&path, ChatStoreOptions::default(), hooks.clone())
        .await
        .expect("store should open");

    let loaded = store.get("valid").await.expect("get").expect("record");
    assert_eq!(loaded.messages.len(), 2);
    assert_eq!(
        hooks.events.lock().expect("events lock").as_slice(),
        ["skipped:1"]
    );
    store.shutdown().await;
}
