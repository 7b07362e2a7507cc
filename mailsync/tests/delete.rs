use std::sync::Arc;

use mail_builder::MessageBuilder;
use mailsync::{
    copy,
    crawl::StoreCrawler,
    delete::StoreDeleter,
    index::FolderIndex,
    store::{
        memory::{FolderClose, MemoryStore, MemoryStoreBuilder, Operation},
        Flags, FolderType, HostDefinition,
    },
    sync::{SyncBuilder, SyncConfig, SyncEvent},
};
use tokio::sync::Mutex;

fn message(id: &str) -> Vec<u8> {
    MessageBuilder::new()
        .date(1704106800_i64)
        .message_id(id)
        .from("alice@localhost")
        .to("bob@localhost")
        .subject(id)
        .text_body(id)
        .write_to_vec()
        .unwrap()
}

fn config() -> SyncConfig {
    SyncConfig::new(
        HostDefinition::new("source.localhost", 143),
        HostDefinition::new("target.localhost", 143),
    )
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_delete_is_skipped_after_copy_exception() {
    let source = MemoryStore::new("/");
    source.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    source
        .add_message("INBOX", message("a@localhost"), Flags::default())
        .unwrap();
    source
        .add_message("INBOX", message("b@localhost"), Flags::default())
        .unwrap();

    let target = MemoryStore::new("/");
    target.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    target.add_folder("Old", FolderType::HOLDS_MESSAGES);
    target
        .add_message("INBOX", message("x@localhost"), Flags::default())
        .unwrap();
    target.fail(Operation::Append, "INBOX");

    let events = Arc::new(Mutex::new(Vec::new()));

    let report = SyncBuilder::new(
        config(),
        MemoryStoreBuilder::new(source),
        MemoryStoreBuilder::new(target.clone()),
    )
    .with_delete(true)
    .with_handler({
        let events = events.clone();
        move |evt| {
            let events = events.clone();
            async move {
                events.lock().await.push(evt);
                Ok(())
            }
        }
    })
    .sync()
    .await
    .unwrap();

    assert!(report.has_copy_exception());
    assert_eq!(report.copy.exceptions.len(), 1);
    assert!(matches!(
        report.copy.exceptions[0].as_ref(),
        copy::Error::AppendMessageError(_, name) if name == "INBOX"
    ));
    assert!(report.delete.is_none());
    assert!(report.to_string().contains("  Exceptions:       true\n"));

    assert_eq!(
        events.lock().await.last(),
        Some(&SyncEvent::SkippedDeletion(1))
    );

    // nothing has been removed from the target
    assert!(target.has_folder("Old"));
    assert_eq!(target.message_count("INBOX"), 1);
    assert_eq!(target.sessions(), 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_delete_expunges_once_per_folder() {
    let source = MemoryStore::new("/");
    source.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    source
        .add_message("INBOX", message("keep@localhost"), Flags::default())
        .unwrap();

    let target = MemoryStore::new("/");
    target.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    for i in 0..450 {
        target
            .add_message("INBOX", message(&format!("{i}@localhost")), Flags::default())
            .unwrap();
    }

    let report = SyncBuilder::new(
        config(),
        MemoryStoreBuilder::new(source),
        MemoryStoreBuilder::new(target.clone()),
    )
    .with_threads(3)
    .with_batch_size(200)
    .with_delete(true)
    .sync()
    .await
    .unwrap();

    assert_eq!(report.copy.messages_copied, 1);

    let delete = report.delete.unwrap();
    assert_eq!(delete.messages_deleted, 450);
    assert_eq!(delete.messages_skipped, 1);

    let inbox = target.messages("INBOX");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].raw, message("keep@localhost"));

    // 451 messages make 3 batches, only the last one expunges, after
    // the two others
    let closes: Vec<_> = target
        .closes()
        .into_iter()
        .filter(|close| close.folder == "INBOX" && close.expunge)
        .collect();
    assert_eq!(closes.len(), 1);
    assert_eq!(
        target.closes().last(),
        Some(&FolderClose {
            folder: "INBOX".into(),
            expunge: true,
        })
    );
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_delete_folders() {
    let source = MemoryStore::new(".");
    source.add_folder("INBOX", FolderType::HOLDS_MESSAGES | FolderType::HOLDS_FOLDERS);
    source.add_folder("INBOX.Sent", FolderType::HOLDS_MESSAGES);

    let target = MemoryStore::new("/");
    target.add_folder("INBOX", FolderType::HOLDS_MESSAGES | FolderType::HOLDS_FOLDERS);
    target.add_folder("Old", FolderType::HOLDS_MESSAGES | FolderType::HOLDS_FOLDERS);
    target.add_folder("Old/Sub", FolderType::HOLDS_MESSAGES);
    target.add_folder("Locked", FolderType::HOLDS_MESSAGES);
    target.fail(Operation::Delete, "Locked");

    let report = SyncBuilder::new(
        config(),
        MemoryStoreBuilder::new(source),
        MemoryStoreBuilder::new(target.clone()),
    )
    .with_delete(true)
    .sync()
    .await
    .unwrap();

    assert_eq!(report.copy.folders_copied, 1);
    assert_eq!(report.copy.folders_skipped, 1);

    // children of a deleted folder are not visited, failures are
    // only logged
    let delete = report.delete.unwrap();
    assert_eq!(delete.folders_deleted, 1);
    assert_eq!(delete.folders_skipped, 2);

    assert_eq!(target.folder_names(), vec!["INBOX", "INBOX/Sent", "Locked"]);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_deleter_keeps_messages_known_to_source() {
    let target = MemoryStore::new("/");
    target.add_folder("Archives", FolderType::HOLDS_MESSAGES);
    for id in ["a@localhost", "b@localhost", "c@localhost"] {
        target
            .add_message("Archives", message(id), Flags::default())
            .unwrap();
    }
    target
        .add_message("Archives", "X-Empty: 1\r\n\r\nbody\r\n", Flags::default())
        .unwrap();

    // the source index as a copy would have filled it
    let source = MemoryStore::new("/");
    source.add_folder("Archives", FolderType::HOLDS_MESSAGES);
    source
        .add_message("Archives", message("b@localhost"), Flags::default())
        .unwrap();

    let source_index = Arc::new(FolderIndex::new());
    StoreCrawler::new(Arc::new(source), source_index.clone())
        .crawl()
        .await
        .unwrap();

    let target_index = Arc::new(FolderIndex::new());
    let deleter = StoreDeleter::new(Arc::new(target.clone()), source_index, target_index)
        .with_threads(2)
        .with_batch_size(3);

    deleter.delete().await.unwrap();

    let counters = deleter.counters();
    assert_eq!(counters.folders_deleted(), 0);
    assert_eq!(counters.folders_skipped(), 1);
    assert_eq!(counters.messages_deleted(), 2);
    assert_eq!(counters.messages_skipped(), 2);

    let messages = target.messages("Archives");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].raw, message("b@localhost"));
}
