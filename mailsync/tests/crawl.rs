use std::sync::Arc;

use mail_builder::MessageBuilder;
use mailsync::{
    crawl::{self, StoreCrawler},
    index::FolderIndex,
    store::{
        memory::{MemoryStore, MemoryStoreBuilder, Operation},
        Flags, FolderType, HostDefinition,
    },
    sync::{self, SyncBuilder, SyncConfig},
};

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

fn store() -> MemoryStore {
    let store = MemoryStore::new(".");
    store.add_folder("INBOX", FolderType::HOLDS_MESSAGES | FolderType::HOLDS_FOLDERS);
    store.add_folder("INBOX.Sent", FolderType::HOLDS_MESSAGES);
    store.add_folder("Archives", FolderType::HOLDS_FOLDERS);

    for id in ["a@localhost", "b@localhost", "a@localhost", "c@localhost", "d@localhost"] {
        store
            .add_message("INBOX", message(id), Flags::default())
            .unwrap();
    }

    store
        .add_message("INBOX.Sent", message("e@localhost"), Flags::default())
        .unwrap();

    // a message without any identity header cannot be fingerprinted
    store
        .add_message("INBOX.Sent", "X-Empty: 1\r\n\r\nbody\r\n", Flags::default())
        .unwrap();

    store
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_crawl() {
    let index = Arc::new(FolderIndex::new());

    StoreCrawler::new(Arc::new(store()), index.clone())
        .with_threads(4)
        .with_batch_size(2)
        .crawl()
        .await
        .unwrap();

    assert_eq!(index.separator(), Some("."));
    assert_eq!(index.inbox(), Some("INBOX"));

    let mut folders: Vec<_> = index.folders().into_iter().collect();
    folders.sort();
    assert_eq!(folders, vec!["Archives", "INBOX", "INBOX.Sent"]);

    assert_eq!(index.indexed_count(), 5);
    assert_eq!(index.skipped_count(), 2);
    assert_eq!(index.folder_messages("INBOX").len(), 4);
    assert_eq!(index.folder_messages("INBOX.Sent").len(), 1);
    assert!(index.folder_messages("Archives").is_empty());
    assert!(!index.has_crawl_exception());
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_crawl_empty_store() {
    let index = Arc::new(FolderIndex::new());

    StoreCrawler::new(Arc::new(MemoryStore::new("/")), index.clone())
        .crawl()
        .await
        .unwrap();

    assert_eq!(index.separator(), Some("/"));
    assert!(index.folders().is_empty());
    assert_eq!(index.indexed_count(), 0);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_crawl_exception() {
    let store = store();
    store.fail(Operation::ReadHeader, "INBOX.Sent");

    let index = Arc::new(FolderIndex::new());
    let err = StoreCrawler::new(Arc::new(store), index.clone())
        .with_batch_size(2)
        .crawl()
        .await
        .unwrap_err();

    assert!(index.has_crawl_exception());
    assert!(matches!(
        err,
        crawl::Error::CrawlExceptionError(ref err)
            if matches!(err.as_ref(), crawl::Error::FingerprintError(_, name) if name == "INBOX.Sent")
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_crawl_exception_abandons_pending_batches() {
    let store = MemoryStore::new("/");
    store.add_folder("INBOX", FolderType::HOLDS_MESSAGES);

    let uids: Vec<u64> = (1..=6)
        .map(|i| {
            store
                .add_message("INBOX", message(&format!("{i}@localhost")), Flags::default())
                .unwrap()
        })
        .collect();

    // the second message of the first batch cannot be read
    store.fail_message(Operation::ReadHeader, "INBOX", uids[1]);

    // a single worker runs the three batches one after the other
    let index = Arc::new(FolderIndex::new());
    let err = StoreCrawler::new(Arc::new(store), index.clone())
        .with_threads(1)
        .with_batch_size(2)
        .crawl()
        .await
        .unwrap_err();

    assert!(matches!(err, crawl::Error::CrawlExceptionError(_)));
    assert_eq!(index.crawl_exceptions().len(), 1);

    // nothing gets indexed once the exception is recorded
    assert_eq!(index.indexed_count(), 1);
    assert_eq!(index.folder_messages("INBOX").len(), 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_crawl_walk_failure() {
    let store = store();
    store.fail(Operation::List, "INBOX");

    let err = StoreCrawler::new(Arc::new(store), Arc::new(FolderIndex::new()))
        .crawl()
        .await
        .unwrap_err();

    assert!(matches!(err, crawl::Error::ListFoldersError(_, ref name) if name == "INBOX"));
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_sync_stops_on_crawl_exception() {
    let source = MemoryStore::new(".");
    source.add_folder("Sent", FolderType::HOLDS_MESSAGES);
    source
        .add_message("Sent", message("f@localhost"), Flags::default())
        .unwrap();

    let target = store();
    target.fail(Operation::Fetch, "INBOX");

    let config = SyncConfig::new(
        HostDefinition::new("source.localhost", 143),
        HostDefinition::new("target.localhost", 143),
    );

    let err = SyncBuilder::new(
        config,
        MemoryStoreBuilder::new(source.clone()),
        MemoryStoreBuilder::new(target.clone()),
    )
    .with_delete(true)
    .sync()
    .await
    .unwrap_err();

    assert!(matches!(err, sync::Error::CrawlTargetError(_)));

    // nothing has been copied nor deleted
    assert_eq!(source.sessions(), 0);
    assert!(!target.has_folder("Sent"));
    assert_eq!(target.message_count("INBOX"), 5);
}
