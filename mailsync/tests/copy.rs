use std::sync::Arc;

use mail_builder::MessageBuilder;
use mailsync::{
    copy::{self, StoreCopier},
    crawl::StoreCrawler,
    index::FolderIndex,
    store::{
        memory::{MemoryStore, Operation},
        Flags, FolderType,
    },
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

/// Crawl the target then copy the source onto it.
async fn copy(source: &MemoryStore, target: &MemoryStore) -> StoreCopier<MemoryStore, MemoryStore> {
    let source = Arc::new(source.clone());
    let target = Arc::new(target.clone());
    let source_index = Arc::new(FolderIndex::new());
    let target_index = Arc::new(FolderIndex::new());

    StoreCrawler::new(target.clone(), target_index.clone())
        .with_threads(2)
        .crawl()
        .await
        .unwrap();

    let copier = StoreCopier::new(source, target, source_index, target_index)
        .with_threads(2)
        .with_batch_size(2);

    copier.copy().await.unwrap();
    copier
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_copy_skips_existing_inbox() {
    let source = MemoryStore::new(".");
    source.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    source
        .add_message("INBOX", message("a@localhost"), Flags::default())
        .unwrap();

    let target = MemoryStore::new(".");
    target.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    target
        .add_message("INBOX", message("a@localhost"), Flags::default())
        .unwrap();

    let copier = copy(&source, &target).await;
    let counters = copier.counters();

    assert!(!copier.has_copy_exception());
    assert_eq!(counters.folders_copied(), 0);
    assert_eq!(counters.folders_skipped(), 1);
    assert_eq!(counters.messages_copied(), 0);
    assert_eq!(counters.messages_skipped(), 1);
    assert_eq!(target.message_count("INBOX"), 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_copy_translates_folder_names() {
    let source = MemoryStore::new(".");
    source.add_folder("INBOX", FolderType::HOLDS_MESSAGES | FolderType::HOLDS_FOLDERS);
    source.add_folder("INBOX.Sent", FolderType::HOLDS_MESSAGES);
    source.add_folder("Work", FolderType::HOLDS_FOLDERS);
    source.add_folder("Work.Projects", FolderType::HOLDS_MESSAGES);

    for (i, folder) in ["INBOX", "INBOX", "INBOX.Sent", "Work.Projects"].iter().enumerate() {
        source
            .add_message(folder, message(&format!("{i}@localhost")), Flags::default())
            .unwrap();
    }

    let target = MemoryStore::new("/");
    target.add_folder("Inbox", FolderType::HOLDS_MESSAGES);

    let copier = copy(&source, &target).await;
    let counters = copier.counters();

    assert!(!copier.has_copy_exception());
    assert_eq!(counters.folders_copied(), 3);
    assert_eq!(counters.folders_skipped(), 1);
    assert_eq!(counters.messages_copied(), 4);
    assert_eq!(counters.messages_skipped(), 0);

    assert_eq!(
        target.folder_names(),
        vec!["INBOX/Sent", "Inbox", "Work", "Work/Projects"]
    );
    assert_eq!(target.message_count("Inbox"), 2);
    assert_eq!(target.message_count("INBOX/Sent"), 1);
    assert_eq!(target.message_count("Work/Projects"), 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_copy_reports_conflicting_folder_names() {
    let source = MemoryStore::new(".");
    source.add_folder("a", FolderType::HOLDS_MESSAGES | FolderType::HOLDS_FOLDERS);
    source.add_folder("a.b", FolderType::HOLDS_MESSAGES);
    source.add_folder("a/b", FolderType::HOLDS_MESSAGES);
    source
        .add_message("a/b", message("conflict@localhost"), Flags::default())
        .unwrap();

    let target = MemoryStore::new("/");

    let copier = copy(&source, &target).await;
    let exceptions = copier.copy_exceptions();

    assert!(copier.has_copy_exception());
    assert_eq!(exceptions.len(), 1);
    assert!(matches!(
        exceptions[0].as_ref(),
        copy::Error::ConflictingFolderNameError(name, origin, target)
            if name == "a/b" && origin == "a.b" && target == "a/b"
    ));

    // the second folder messages are not copied
    assert_eq!(target.message_count("a/b"), 0);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_copy_continues_after_folder_failure() {
    let source = MemoryStore::new("/");
    source.add_folder("Drafts", FolderType::HOLDS_MESSAGES);
    source.add_folder("Sent", FolderType::HOLDS_MESSAGES);
    source
        .add_message("Drafts", message("draft@localhost"), Flags::default())
        .unwrap();
    source
        .add_message("Sent", message("sent@localhost"), Flags::default())
        .unwrap();

    let target = MemoryStore::new("/");
    target.fail(Operation::Create, "Drafts");

    let copier = copy(&source, &target).await;
    let counters = copier.counters();
    let exceptions = copier.copy_exceptions();

    assert_eq!(exceptions.len(), 1);
    assert!(matches!(
        exceptions[0].as_ref(),
        copy::Error::CreateFolderError(_, name) if name == "Drafts"
    ));

    assert_eq!(counters.folders_copied(), 1);
    assert_eq!(counters.messages_copied(), 1);
    assert_eq!(target.folder_names(), vec!["Sent"]);
    assert_eq!(target.message_count("Sent"), 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_copy_releases_claims_on_append_failure() {
    let source = MemoryStore::new("/");
    source.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    source
        .add_message("INBOX", message("a@localhost"), Flags::default())
        .unwrap();

    let target = MemoryStore::new("/");
    target.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    target.fail(Operation::Append, "INBOX");

    let source = Arc::new(source);
    let target_store = Arc::new(target.clone());
    let source_index = Arc::new(FolderIndex::new());
    let target_index = Arc::new(FolderIndex::new());

    StoreCrawler::new(target_store.clone(), target_index.clone())
        .crawl()
        .await
        .unwrap();

    let copier = StoreCopier::new(
        source.clone(),
        target_store.clone(),
        source_index.clone(),
        target_index.clone(),
    );
    copier.copy().await.unwrap();

    assert_eq!(copier.copy_exceptions().len(), 1);
    assert_eq!(copier.counters().messages_copied(), 0);
    assert!(target_index.folder_messages("INBOX").is_empty());
    assert_eq!(source_index.folder_messages("INBOX").len(), 1);

    // once the target accepts messages again, a new copy appends it
    target.clear_failures();

    let copier = StoreCopier::new(source, target_store, source_index, target_index);
    copier.copy().await.unwrap();

    assert!(!copier.has_copy_exception());
    assert_eq!(copier.counters().messages_copied(), 1);
    assert_eq!(target.message_count("INBOX"), 1);
}

#[test_log::test(tokio::test(flavor = "multi_thread"))]
async fn test_copy_fills_source_index_counters() {
    let source = MemoryStore::new("/");
    source.add_folder("INBOX", FolderType::HOLDS_MESSAGES);
    for raw in [
        message("a@localhost"),
        message("b@localhost"),
        message("a@localhost"),
        b"X-Empty: 1\r\n\r\nbody\r\n".to_vec(),
    ] {
        source.add_message("INBOX", raw, Flags::default()).unwrap();
    }

    let target = Arc::new(MemoryStore::new("/"));
    let source_index = Arc::new(FolderIndex::new());
    let target_index = Arc::new(FolderIndex::new());

    StoreCrawler::new(target.clone(), target_index.clone())
        .crawl()
        .await
        .unwrap();

    let copier = StoreCopier::new(
        Arc::new(source),
        target.clone(),
        source_index.clone(),
        target_index,
    )
    .with_threads(1)
    .with_batch_size(2);
    copier.copy().await.unwrap();

    let counters = copier.counters();
    assert_eq!(counters.messages_copied(), 2);
    assert_eq!(counters.messages_skipped(), 2);

    // duplicates and messages without identity stay out of the index
    assert_eq!(source_index.indexed_count(), 2);
    assert_eq!(source_index.skipped_count(), 2);
    assert_eq!(source_index.folder_messages("INBOX").len(), 2);
    assert_eq!(target.message_count("INBOX"), 2);
}
