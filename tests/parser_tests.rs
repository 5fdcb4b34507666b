//! Integration tests for the mbox indexer, lazy body loading, and mailbox store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_fs::prelude::*;
use assert_fs::TempDir;

use mboxindex::config::{Config, DateFallback};
use mboxindex::error::MboxError;
use mboxindex::model::contact::ContactRegistry;
use mboxindex::model::mailbox::{MailBox, MailBoxType};
use mboxindex::parser::header::HeaderFieldDecoder;
use mboxindex::parser::mbox::{MessageIndex, MessageIndexer, SEPARATOR};
use mboxindex::store::{MailBoxSpec, MailboxStore};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load_fixture() -> (MailboxStore, Arc<MailBox>) {
    let mut store = MailboxStore::new(Config::default());
    let inbox = store
        .load(MailBoxType::Inbox, "Inbox", fixture("sample.mbox"))
        .unwrap();
    (store, inbox)
}

fn index_file(path: &Path, chunk_size: usize) -> MessageIndex {
    let registry = ContactRegistry::new();
    let decoder = HeaderFieldDecoder::new(&registry, DateFallback::Epoch);
    MessageIndexer::open(path, chunk_size, decoder)
        .unwrap()
        .index_all(None)
        .unwrap()
}

fn small_config(chunk_size: usize) -> Config {
    let mut config = Config::default();
    config.reader.chunk_size = chunk_size;
    config
}

// ─── Test 1: Fixture has exactly 5 messages ─────────────────────────

#[test]
fn test_fixture_message_count() {
    let (_store, inbox) = load_fixture();
    assert_eq!(inbox.messages().len(), 5);
    assert_eq!(inbox.kind(), MailBoxType::Inbox);
    assert_eq!(inbox.path(), Some(fixture("sample.mbox").as_path()));
}

// ─── Test 2: First message fields ───────────────────────────────────

#[test]
fn test_first_message_fields() {
    let (_store, inbox) = load_fixture();
    let first = &inbox.messages()[0];
    assert_eq!(first.subject(), "Quarterly report");
    assert_eq!(first.id(), Some("<m1@example.com>"));
    assert_eq!(first.timestamp(), 1_704_362_400);

    let from = first.from().unwrap();
    assert_eq!(from.address(), "alice@example.com");
    assert_eq!(from.display_name(), "Alice Smith");
    assert_eq!(from.first_name(), "Alice");
    assert_eq!(from.last_name(), "Smith");

    let to = first.to().unwrap();
    assert_eq!(to.len(), 2);
    assert_eq!(to[0].display_name(), "Bob Jones");
    assert_eq!(to[1].address(), "carol@example.com");
    assert!(first.cc().is_none());
    assert!(!first.is_read());
}

// ─── Test 3: Reply headers ──────────────────────────────────────────

#[test]
fn test_reply_headers() {
    let (_store, inbox) = load_fixture();
    let reply = &inbox.messages()[1];
    assert_eq!(reply.subject(), "Re: Quarterly report");
    assert_eq!(reply.id(), Some("<m2@example.com>"));
    assert_eq!(reply.references(), Some(&["m1@example.com".to_string()][..]));
    assert_eq!(reply.cc().unwrap()[0].address(), "dave@example.com");
    // 09:30 +0100
    assert_eq!(reply.timestamp(), 1_704_443_400);
}

// ─── Test 4: Folded subject ─────────────────────────────────────────

#[test]
fn test_folded_subject_is_unfolded() {
    let (_store, inbox) = load_fixture();
    assert_eq!(
        inbox.messages()[2].subject(),
        "A subject that is folded over two lines"
    );
}

// ─── Test 5: Malformed date falls back, indexing continues ──────────

#[test]
fn test_malformed_date_uses_epoch() {
    let (_store, inbox) = load_fixture();
    let messages = inbox.messages();
    assert_eq!(messages[2].timestamp(), 0);
    assert_eq!(messages[4].subject(), "Empty body");
    // Missing Date header
    assert_eq!(messages[3].timestamp(), 0);
    assert_eq!(messages[4].timestamp(), 0);

    assert_eq!(inbox.warnings().len(), 1);
    assert!(inbox.warnings()[0].message.contains("yesterday afternoon"));
}

// ─── Test 6: Contacts are interned by address ───────────────────────

#[test]
fn test_same_address_same_contact() {
    let (store, inbox) = load_fixture();
    let messages = inbox.messages();
    let alice = messages[0].from().unwrap();
    assert!(Arc::ptr_eq(alice, &messages[1].to().unwrap()[0]));
    assert!(Arc::ptr_eq(alice, &messages[2].to().unwrap()[0]));
    assert!(Arc::ptr_eq(
        &messages[1].cc().unwrap()[0],
        messages[4].from().unwrap()
    ));
    assert!(Arc::ptr_eq(
        messages[1].from().unwrap(),
        messages[3].from().unwrap()
    ));
    assert_eq!(store.registry().len(), 4);

    alice.set_display_name("Alice S.").unwrap();
    assert_eq!(messages[1].to().unwrap()[0].display_name(), "Alice S.");
}

// ─── Test 7: Offsets strictly increase, count = separators + 1 ──────

#[test]
fn test_offsets_and_count_for_any_chunk_size() {
    let path = fixture("sample.mbox");
    let bytes = std::fs::read(&path).unwrap();
    let separators = bytes
        .windows(SEPARATOR.len())
        .filter(|w| *w == SEPARATOR)
        .count();

    for chunk_size in [1, 2, 7, 64, 4096] {
        let index = index_file(&path, chunk_size);
        assert_eq!(index.messages.len(), separators + 1, "chunk {chunk_size}");
        assert_eq!(index.messages[0].offset, 0);
        assert!(index
            .messages
            .windows(2)
            .all(|w| w[0].offset < w[1].offset));
        for m in &index.messages[1..] {
            let start = m.offset as usize;
            assert_eq!(&bytes[start - SEPARATOR.len()..start], SEPARATOR);
        }
    }
}

// ─── Test 8: Re-indexing is deterministic ───────────────────────────

#[test]
fn test_reindex_is_deterministic() {
    let path = fixture("sample.mbox");
    assert_eq!(index_file(&path, 3), index_file(&path, 64 * 1024));
}

// ─── Test 9: Bodies ─────────────────────────────────────────────────

#[test]
fn test_bodies_load_lazily() {
    let (_store, inbox) = load_fixture();
    let messages = inbox.messages();
    assert!(!messages[0].is_body_cached());
    assert_eq!(
        &*messages[0].body().unwrap(),
        "Please find the report attached.\r\nSee you soon.\r\n"
    );
    assert!(messages[0].is_body_cached());
    assert_eq!(&*messages[1].body().unwrap(), "Thanks, looks good.\r\n");
    assert_eq!(&*messages[2].body().unwrap(), "Short note.\r\n");
    assert_eq!(&*messages[3].body().unwrap(), "");
    assert_eq!(&*messages[4].body().unwrap(), "");
}

// ─── Test 9b: Empty body right before a separator ───────────────────

#[test]
fn test_empty_body_mid_file_keeps_next_message() {
    let (_store, inbox) = load_fixture();
    let messages = inbox.messages();
    assert_eq!(messages[3].subject(), "Ping");
    assert_eq!(messages[3].from().unwrap().address(), "bob@example.com");
    assert_eq!(messages[4].subject(), "Empty body");
    assert_eq!(messages[4].from().unwrap().address(), "dave@example.com");
}

#[test]
fn test_body_idempotent_and_stable_across_eviction() {
    let (_store, inbox) = load_fixture();
    let message = Arc::clone(&inbox.messages()[1]);

    let first = message.body().unwrap();
    let second = message.body().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    inbox.evict_bodies();
    drop(second);
    let text = first.to_string();
    drop(first);
    assert!(!message.is_body_cached());

    assert_eq!(&*message.body().unwrap(), text);
}

#[test]
fn test_body_of_detached_message() {
    let (store, inbox) = load_fixture();
    let message = Arc::clone(&inbox.messages()[0]);
    drop(store);
    drop(inbox);
    assert!(message.mailbox().is_none());
    assert!(matches!(message.body(), Err(MboxError::Detached)));
}

// ─── Test 10: Two-message scenario ──────────────────────────────────

#[test]
fn test_two_message_scenario() {
    let temp = TempDir::new().unwrap();
    let file = temp.child("two.mbox");
    file.write_binary(b"From a\r\nSubject: Hi\r\n\r\nBody1\r\nFrom b\r\nSubject: Bye\r\n\r\nBody2")
        .unwrap();

    for chunk_size in [1, 5, 1024] {
        let mut store = MailboxStore::new(small_config(chunk_size));
        let mailbox = store
            .load(MailBoxType::Other, "two", file.path())
            .unwrap();
        let messages = mailbox.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].subject(), "Hi");
        assert_eq!(messages[1].subject(), "Bye");
        assert_eq!(&*messages[0].body().unwrap(), "Body1");
        assert_eq!(&*messages[1].body().unwrap(), "Body2");
    }
}

#[test]
fn test_empty_file_has_no_messages() {
    let temp = TempDir::new().unwrap();
    let file = temp.child("empty.mbox");
    file.touch().unwrap();

    let mut store = MailboxStore::new(Config::default());
    let mailbox = store.load(MailBoxType::Trash, "Trash", file.path()).unwrap();
    assert!(mailbox.messages().is_empty());
}

// ─── Test 11: Queries ───────────────────────────────────────────────

#[test]
fn test_find_queries() {
    let (store, inbox) = load_fixture();
    assert_eq!(inbox.find_all().len(), 5);
    assert_eq!(inbox.find_by_sender("Alice").len(), 1);
    assert_eq!(inbox.find_by_recipient("alice").len(), 2);
    assert_eq!(inbox.find_by_subject("Quarterly").len(), 2);
    assert!(inbox.find_by_subject("quarterly").is_empty());

    let hits = store.find_by_content("looks good").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].subject(), "Re: Quarterly report");

    let book = store.address_book();
    assert_eq!(book.len(), 4);
    assert_eq!(book.find_by_last_name("Brown").len(), 1);
}

// ─── Test 12: Folders ───────────────────────────────────────────────

#[test]
fn test_load_folder_attaches_to_parent() {
    let temp = TempDir::new().unwrap();
    let archive = temp.child("archive.mbox");
    archive
        .write_binary(b"From x\r\nFrom: Bob Jones <bob@example.com>\r\nSubject: Archived\r\n\r\nold")
        .unwrap();

    let (store, inbox) = load_fixture();
    let folder = store.load_folder(&inbox, "Archive", archive.path()).unwrap();

    assert_eq!(folder.kind(), MailBoxType::Folder);
    assert!(Arc::ptr_eq(&folder.parent().unwrap(), &inbox));
    assert_eq!(inbox.folders().len(), 1);
    assert_eq!(inbox.find_all().len(), 6);
    assert_eq!(inbox.find_by_sender("Bob").len(), 3);
    assert_eq!(store.find_by_subject("Archived").len(), 1);
    assert_eq!(store.registry().len(), 4);
    assert_eq!(&*folder.messages()[0].body().unwrap(), "old");
}

// ─── Test 13: Parallel loading shares one registry ──────────────────

#[test]
fn test_load_all_in_parallel() {
    let temp = TempDir::new().unwrap();
    let mut specs = Vec::new();
    for i in 0..4 {
        let file = temp.child(format!("box{i}.mbox"));
        let content = format!(
            "From s\r\nFrom: Shared Person <shared@example.com>\r\nTo: user{i}@example.com\r\nSubject: box {i}\r\n\r\nbody {i}\r\nFrom t\r\nFrom: SHARED@example.com\r\n\r\n"
        );
        file.write_str(&content).unwrap();
        specs.push(MailBoxSpec::new(MailBoxType::Other, format!("box{i}"), file.path()));
    }

    let mut store = MailboxStore::new(small_config(16));
    let loaded = store.load_all(&specs).unwrap();
    assert_eq!(loaded.len(), 4);
    assert_eq!(store.mailboxes().len(), 4);
    assert_eq!(store.mailbox("box2").unwrap().messages()[0].subject(), "box 2");

    // shared + four distinct recipients
    assert_eq!(store.registry().len(), 5);
    let shared = store.registry().get("shared@example.com").unwrap();
    for mailbox in store.mailboxes() {
        for message in mailbox.messages() {
            assert!(Arc::ptr_eq(message.from().unwrap(), &shared));
        }
    }
    assert_eq!(store.find_by_sender("shared@example.com").len(), 8);
}

#[test]
fn test_load_all_is_all_or_nothing() {
    let temp = TempDir::new().unwrap();
    let good = temp.child("good.mbox");
    good.write_str("Subject: ok\r\n\r\n").unwrap();
    let specs = vec![
        MailBoxSpec::from_path(good.path()),
        MailBoxSpec::from_path(temp.path().join("missing.mbox")),
    ];

    let mut store = MailboxStore::new(Config::default());
    assert!(matches!(
        store.load_all(&specs),
        Err(MboxError::FileNotFound(_))
    ));
    assert!(store.mailboxes().is_empty());
}
