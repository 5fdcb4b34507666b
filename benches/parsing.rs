use criterion::{criterion_group, criterion_main, Criterion};
use std::io::Write;
use std::path::Path;

use mboxindex::config::{Config, DateFallback};
use mboxindex::model::contact::ContactRegistry;
use mboxindex::model::mailbox::MailBoxType;
use mboxindex::parser::chunked::DEFAULT_CHUNK_SIZE;
use mboxindex::parser::header::HeaderFieldDecoder;
use mboxindex::parser::mbox::MessageIndexer;
use mboxindex::store::MailboxStore;

fn synthetic_mbox(messages: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..messages {
        if i > 0 {
            file.write_all(b"\r\n").unwrap();
        }
        write!(
            file,
            "From sender{s}@example.com Thu Jan  4 10:00:00 2024\r\n\
             Date: Thu, 4 Jan 2024 10:{m:02}:00 +0000\r\n\
             From: Sender {s} <sender{s}@example.com>\r\n\
             To: Team <team@example.com>,user{i}@example.com\r\n\
             Subject: Message number {i}\r\n \
             with a folded continuation\r\n\
             Message-ID: <{i}@example.com>\r\n\
             \r\n\
             Line one of the body.\r\n\
             Line two of the body.\r\n",
            s = i % 50,
            m = i % 60,
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

fn bench_index(c: &mut Criterion) {
    let file = synthetic_mbox(2_000);
    let path: &Path = file.path();

    c.bench_function("index_synthetic_mbox", |b| {
        b.iter(|| {
            let registry = ContactRegistry::new();
            let decoder = HeaderFieldDecoder::new(&registry, DateFallback::Epoch);
            MessageIndexer::open(path, DEFAULT_CHUNK_SIZE, decoder)
                .unwrap()
                .index_all(None)
                .unwrap()
                .messages
                .len()
        })
    });
}

fn bench_load_and_read_bodies(c: &mut Criterion) {
    let file = synthetic_mbox(500);
    let path: &Path = file.path();

    c.bench_function("load_and_read_bodies", |b| {
        b.iter(|| {
            let mut store = MailboxStore::new(Config::default());
            let mailbox = store.load(MailBoxType::Inbox, "Inbox", path).unwrap();
            mailbox
                .messages()
                .iter()
                .step_by(50)
                .map(|m| m.body().unwrap().len())
                .sum::<usize>()
        })
    });
}

criterion_group!(benches, bench_index, bench_load_and_read_bodies);
criterion_main!(benches);
