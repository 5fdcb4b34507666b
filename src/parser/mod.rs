//! Mailbox parsing: chunked byte reader, header decoding and the streaming indexer.

pub mod chunked;
pub mod header;
pub mod mbox;
