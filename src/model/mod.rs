//! Core data model: contacts, address books, messages and mailboxes.

pub mod address_book;
pub mod contact;
pub mod mailbox;
pub mod message;
