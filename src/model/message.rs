//! Indexed messages and their lazily loaded bodies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};

use super::contact::Contact;
use super::mailbox::MailBox;
use crate::error::{MboxError, Result};

/// Header fields extracted while indexing. The body is never part of it.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeaders {
    /// Sender (`From:`).
    pub from: Option<Arc<Contact>>,
    /// Primary recipients (`To:`).
    pub to: Option<Vec<Arc<Contact>>>,
    /// Carbon-copy recipients (`Cc:`).
    pub cc: Option<Vec<Arc<Contact>>>,
    /// Unfolded `Subject:`; empty when absent.
    pub subject: String,
    /// `Date:`; the Unix epoch when absent or undecodable (see [`crate::config::DateFallback`]).
    pub date: DateTime<Utc>,
    /// `Message-Id:` as written.
    pub id: Option<String>,
    /// `References:` members.
    pub references: Option<Vec<String>>,
}

impl Default for MessageHeaders {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            cc: None,
            subject: String::new(),
            date: DateTime::UNIX_EPOCH,
            id: None,
            references: None,
        }
    }
}

/// A message inside a [`MailBox`].
///
/// Only headers are held in memory. The body is read from the mailbox file on
/// first access and kept behind a weak reference, so it disappears once the
/// mailbox's body cache lets go of it.
#[derive(Debug)]
pub struct Message {
    mailbox: Weak<MailBox>,
    offset: u64,
    headers: MessageHeaders,
    read: AtomicBool,
    body: Mutex<Option<Weak<str>>>,
}

impl Message {
    pub(crate) fn new(mailbox: Weak<MailBox>, offset: u64, headers: MessageHeaders) -> Self {
        Self {
            mailbox,
            offset,
            headers,
            read: AtomicBool::new(false),
            body: Mutex::new(None),
        }
    }

    /// Byte offset of the first header byte in the mailbox file.
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    /// The mailbox this message belongs to, if it is still alive.
    pub fn mailbox(&self) -> Option<Arc<MailBox>> {
        self.mailbox.upgrade()
    }

    pub fn from(&self) -> Option<&Arc<Contact>> {
        self.headers.from.as_ref()
    }

    pub fn to(&self) -> Option<&[Arc<Contact>]> {
        self.headers.to.as_deref()
    }

    pub fn cc(&self) -> Option<&[Arc<Contact>]> {
        self.headers.cc.as_deref()
    }

    pub fn subject(&self) -> &str {
        &self.headers.subject
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.headers.date
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.headers.date.timestamp()
    }

    pub fn id(&self) -> Option<&str> {
        self.headers.id.as_deref()
    }

    pub fn references(&self) -> Option<&[String]> {
        self.headers.references.as_deref()
    }

    pub fn is_read(&self) -> bool {
        self.read.load(Ordering::Relaxed)
    }

    pub fn set_read(&self, read: bool) {
        self.read.store(read, Ordering::Relaxed);
    }

    /// Body text, loaded from the mailbox file when not cached.
    pub fn body(&self) -> Result<Arc<str>> {
        let mut slot = self.body.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(body) = slot.as_ref().and_then(Weak::upgrade) {
            return Ok(body);
        }
        let mailbox = self.mailbox.upgrade().ok_or(MboxError::Detached)?;
        let body = mailbox.load_body(self.offset)?;
        *slot = Some(Arc::downgrade(&body));
        Ok(body)
    }

    /// `true` if a body is currently held in memory for this message.
    pub fn is_body_cached(&self) -> bool {
        let slot = self.body.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().is_some_and(|w| w.strong_count() > 0)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Message [id={}", self.id().unwrap_or(""))?;
        write!(f, " read={}", self.is_read())?;
        write!(f, " subject={}", self.subject())?;
        if let Some(from) = self.from() {
            write!(f, " from={from}")?;
        }
        for (label, list) in [("to", self.to()), ("cc", self.cc())] {
            if let Some(list) = list {
                let joined: Vec<String> = list.iter().map(|c| c.to_string()).collect();
                write!(f, " {label}=[{}]", joined.join(", "))?;
            }
        }
        write!(f, " date={}]", self.date().to_rfc2822())
    }
}
