//! Mailboxes: ordered messages plus a tree of child folders.

use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, Weak};

use serde::{Deserialize, Serialize};

use super::message::Message;
use crate::error::{MboxError, Result};
use crate::parser::mbox::{IndexWarning, MessageIndex};
use crate::store::reader::LazyBodyLoader;

/// Serializes folder attach/detach across all mailbox trees.
static TREE_LOCK: Mutex<()> = Mutex::new(());

/// Role of a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBoxType {
    Folder,
    Inbox,
    Trash,
    Sent,
    Drafts,
    Other,
}

impl MailBoxType {
    /// Infer the role from a mailbox name (`"Inbox"`, `"sent"`, ...).
    ///
    /// Unknown names are [`MailBoxType::Other`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "folder" => Self::Folder,
            "inbox" => Self::Inbox,
            "trash" => Self::Trash,
            "sent" => Self::Sent,
            "drafts" => Self::Drafts,
            _ => Self::Other,
        }
    }
}

/// A mailbox backed by one mbox file.
///
/// Messages are fixed at construction, in file order. Folders can be attached
/// afterwards; every folder keeps a weak pointer back to its parent.
pub struct MailBox {
    kind: MailBoxType,
    name: String,
    parent: RwLock<Weak<MailBox>>,
    messages: Vec<Arc<Message>>,
    folders: RwLock<Vec<Arc<MailBox>>>,
    bodies: Option<LazyBodyLoader>,
    warnings: Vec<IndexWarning>,
}

impl MailBox {
    /// Create an empty mailbox with no backing file.
    pub fn new(kind: MailBoxType, name: impl Into<String>) -> Result<Arc<Self>> {
        let name = validate_name(name.into())?;
        Ok(Arc::new(Self {
            kind,
            name,
            parent: RwLock::new(Weak::new()),
            messages: Vec::new(),
            folders: RwLock::new(Vec::new()),
            bodies: None,
            warnings: Vec::new(),
        }))
    }

    /// Publish an indexed file as a mailbox.
    pub(crate) fn from_index(
        kind: MailBoxType,
        name: impl Into<String>,
        index: MessageIndex,
        bodies: LazyBodyLoader,
    ) -> Result<Arc<Self>> {
        let name = validate_name(name.into())?;
        let MessageIndex { messages, warnings } = index;
        Ok(Arc::new_cyclic(|me: &Weak<MailBox>| Self {
            kind,
            name,
            parent: RwLock::new(Weak::new()),
            messages: messages
                .into_iter()
                .map(|m| Arc::new(Message::new(me.clone(), m.offset, m.headers)))
                .collect(),
            folders: RwLock::new(Vec::new()),
            bodies: Some(bodies),
            warnings,
        }))
    }

    pub fn kind(&self) -> MailBoxType {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing mbox file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.bodies.as_ref().map(|b| b.path())
    }

    pub fn parent(&self) -> Option<Arc<MailBox>> {
        self.parent
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .upgrade()
    }

    /// Messages in file order.
    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    /// Snapshot of the direct child folders.
    pub fn folders(&self) -> Vec<Arc<MailBox>> {
        self.folders_guard().clone()
    }

    /// Recoverable decode problems met while indexing this mailbox.
    pub fn warnings(&self) -> &[IndexWarning] {
        &self.warnings
    }

    /// Attach `folder` as a child of this mailbox.
    ///
    /// Only [`MailBoxType::Folder`] mailboxes without a parent are accepted,
    /// and a mailbox can never become its own descendant.
    pub fn add_folder(self: &Arc<Self>, folder: Arc<MailBox>) -> Result<()> {
        let _tree = TREE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        if folder.kind != MailBoxType::Folder {
            return Err(MboxError::InvalidFolder(format!(
                "'{}' is not a folder",
                folder.name
            )));
        }
        if folder.parent().is_some() {
            return Err(MboxError::InvalidFolder(format!(
                "'{}' already has a parent",
                folder.name
            )));
        }
        let mut ancestor = Some(Arc::clone(self));
        while let Some(current) = ancestor {
            if Arc::ptr_eq(&current, &folder) {
                return Err(MboxError::InvalidFolder(format!(
                    "'{}' would become its own ancestor",
                    folder.name
                )));
            }
            ancestor = current.parent();
        }

        *folder.parent.write().unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(self);
        self.folders
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(folder);
        Ok(())
    }

    /// Detach a child folder. Returns `false` if it was not a child.
    pub fn remove_folder(&self, folder: &Arc<MailBox>) -> bool {
        let _tree = TREE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut folders = self.folders.write().unwrap_or_else(|e| e.into_inner());
        let Some(pos) = folders.iter().position(|f| Arc::ptr_eq(f, folder)) else {
            return false;
        };
        let removed = folders.remove(pos);
        *removed.parent.write().unwrap_or_else(|e| e.into_inner()) = Weak::new();
        true
    }

    /// Read a message body through this mailbox's cache.
    pub(crate) fn load_body(&self, offset: u64) -> Result<Arc<str>> {
        let bodies = self.bodies.as_ref().ok_or_else(|| {
            MboxError::InvalidMailBox(format!("'{}' has no backing file", self.name))
        })?;
        bodies.body_at(offset)
    }

    /// Drop every cached body of this mailbox (not of its folders).
    pub fn evict_bodies(&self) {
        if let Some(bodies) = &self.bodies {
            bodies.clear();
        }
    }

    // ── Recursive queries ───────────────────────────────────────

    /// All messages of this mailbox, then of each folder, depth first.
    pub fn find_all(&self) -> Vec<Arc<Message>> {
        let mut out = Vec::new();
        self.collect(&mut out, &|_| true);
        out
    }

    /// Messages whose sender's names or address contain `sender`.
    pub fn find_by_sender(&self, sender: &str) -> Vec<Arc<Message>> {
        let mut out = Vec::new();
        self.collect(&mut out, &|m| m.from().is_some_and(|c| c.matches(sender)));
        out
    }

    /// Messages with at least one `To:` contact matching `recipient`.
    pub fn find_by_recipient(&self, recipient: &str) -> Vec<Arc<Message>> {
        let mut out = Vec::new();
        self.collect(&mut out, &|m| {
            m.to()
                .is_some_and(|to| to.iter().any(|c| c.matches(recipient)))
        });
        out
    }

    pub fn find_by_subject(&self, subject: &str) -> Vec<Arc<Message>> {
        let mut out = Vec::new();
        self.collect(&mut out, &|m| m.subject().contains(subject));
        out
    }

    /// Messages whose body contains `content`. Loads every body it visits.
    pub fn find_by_content(&self, content: &str) -> Result<Vec<Arc<Message>>> {
        let mut out = Vec::new();
        for message in &self.messages {
            if message.body()?.contains(content) {
                out.push(Arc::clone(message));
            }
        }
        for folder in self.folders() {
            out.extend(folder.find_by_content(content)?);
        }
        Ok(out)
    }

    fn collect(&self, out: &mut Vec<Arc<Message>>, pred: &dyn Fn(&Message) -> bool) {
        for message in &self.messages {
            if pred(message) {
                out.push(Arc::clone(message));
            }
        }
        for folder in self.folders_guard().iter() {
            folder.collect(out, pred);
        }
    }

    fn folders_guard(&self) -> RwLockReadGuard<'_, Vec<Arc<MailBox>>> {
        self.folders.read().unwrap_or_else(|e| e.into_inner())
    }
}

fn validate_name(name: String) -> Result<String> {
    if name.trim().is_empty() {
        return Err(MboxError::InvalidMailBox(
            "name cannot be empty".to_string(),
        ));
    }
    Ok(name)
}

impl std::fmt::Debug for MailBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailBox")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("messages", &self.messages.len())
            .field("folders", &self.folders_guard().len())
            .finish()
    }
}

impl std::fmt::Display for MailBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [messages={} folders={}]",
            self.name,
            self.messages.len(),
            self.folders_guard().len()
        )
    }
}
