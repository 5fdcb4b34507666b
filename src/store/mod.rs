//! Mailbox loading: indexes mbox files into mailboxes sharing one contact registry.

pub mod reader;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::model::address_book::AddressBook;
use crate::model::contact::ContactRegistry;
use crate::model::mailbox::{MailBox, MailBoxType};
use crate::model::message::Message;
use crate::parser::header::HeaderFieldDecoder;
use crate::parser::mbox::MessageIndexer;
use reader::LazyBodyLoader;

/// One file to load with [`MailboxStore::load_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailBoxSpec {
    pub kind: MailBoxType,
    pub name: String,
    pub path: PathBuf,
}

impl MailBoxSpec {
    pub fn new(kind: MailBoxType, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            name: name.into(),
            path: path.into(),
        }
    }

    /// Spec named after the file stem, with the role inferred from it.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(MailBoxType::from_name(&name), name, path)
    }
}

/// Load context: configuration, the shared contact registry and the root mailboxes.
pub struct MailboxStore {
    config: Config,
    registry: Arc<ContactRegistry>,
    mailboxes: Vec<Arc<MailBox>>,
}

impl MailboxStore {
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, Arc::new(ContactRegistry::new()))
    }

    /// Share an existing registry, so contacts stay unique across stores.
    pub fn with_registry(config: Config, registry: Arc<ContactRegistry>) -> Self {
        Self {
            config,
            registry,
            mailboxes: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ContactRegistry> {
        &self.registry
    }

    /// Root mailboxes in load order.
    pub fn mailboxes(&self) -> &[Arc<MailBox>] {
        &self.mailboxes
    }

    /// First root mailbox called `name`.
    pub fn mailbox(&self, name: &str) -> Option<&Arc<MailBox>> {
        self.mailboxes.iter().find(|m| m.name() == name)
    }

    /// Index `path` and add it as a root mailbox.
    pub fn load(
        &mut self,
        kind: MailBoxType,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Arc<MailBox>> {
        self.load_with_progress(kind, name, path, None)
    }

    /// Like [`MailboxStore::load`], reporting `(bytes_scanned, total_bytes)` while indexing.
    pub fn load_with_progress(
        &mut self,
        kind: MailBoxType,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<Arc<MailBox>> {
        let mailbox = self.index_file(kind, name.into(), path.as_ref(), progress)?;
        self.mailboxes.push(Arc::clone(&mailbox));
        Ok(mailbox)
    }

    /// Index `path` as a [`MailBoxType::Folder`] and attach it under `parent`.
    pub fn load_folder(
        &self,
        parent: &Arc<MailBox>,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Arc<MailBox>> {
        let folder = self.index_file(MailBoxType::Folder, name.into(), path.as_ref(), None)?;
        parent.add_folder(Arc::clone(&folder))?;
        Ok(folder)
    }

    /// Index several files in parallel, one thread per file.
    ///
    /// Either every mailbox is added, in `specs` order, or none is and the
    /// first error is returned.
    pub fn load_all(&mut self, specs: &[MailBoxSpec]) -> Result<Vec<Arc<MailBox>>> {
        let start = Instant::now();
        let this = &*self;
        let results: Vec<Result<Arc<MailBox>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = specs
                .iter()
                .map(|spec| {
                    scope.spawn(move || {
                        this.index_file(spec.kind, spec.name.clone(), &spec.path, None)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        let loaded = results.into_iter().collect::<Result<Vec<_>>>()?;
        self.mailboxes.extend(loaded.iter().cloned());
        info!(
            mailboxes = loaded.len(),
            contacts = self.registry.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded mailboxes"
        );
        Ok(loaded)
    }

    /// Snapshot of every contact seen so far.
    pub fn address_book(&self) -> AddressBook {
        AddressBook::from_registry(&self.registry)
    }

    // ── Queries across all roots ────────────────────────────────

    pub fn find_all(&self) -> Vec<Arc<Message>> {
        self.mailboxes.iter().flat_map(|m| m.find_all()).collect()
    }

    pub fn find_by_sender(&self, sender: &str) -> Vec<Arc<Message>> {
        self.mailboxes
            .iter()
            .flat_map(|m| m.find_by_sender(sender))
            .collect()
    }

    pub fn find_by_recipient(&self, recipient: &str) -> Vec<Arc<Message>> {
        self.mailboxes
            .iter()
            .flat_map(|m| m.find_by_recipient(recipient))
            .collect()
    }

    pub fn find_by_subject(&self, subject: &str) -> Vec<Arc<Message>> {
        self.mailboxes
            .iter()
            .flat_map(|m| m.find_by_subject(subject))
            .collect()
    }

    pub fn find_by_content(&self, content: &str) -> Result<Vec<Arc<Message>>> {
        let mut out = Vec::new();
        for mailbox in &self.mailboxes {
            out.extend(mailbox.find_by_content(content)?);
        }
        Ok(out)
    }

    fn index_file(
        &self,
        kind: MailBoxType,
        name: String,
        path: &Path,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<Arc<MailBox>> {
        let start = Instant::now();
        let chunk_size = self.config.reader.chunk_size;
        debug!(path = %path.display(), chunk_size, "Indexing mailbox");

        let decoder = HeaderFieldDecoder::new(&self.registry, self.config.parsing.date_fallback);
        let index = MessageIndexer::open(path, chunk_size, decoder)?.index_all(progress)?;
        let bodies = LazyBodyLoader::new(path, chunk_size, self.config.cache.body_cache_size);
        let mailbox = MailBox::from_index(kind, name, index, bodies)?;

        info!(
            path = %path.display(),
            name = mailbox.name(),
            messages = mailbox.messages().len(),
            warnings = mailbox.warnings().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Mailbox indexed"
        );
        Ok(mailbox)
    }
}
