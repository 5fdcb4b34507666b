//! Lazy body loading: reads message bodies by offset with LRU caching.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use tracing::debug;

use crate::error::Result;
use crate::parser::chunked::ChunkedReader;
use crate::parser::mbox;

/// Default number of decoded bodies kept per mailbox.
pub const DEFAULT_CACHE_SIZE: usize = 64;

/// Reads message bodies from an mbox file, given message offsets.
///
/// The LRU cache holds the only long-lived strong references to bodies.
/// Messages keep weak ones, so a body evicted here is freed as soon as the
/// last caller drops it.
pub struct LazyBodyLoader {
    path: PathBuf,
    chunk_size: usize,
    cache: Mutex<LruCache<u64, Arc<str>>>,
}

impl LazyBodyLoader {
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            path: path.into(),
            chunk_size,
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Body of the message starting at `offset`. Cached results are returned immediately.
    pub fn body_at(&self, offset: u64) -> Result<Arc<str>> {
        if let Some(body) = self.cache().get(&offset) {
            return Ok(Arc::clone(body));
        }

        let body: Arc<str> = self.read_body(offset)?.into();

        // Another thread may have loaded it meanwhile; keep the first copy.
        let mut cache = self.cache();
        if let Some(existing) = cache.get(&offset) {
            return Ok(Arc::clone(existing));
        }
        cache.put(offset, Arc::clone(&body));
        Ok(body)
    }

    /// Drop one cached body. Returns `true` if it was cached.
    pub fn evict(&self, offset: u64) -> bool {
        self.cache().pop(&offset).is_some()
    }

    /// Drop every cached body.
    pub fn clear(&self) {
        self.cache().clear();
    }

    /// Number of bodies currently cached.
    pub fn cached(&self) -> usize {
        self.cache().len()
    }

    fn read_body(&self, offset: u64) -> Result<String> {
        debug!(path = %self.path.display(), offset, "Reading message body");
        let mut reader = ChunkedReader::open(&self.path, self.chunk_size)?;
        mbox::read_body(&mut reader, offset)
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<u64, Arc<str>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for LazyBodyLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyBodyLoader")
            .field("path", &self.path)
            .field("chunk_size", &self.chunk_size)
            .field("cached", &self.cached())
            .finish()
    }
}
