//! Contacts and the registry that interns them by address.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::error::{MboxError, Result};

/// A person appearing in `From:`, `To:` or `Cc:` headers.
///
/// Instances are only created by [`ContactRegistry::intern`], so every holder
/// of a given address shares the same `Arc<Contact>`. Name fields are mutable
/// and a change is visible to all of them.
#[derive(Debug)]
pub struct Contact {
    address: String,
    details: RwLock<ContactDetails>,
}

#[derive(Debug, Clone, PartialEq)]
struct ContactDetails {
    first_name: String,
    last_name: String,
    display_name: String,
    image_location: Option<PathBuf>,
}

impl Contact {
    fn new(first_name: &str, last_name: &str, display_name: &str, address: &str) -> Result<Self> {
        if display_name.is_empty() {
            return Err(MboxError::InvalidContact(
                "display name cannot be empty".to_string(),
            ));
        }
        if address.is_empty() {
            return Err(MboxError::InvalidContact(
                "address cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            address: address.to_string(),
            details: RwLock::new(ContactDetails {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                display_name: display_name.to_string(),
                image_location: None,
            }),
        })
    }

    fn details(&self) -> RwLockReadGuard<'_, ContactDetails> {
        self.details.read().unwrap_or_else(|e| e.into_inner())
    }

    fn details_mut(&self) -> RwLockWriteGuard<'_, ContactDetails> {
        self.details.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The address as first encountered (original case).
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn first_name(&self) -> String {
        self.details().first_name.clone()
    }

    pub fn last_name(&self) -> String {
        self.details().last_name.clone()
    }

    pub fn display_name(&self) -> String {
        self.details().display_name.clone()
    }

    pub fn set_first_name(&self, first_name: impl Into<String>) {
        self.details_mut().first_name = first_name.into();
    }

    pub fn set_last_name(&self, last_name: impl Into<String>) {
        self.details_mut().last_name = last_name.into();
    }

    /// Replace the display name. Empty names are rejected.
    pub fn set_display_name(&self, display_name: impl Into<String>) -> Result<()> {
        let display_name = display_name.into();
        if display_name.is_empty() {
            return Err(MboxError::InvalidContact(
                "display name cannot be empty".to_string(),
            ));
        }
        self.details_mut().display_name = display_name;
        Ok(())
    }

    /// Location of the contact's picture, if one was assigned.
    pub fn image_location(&self) -> Option<PathBuf> {
        self.details().image_location.clone()
    }

    /// Picture location, or `default` when none was assigned.
    pub fn image_location_or(&self, default: &Path) -> PathBuf {
        self.image_location()
            .unwrap_or_else(|| default.to_path_buf())
    }

    pub fn set_image_location(&self, path: impl Into<PathBuf>) {
        self.details_mut().image_location = Some(path.into());
    }

    /// `true` if `needle` occurs in the display, first or last name or the address.
    pub fn matches(&self, needle: &str) -> bool {
        let d = self.details();
        d.display_name.contains(needle)
            || d.first_name.contains(needle)
            || d.last_name.contains(needle)
            || self.address.contains(needle)
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.address == other.address && *self.details() == *other.details()
    }
}

impl std::fmt::Display for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.details().display_name, self.address)
    }
}

/// Normalized interning key: trimmed, ASCII-lowercased address.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Interning table mapping a normalized address to its shared [`Contact`].
///
/// Safe to share between threads indexing different mailbox files.
#[derive(Debug, Default)]
pub struct ContactRegistry {
    contacts: RwLock<HashMap<String, Arc<Contact>>>,
}

impl ContactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the contact for `address`, creating it on first sight.
    ///
    /// On a hit the supplied names are ignored; the first encounter wins.
    pub fn intern(
        &self,
        first_name: &str,
        last_name: &str,
        display_name: &str,
        address: &str,
    ) -> Result<Arc<Contact>> {
        let key = normalize_address(address);
        if let Some(existing) = self.read().get(&key) {
            return Ok(Arc::clone(existing));
        }

        let mut contacts = self.contacts.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have inserted between the two locks.
        if let Some(existing) = contacts.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let contact = Arc::new(Contact::new(
            first_name,
            last_name,
            display_name,
            address.trim(),
        )?);
        trace!(address = %key, "Interned new contact");
        contacts.insert(key, Arc::clone(&contact));
        Ok(contact)
    }

    /// Look up an already interned contact.
    pub fn get(&self, address: &str) -> Option<Arc<Contact>> {
        self.read().get(&normalize_address(address)).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Snapshot of every interned contact, sorted by normalized address.
    pub fn contacts(&self) -> Vec<Arc<Contact>> {
        let map = self.read();
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        keys.into_iter().map(|k| Arc::clone(&map[k])).collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Contact>>> {
        self.contacts.read().unwrap_or_else(|e| e.into_inner())
    }
}
