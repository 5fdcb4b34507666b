//! Address book: a duplicate-free set of interned contacts with lookups.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::contact::{normalize_address, Contact, ContactRegistry};

/// A set of contacts keyed by normalized address.
#[derive(Debug, Default)]
pub struct AddressBook {
    contacts: BTreeMap<String, Arc<Contact>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book holding every contact currently in `registry`.
    pub fn from_registry(registry: &ContactRegistry) -> Self {
        let mut book = Self::new();
        for contact in registry.contacts() {
            book.add(contact);
        }
        book
    }

    /// Add a contact. Returns `false` if its address was already present.
    pub fn add(&mut self, contact: Arc<Contact>) -> bool {
        let key = normalize_address(contact.address());
        if self.contacts.contains_key(&key) {
            return false;
        }
        self.contacts.insert(key, contact);
        true
    }

    /// Remove a contact. Returns `false` if it was not in the book.
    pub fn remove(&mut self, contact: &Contact) -> bool {
        self.contacts
            .remove(&normalize_address(contact.address()))
            .is_some()
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn find_all(&self) -> Vec<Arc<Contact>> {
        self.contacts.values().cloned().collect()
    }

    /// Contacts whose names or address contain `query`.
    pub fn find(&self, query: &str) -> Vec<Arc<Contact>> {
        self.filter(|c| c.matches(query))
    }

    pub fn find_by_first_name(&self, query: &str) -> Vec<Arc<Contact>> {
        self.filter(|c| c.first_name().contains(query))
    }

    pub fn find_by_last_name(&self, query: &str) -> Vec<Arc<Contact>> {
        self.filter(|c| c.last_name().contains(query))
    }

    pub fn find_by_display_name(&self, query: &str) -> Vec<Arc<Contact>> {
        self.filter(|c| c.display_name().contains(query))
    }

    pub fn find_by_address(&self, query: &str) -> Vec<Arc<Contact>> {
        self.filter(|c| c.address().contains(query))
    }

    fn filter(&self, pred: impl Fn(&Contact) -> bool) -> Vec<Arc<Contact>> {
        self.contacts
            .values()
            .filter(|c| pred(c))
            .cloned()
            .collect()
    }
}

impl std::fmt::Display for AddressBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} contacts", self.len())
    }
}
