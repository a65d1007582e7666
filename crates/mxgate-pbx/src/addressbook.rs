//! Server-side address book replica
//!
//! Mirrors the PBX contact directory. Seeded once after session login,
//! then driven entirely by address-book events; for any JID at most one
//! contact exists.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// One PBX directory entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Stable identity within the PBX
    pub jid: String,
    pub first_name: String,
    pub last_name: String,
    /// The contact's extension
    pub ext: String,
    pub cell_phone: String,
    pub email: String,
}

/// Mapping `JID -> Contact`; one writer (the event dispatcher), many
/// readers.
#[derive(Default)]
pub struct AddressBook {
    contacts: DashMap<String, Contact>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by JID.
    pub fn upsert(&self, contact: Contact) {
        self.contacts.insert(contact.jid.clone(), contact);
    }

    /// Remove by JID; unknown JIDs are a no-op.
    pub fn remove(&self, jid: &str) {
        self.contacts.remove(jid);
    }

    /// Snapshot of all contacts sorted by extension.
    pub fn snapshot(&self) -> Vec<Contact> {
        let mut list: Vec<Contact> = self
            .contacts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        list.sort_by(|a, b| a.ext.cmp(&b.ext));
        list
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(jid: &str, ext: &str) -> Contact {
        Contact {
            jid: jid.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            ext: ext.to_string(),
            cell_phone: String::new(),
            email: String::new(),
        }
    }

    #[test]
    fn test_upsert_is_keyed_by_jid() {
        let book = AddressBook::new();
        book.upsert(contact("u-1", "3052"));
        book.upsert(contact("u-1", "3060"));

        assert_eq!(book.len(), 1);
        assert_eq!(book.snapshot()[0].ext, "3060");
    }

    #[test]
    fn test_remove() {
        let book = AddressBook::new();
        book.upsert(contact("u-1", "3052"));
        book.remove("u-1");
        book.remove("u-1");
        assert!(book.is_empty());
    }

    #[test]
    fn test_snapshot_sorted_by_ext() {
        let book = AddressBook::new();
        book.upsert(contact("u-3", "3090"));
        book.upsert(contact("u-1", "3052"));
        book.upsert(contact("u-2", "3060"));

        let exts: Vec<String> = book.snapshot().into_iter().map(|c| c.ext).collect();
        assert_eq!(exts, ["3052", "3060", "3090"]);
    }

    #[test]
    fn test_contact_json_field_names() {
        let json = serde_json::to_value(contact("u-1", "3052")).unwrap();
        assert!(json.get("jid").is_some());
        assert!(json.get("firstName").is_some());
        assert!(json.get("lastName").is_some());
        assert!(json.get("ext").is_some());
        assert!(json.get("cellPhone").is_some());
        assert!(json.get("email").is_some());
    }
}
