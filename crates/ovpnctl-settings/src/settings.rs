//! In-memory settings document

use crate::schema::{self, CLIENTS_KEY};
use crate::value::{Value, LIST_DELIMITER};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// A named client identity in the certificate registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    /// Opaque generator-assigned id, also the element name on disk
    #[serde(skip)]
    pub id: String,
    /// Unique human-chosen name, equal to the certificate common name
    pub name: String,
    /// Delimited list of authorized OS account names (may be empty)
    #[serde(serialize_with = "serialize_users")]
    pub users: String,
}

impl Client {
    /// Authorized users as a list; an empty field is an empty list
    pub fn user_list(&self) -> Vec<String> {
        if self.users.is_empty() {
            Vec::new()
        } else {
            self.users.split(LIST_DELIMITER).map(str::to_string).collect()
        }
    }
}

fn serialize_users<S: serde::Serializer>(users: &str, s: S) -> Result<S::Ok, S::Error> {
    let list: Vec<&str> = if users.is_empty() {
        Vec::new()
    } else {
        users.split(LIST_DELIMITER).collect()
    };
    list.serialize(s)
}

/// The full settings mapping plus the client registry and header comment
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    header: Option<String>,
    /// Document order; new keys go to the end
    options: IndexMap<String, Value>,
    clients: BTreeMap<String, Client>,
}

impl Settings {
    /// Empty document with no header and no options
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh document holding the full default schema
    pub fn with_defaults() -> Self {
        let mut settings = Self {
            header: Some(schema::DEFAULT_HEADER.to_string()),
            ..Default::default()
        };
        settings.backfill_defaults();
        settings
    }

    /// Add every default-schema key that is missing; returns the keys added
    pub fn backfill_defaults(&mut self) -> Vec<&'static str> {
        let mut added = Vec::new();
        for (key, value) in schema::defaults() {
            if !self.options.contains_key(key) {
                self.options.insert(key.to_string(), value);
                added.push(key);
            }
        }
        added
    }

    /// Leading comment block, if any
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Replace the leading comment block
    pub fn set_header(&mut self, header: Option<String>) {
        self.header = header;
    }

    /// Whether an option is present
    pub fn contains(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Raw typed value of an option
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Store an option; lists are flattened to their delimited text form
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.options.insert(key.to_string(), value.into().flatten());
    }

    /// Iterate over all scalar options in document order
    pub fn options(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Boolean view of an option; missing options read as false
    pub fn flag(&self, key: &str) -> bool {
        self.options.get(key).map(Value::as_bool).unwrap_or(false)
    }

    /// Text view of an option; missing options read as empty
    pub fn text(&self, key: &str) -> String {
        self.options.get(key).map(Value::as_text).unwrap_or_default()
    }

    /// Integer view of an option, when it holds one
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.options.get(key)? {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// List view of an option; missing or empty options read as an empty list
    pub fn list(&self, key: &str) -> Vec<String> {
        self.options.get(key).map(Value::split_list).unwrap_or_default()
    }

    // ─── Client registry ─────────────────────────────────────────────────

    /// All clients keyed by id
    pub fn clients(&self) -> &BTreeMap<String, Client> {
        &self.clients
    }

    /// Look up a client by its unique name
    pub fn client_by_name(&self, name: &str) -> Option<&Client> {
        self.clients.values().find(|c| c.name == name)
    }

    /// Mutable lookup of a client by its unique name
    pub fn client_by_name_mut(&mut self, name: &str) -> Option<&mut Client> {
        self.clients.values_mut().find(|c| c.name == name)
    }

    /// Whether a client id is taken
    pub fn has_client_id(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    /// Insert a client under its id
    pub fn insert_client(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove the client with `name`, returning it
    pub fn remove_client_by_name(&mut self, name: &str) -> Option<Client> {
        let id = self.client_by_name(name)?.id.clone();
        self.clients.remove(&id)
    }

    /// Drop every client entry
    pub fn clear_clients(&mut self) {
        self.clients.clear();
    }

    /// Whether `key` names the client registry rather than a scalar option
    pub fn is_registry_key(key: &str) -> bool {
        key == CLIENTS_KEY
    }
}
