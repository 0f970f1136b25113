//! Data model shared by every role
//!
//! Addresses are opaque text: `"10.0.0.1"` and `"10.000.0.1"` are different
//! addresses as far as reconciliation is concerned.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name a connector publishes its address under
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier, rejecting the empty string
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::invalid_input("identifier cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Textual network address, compared by string equality
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the text parses as an IPv4/IPv6 literal
    pub fn is_ip(&self) -> bool {
        self.0.parse::<IpAddr>().is_ok()
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Desired-state document: identifier -> address
///
/// Serialized as a flat JSON object of strings. Iteration order is the
/// identifier order, which keeps derived plans deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<Identifier, Address>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identifier: &Identifier) -> Option<&Address> {
        self.0.get(identifier)
    }

    /// Set the address for an identifier, returning the previous one
    pub fn insert(&mut self, identifier: Identifier, address: Address) -> Option<Address> {
        self.0.insert(identifier, address)
    }

    pub fn remove(&mut self, identifier: &Identifier) -> Option<Address> {
        self.0.remove(identifier)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Address)> {
        self.0.iter()
    }

    /// Identifiers currently mapped to `address`
    pub fn identifiers_for<'a>(
        &'a self,
        address: &'a Address,
    ) -> impl Iterator<Item = &'a Identifier> + 'a {
        self.0
            .iter()
            .filter(move |(_, a)| *a == address)
            .map(|(id, _)| id)
    }

    /// Parse a document from arbitrary JSON
    ///
    /// Anything other than an object of non-empty keys to string values is
    /// reported as [`Error::StoreMalformed`].
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(Error::store_malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        };

        let mut doc = Self::new();
        for (key, value) in map {
            let identifier = Identifier::new(key)
                .map_err(|_| Error::store_malformed("document contains an empty identifier"))?;
            let serde_json::Value::String(address) = value else {
                return Err(Error::store_malformed(format!(
                    "address for '{}' is {}, expected a string",
                    identifier,
                    json_kind(&value)
                )));
            };
            doc.insert(identifier, Address::new(address));
        }
        Ok(doc)
    }
}

impl FromIterator<(Identifier, Address)> for Document {
    fn from_iter<T: IntoIterator<Item = (Identifier, Address)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// The last document fully processed by the server role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Document that became the firewall baseline
    pub document: Document,
    /// When the pass that produced this checkpoint finished; `None` before the first pass
    pub applied_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// First-run checkpoint
    pub fn empty() -> Self {
        Self::default()
    }

    /// Checkpoint for a document applied just now
    pub fn applied(document: Document) -> Self {
        Self {
            document,
            applied_at: Some(Utc::now()),
        }
    }
}
