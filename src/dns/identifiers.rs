//! Validated identifier types shared by domains, hosts and tenants

use std::convert::TryFrom;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::dns::errors::{ConfError, Result};

lazy_static! {
    static ref DOMAIN_NAME_REGEX: Regex =
        Regex::new(r"^[0-9a-zA-Z.-]+$").expect("Failed to compile domain name regex");
}

const MAX_UUID_LENGTH: usize = 36;

/// Opaque identifier of a domain, host or tenant (1 to 36 characters)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Uuid(String);

impl Uuid {
    pub fn new(uuid: &str) -> Result<Uuid> {
        let length = uuid.chars().count();
        if length == 0 || length > MAX_UUID_LENGTH {
            return Err(ConfError::invalid(format!(
                "invalid UUID is specified (length {}): {}",
                length, uuid
            )));
        }

        // Zone files are line based and trim their fields
        if uuid.chars().any(char::is_control)
            || uuid.starts_with(char::is_whitespace)
            || uuid.ends_with(char::is_whitespace)
        {
            return Err(ConfError::invalid(format!(
                "UUID must not contain control characters or surrounding whitespace: {:?}",
                uuid
            )));
        }

        Ok(Uuid(uuid.to_string()))
    }

    /// Fresh random (v4) identifier
    pub fn random() -> Uuid {
        Uuid(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Uuid {
    type Error = ConfError;

    fn try_from(value: &str) -> Result<Self> {
        Uuid::new(value)
    }
}

/// Name of a zone. Doubles as the cache key and as the zone file name on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DomainName(String);

impl DomainName {
    pub fn new(name: &str) -> Result<DomainName> {
        if name.is_empty() || !DOMAIN_NAME_REGEX.is_match(name) {
            return Err(ConfError::invalid(format!(
                "invalid Domain name is specified. name: {}",
                name
            )));
        }

        // Leading dots would make "." / ".." path components or hidden files
        if name.starts_with('.') {
            return Err(ConfError::invalid(format!(
                "Domain name must not start with a dot. name: {}",
                name
            )));
        }

        Ok(DomainName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for DomainName {
    type Error = ConfError;

    fn try_from(value: &str) -> Result<Self> {
        DomainName::new(value)
    }
}
