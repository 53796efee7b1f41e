//! Address records belonging to a domain

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::dns::errors::{ConfError, Result};
use crate::dns::identifiers::Uuid;

lazy_static! {
    static ref HOST_NAME_REGEX: Regex =
        Regex::new(r"^[0-9a-zA-Z._-]+$").expect("Failed to compile host name regex");
    static ref ADDRESS_REGEX: Regex =
        Regex::new(r"^[0-9.]+$").expect("Failed to compile address regex");
}

const MIN_ADDRESS_LENGTH: usize = 7;
const MAX_ADDRESS_LENGTH: usize = 15;

/// A single IPv4 address record. Immutable once built; updates replace the
/// whole value under the same uuid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
    uuid: Uuid,
    #[serde(rename = "hostname")]
    name: String,
    address: String,
}

impl Host {
    pub fn new(uuid: Uuid, name: &str, address: &str) -> Result<Host> {
        if name.is_empty() || !HOST_NAME_REGEX.is_match(name) {
            return Err(ConfError::invalid(format!(
                "invalid Host name is specified. name: {}",
                name
            )));
        }

        if !is_valid_address(address) {
            return Err(ConfError::invalid(format!(
                "invalid Host address is specified. address: {}",
                address
            )));
        }

        Ok(Host {
            uuid,
            name: name.to_string(),
            address: address.to_string(),
        })
    }

    /// Build a host with a freshly generated uuid
    pub fn new_original(name: &str, address: &str) -> Result<Host> {
        Host::new(Uuid::random(), name, address)
    }

    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Copy of this host with name and/or address replaced. The uuid is kept.
    pub fn with_changes(&self, name: Option<&str>, address: Option<&str>) -> Result<Host> {
        Host::new(
            self.uuid.clone(),
            name.unwrap_or(&self.name),
            address.unwrap_or(&self.address),
        )
    }
}

fn is_valid_address(address: &str) -> bool {
    address.len() >= MIN_ADDRESS_LENGTH
        && address.len() <= MAX_ADDRESS_LENGTH
        && address.matches('.').count() == 3
        && ADDRESS_REGEX.is_match(address)
}

/// Fully qualified name of `host` inside `domain`. Names that already end
/// with the domain are returned unchanged.
pub fn qualify(host: &str, domain: &str) -> String {
    let host = host.trim_end_matches('.');
    if host == domain || host.ends_with(&format!(".{}", domain)) {
        host.to_string()
    } else {
        format!("{}.{}", host, domain)
    }
}
