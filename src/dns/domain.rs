//! Domains: a named zone, its ordered host records and its tenant ACL

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::dns::errors::{ConfError, Result};
use crate::dns::host::Host;
use crate::dns::identifiers::{DomainName, Uuid};
use crate::dns::zone_file;

/// Interval after which the DNS server re-reads a hosts file
pub const RELOAD_INTERVAL: &str = "10s";

/// Random jitter added to [`RELOAD_INTERVAL`]
pub const RELOAD_JITTER: &str = "5s";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Domain {
    pub uuid: Uuid,
    #[serde(rename = "domain")]
    pub name: DomainName,
    pub hosts: Vec<Host>,
    pub tenants: Vec<Uuid>,
}

impl Domain {
    /// Create a brand new domain with a random uuid and no hosts
    pub fn new_original<S: AsRef<str>>(name: &str, tenants: &[S]) -> Result<Domain> {
        let mut domain = Domain::new_empty(Uuid::random(), name)?;
        domain.tenants = parse_tenants(tenants)?;
        Ok(domain)
    }

    pub fn new_empty(uuid: Uuid, name: &str) -> Result<Domain> {
        Ok(Domain {
            uuid,
            name: DomainName::new(name)?,
            hosts: Vec::new(),
            tenants: Vec::new(),
        })
    }

    /// Parse the zone file of the domain called `name`
    pub fn parse(name: &str, zone_file: &str) -> Result<Domain> {
        zone_file::parse(name, zone_file)
    }

    /// Zone file text for this domain
    pub fn to_zone_file(&self) -> String {
        zone_file::serialize(self)
    }

    /// Location of this domain's zone file inside `hosts_dir`
    pub fn file_path(&self, hosts_dir: &Path) -> PathBuf {
        hosts_dir.join(self.name.as_str())
    }

    pub fn reload_interval(&self) -> &'static str {
        RELOAD_INTERVAL
    }

    pub fn reload_jitter(&self) -> &'static str {
        RELOAD_JITTER
    }

    pub fn has_tenant(&self, tenant: &Uuid) -> bool {
        self.tenants.iter().any(|t| t == tenant)
    }

    pub fn set_tenants(&mut self, tenants: Vec<Uuid>) {
        self.tenants = tenants;
    }

    pub fn find_host(&self, uuid: &Uuid) -> Result<&Host> {
        self.hosts
            .iter()
            .find(|h| h.uuid() == uuid)
            .ok_or_else(|| ConfError::HostNotFound(uuid.to_string()))
    }

    /// Append a host. Names and addresses are unique within the domain.
    pub fn add_host(&mut self, host: Host) -> Result<()> {
        if let Some(existing) = self.conflicting_host(&host, None) {
            return Err(ConfError::HostDuplicated(format!(
                "{} ({}) conflicts with {} ({})",
                host.name(),
                host.address(),
                existing.name(),
                existing.address()
            )));
        }

        self.hosts.push(host);
        Ok(())
    }

    /// Replace the host carrying the same uuid, keeping its position
    pub fn update_host(&mut self, host: Host) -> Result<()> {
        let position = self.position(host.uuid())?;

        if let Some(existing) = self.conflicting_host(&host, Some(host.uuid())) {
            return Err(ConfError::HostDuplicated(format!(
                "{} ({}) conflicts with {} ({})",
                host.name(),
                host.address(),
                existing.name(),
                existing.address()
            )));
        }

        self.hosts[position] = host;
        Ok(())
    }

    /// Remove and return the host with `uuid`; the rest keep their order
    pub fn delete_host(&mut self, uuid: &Uuid) -> Result<Host> {
        let position = self.position(uuid)?;
        Ok(self.hosts.remove(position))
    }

    fn position(&self, uuid: &Uuid) -> Result<usize> {
        self.hosts
            .iter()
            .position(|h| h.uuid() == uuid)
            .ok_or_else(|| ConfError::HostNotFound(uuid.to_string()))
    }

    fn conflicting_host(&self, host: &Host, ignore: Option<&Uuid>) -> Option<&Host> {
        self.hosts.iter().find(|existing| {
            Some(existing.uuid()) != ignore
                && (existing.name() == host.name() || existing.address() == host.address())
        })
    }
}

/// Validate a list of raw tenant ids
pub fn parse_tenants<S: AsRef<str>>(tenants: &[S]) -> Result<Vec<Uuid>> {
    let mut parsed: Vec<Uuid> = Vec::with_capacity(tenants.len());
    for tenant in tenants {
        let uuid = Uuid::new(tenant.as_ref())?;
        if !parsed.contains(&uuid) {
            parsed.push(uuid);
        }
    }
    Ok(parsed)
}
