//! Domain, host and tenant operations on top of the cache
//!
//! Every mutating operation follows the same write path while holding the
//! cache guard: mutate the map, render the zone file and the Corefile,
//! persist the zone file, then persist the Corefile. When the Corefile cannot
//! be written the zone file is put back the way it was; whatever happens on
//! disk, a failed operation leaves the map as it found it.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::dns::conf_store::{ConfGuard, ConfStore};
use crate::dns::context::TenantMode;
use crate::dns::domain::{parse_tenants, Domain};
use crate::dns::errors::{ConfError, Result};
use crate::dns::filesystem::Filesystem;
use crate::dns::host::Host;
use crate::dns::identifiers::{DomainName, Uuid};
use crate::dns::metrics;

/// A tenant and the domains it may access
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TenantDomains {
    pub tenant: Uuid,
    pub domains: Vec<Uuid>,
}

enum ZoneChange {
    Upsert(Domain),
    Remove(Domain),
}

impl ZoneChange {
    fn domain(&self) -> &Domain {
        match self {
            ZoneChange::Upsert(domain) | ZoneChange::Remove(domain) => domain,
        }
    }
}

/// Rendered output of a change, produced before anything touches disk
struct PendingWrite {
    zone_path: PathBuf,
    zone_text: Option<String>,
    corefile: String,
}

#[derive(Clone)]
pub struct ConfRepository {
    store: Arc<ConfStore>,
    filesystem: Arc<dyn Filesystem>,
    tenant_mode: TenantMode,
}

impl ConfRepository {
    pub fn new(
        store: Arc<ConfStore>,
        filesystem: Arc<dyn Filesystem>,
        tenant_mode: TenantMode,
    ) -> ConfRepository {
        ConfRepository {
            store,
            filesystem,
            tenant_mode,
        }
    }

    /// Parse every zone file in `hosts_dir`.
    ///
    /// With `strict` set the first unreadable or malformed file, or one
    /// reusing the uuid of an earlier file, aborts the load; otherwise such
    /// files are logged and skipped.
    pub fn load_domains(
        filesystem: &dyn Filesystem,
        hosts_dir: &Path,
        strict: bool,
    ) -> Result<Vec<Domain>> {
        let mut domains = Vec::new();
        let mut owners: BTreeMap<Uuid, DomainName> = BTreeMap::new();

        for filename in filesystem.list_filenames(hosts_dir)? {
            let result = load_zone_file(filesystem, hosts_dir, &filename).and_then(|domain| {
                match owners.get(&domain.uuid) {
                    Some(owner) => Err(ConfError::ServerSide(format!(
                        "domain UUID {} of {} is already used by {}",
                        domain.uuid, domain.name, owner
                    ))),
                    None => Ok(domain),
                }
            });

            match result {
                Ok(domain) => {
                    log::info!(
                        "Loaded zone {} ({}) with {} hosts",
                        domain.name,
                        domain.uuid,
                        domain.hosts.len()
                    );
                    owners.insert(domain.uuid.clone(), domain.name.clone());
                    domains.push(domain);
                }
                Err(e) if strict => {
                    log::error!("Failed to load zone file {}: {}", filename, e);
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("Skipping zone file {}: {}", filename, e);
                }
            }
        }

        Ok(domains)
    }

    pub fn store(&self) -> &Arc<ConfStore> {
        &self.store
    }

    pub fn tenant_mode(&self) -> TenantMode {
        self.tenant_mode
    }

    /// Create a new, empty domain owned by `tenants`
    pub fn create_domain<S: AsRef<str>>(&self, name: &str, tenants: &[S]) -> Result<Domain> {
        let domain = Domain::new_original(name, tenants)?;
        self.check_tenants(&domain.tenants)?;

        let mut guard = self.store.lock();
        if guard.contains(&domain.name) {
            return Err(ConfError::DomainDuplicated(domain.name.to_string()));
        }
        check_uuid_owner(&guard, &domain)?;

        self.commit(&mut guard, "create_domain", ZoneChange::Upsert(domain.clone()))?;
        Ok(domain)
    }

    /// Store `domain`, replacing any cached domain of the same name. The
    /// uuid must not belong to a domain with another name.
    pub fn add_domain(&self, domain: Domain) -> Result<()> {
        let mut guard = self.store.lock();
        check_uuid_owner(&guard, &domain)?;
        self.commit(&mut guard, "add_domain", ZoneChange::Upsert(domain))
    }

    /// Look a domain up by uuid. `tenant` is checked against the domain's
    /// ACL; `None` skips the check.
    pub fn get_domain(&self, uuid: &Uuid, tenant: Option<&Uuid>) -> Result<Domain> {
        let guard = self.store.lock();
        lookup(&guard, uuid, tenant)
    }

    /// Domains visible to `tenant`, or every domain for `None`
    pub fn list_domains(&self, tenant: Option<&Uuid>) -> Vec<Domain> {
        let guard = self.store.lock();
        match tenant {
            Some(tenant) => guard.get_tenant_all(tenant),
            None => guard.get_all(),
        }
    }

    pub fn delete_domain(&self, uuid: &Uuid, tenant: Option<&Uuid>) -> Result<Domain> {
        let mut guard = self.store.lock();
        let domain = lookup(&guard, uuid, tenant)?;
        self.commit(&mut guard, "delete_domain", ZoneChange::Remove(domain.clone()))?;
        Ok(domain)
    }

    /// Return the cached domain called `name`, reading its zone file into
    /// the cache when it is not there yet
    pub fn load_domain(&self, name: &str) -> Result<Domain> {
        let name = DomainName::new(name)?;
        let mut guard = self.store.lock();
        if let Ok(domain) = guard.get(&name) {
            return Ok(domain);
        }

        let domain = load_zone_file(self.filesystem.as_ref(), guard.hosts_dir(), name.as_str())
            .map_err(|e| match e {
                ConfError::Io(ref err) if err.kind() == io::ErrorKind::NotFound => {
                    ConfError::DomainNotFound(name.to_string())
                }
                e => e,
            })?;

        check_uuid_owner(&guard, &domain)?;

        // The zone file is already on disk; only the Corefile changes
        guard.add(domain.clone());
        let result = guard
            .get_file_info()
            .and_then(|corefile| Ok(self.filesystem.write_text_file(guard.conf_path(), &corefile)?));
        if let Err(e) = result {
            log::error!("Failed to publish loaded zone {}: {}", name, e);
            guard.restore(&name, None);
            metrics::record_commit("load_domain", false);
            return Err(e);
        }

        log::info!("Loaded zone {} ({}) on demand", domain.name, domain.uuid);
        metrics::record_commit("load_domain", true);
        metrics::set_domain_count(guard.len());
        Ok(domain)
    }

    /// Replace the tenant ACL of a domain
    pub fn update_tenants<S: AsRef<str>>(
        &self,
        uuid: &Uuid,
        tenant: Option<&Uuid>,
        tenants: &[S],
    ) -> Result<Domain> {
        let tenants = parse_tenants(tenants)?;
        self.check_tenants(&tenants)?;

        let mut guard = self.store.lock();
        let mut domain = lookup(&guard, uuid, tenant)?;
        domain.set_tenants(tenants);
        self.commit(&mut guard, "update_tenants", ZoneChange::Upsert(domain.clone()))?;
        Ok(domain)
    }

    /// Every tenant with the uuids of the domains it may access
    pub fn list_tenants(&self) -> Vec<TenantDomains> {
        let domains = self.store.lock().get_all();

        let mut tenants: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
        for domain in &domains {
            for tenant in &domain.tenants {
                tenants
                    .entry(tenant.clone())
                    .or_default()
                    .push(domain.uuid.clone());
            }
        }

        tenants
            .into_iter()
            .map(|(tenant, mut domains)| {
                domains.sort();
                domains.dedup();
                TenantDomains { tenant, domains }
            })
            .collect()
    }

    /// Append `host` to a domain and persist it
    pub fn add_host(&self, domain_uuid: &Uuid, tenant: Option<&Uuid>, host: Host) -> Result<Domain> {
        let mut guard = self.store.lock();
        let mut domain = lookup(&guard, domain_uuid, tenant)?;
        domain.add_host(host)?;
        self.commit(&mut guard, "add_host", ZoneChange::Upsert(domain.clone()))?;
        Ok(domain)
    }

    pub fn get_host(&self, domain_uuid: &Uuid, tenant: Option<&Uuid>, host_uuid: &Uuid) -> Result<Host> {
        let guard = self.store.lock();
        let domain = lookup(&guard, domain_uuid, tenant)?;
        domain.find_host(host_uuid).map(Host::clone)
    }

    /// Change the name and/or address of a host; `None` keeps the current value
    pub fn update_host(
        &self,
        domain_uuid: &Uuid,
        tenant: Option<&Uuid>,
        host_uuid: &Uuid,
        name: Option<&str>,
        address: Option<&str>,
    ) -> Result<Host> {
        let mut guard = self.store.lock();
        let mut domain = lookup(&guard, domain_uuid, tenant)?;
        let updated = domain.find_host(host_uuid)?.with_changes(name, address)?;
        domain.update_host(updated.clone())?;
        self.commit(&mut guard, "update_host", ZoneChange::Upsert(domain))?;
        Ok(updated)
    }

    pub fn delete_host(&self, domain_uuid: &Uuid, tenant: Option<&Uuid>, host_uuid: &Uuid) -> Result<Host> {
        let mut guard = self.store.lock();
        let mut domain = lookup(&guard, domain_uuid, tenant)?;
        let removed = domain.delete_host(host_uuid)?;
        self.commit(&mut guard, "delete_host", ZoneChange::Upsert(domain))?;
        Ok(removed)
    }

    /// Corefile text for the current cache contents
    pub fn render_corefile(&self) -> Result<String> {
        self.store.lock().get_file_info()
    }

    /// Regenerate the Corefile on disk from the cache
    pub fn write_corefile(&self) -> Result<()> {
        let guard = self.store.lock();
        let corefile = guard.get_file_info()?;
        let result = self.filesystem.write_text_file(guard.conf_path(), &corefile);
        metrics::record_commit("write_corefile", result.is_ok());
        result?;

        log::info!(
            "Wrote {} with {} domains",
            guard.conf_path().display(),
            guard.len()
        );
        Ok(())
    }

    fn check_tenants(&self, tenants: &[Uuid]) -> Result<()> {
        if self.tenant_mode == TenantMode::Scoped && tenants.is_empty() {
            return Err(ConfError::invalid("at least one tenant is required"));
        }
        Ok(())
    }

    /// Run the write path for `change`. On error the map is back to its
    /// previous state.
    fn commit(&self, guard: &mut ConfGuard<'_>, operation: &str, change: ZoneChange) -> Result<()> {
        let name = change.domain().name.clone();
        let previous = match &change {
            ZoneChange::Upsert(domain) => guard.add(domain.clone()),
            ZoneChange::Remove(domain) => guard.delete(&domain.name),
        };

        let result = self.write(guard, &change, previous.as_ref());

        match &result {
            Ok(()) => log::info!(
                "{}: committed {} ({})",
                operation,
                name,
                change.domain().uuid
            ),
            Err(e) => {
                log::error!("{}: failed to commit {}: {}", operation, name, e);
                guard.restore(&name, previous);
            }
        }

        metrics::record_commit(operation, result.is_ok());
        metrics::set_domain_count(guard.len());
        result
    }

    fn write(&self, guard: &ConfGuard<'_>, change: &ZoneChange, previous: Option<&Domain>) -> Result<()> {
        let pending = self.render(guard, change)?;
        self.persist(guard, &pending, previous)
    }

    fn render(&self, guard: &ConfGuard<'_>, change: &ZoneChange) -> Result<PendingWrite> {
        let zone_text = match change {
            ZoneChange::Upsert(domain) => Some(domain.to_zone_file()),
            ZoneChange::Remove(_) => None,
        };

        Ok(PendingWrite {
            zone_path: change.domain().file_path(guard.hosts_dir()),
            zone_text,
            corefile: guard.get_file_info()?,
        })
    }

    fn persist(&self, guard: &ConfGuard<'_>, pending: &PendingWrite, previous: Option<&Domain>) -> Result<()> {
        match &pending.zone_text {
            Some(text) => self.filesystem.write_text_file(&pending.zone_path, text)?,
            None => self.remove_file(&pending.zone_path)?,
        }

        if let Err(e) = self.filesystem.write_text_file(guard.conf_path(), &pending.corefile) {
            log::error!(
                "Failed to write {}: {}",
                guard.conf_path().display(),
                e
            );
            return Err(self.compensate(&pending.zone_path, previous, e.into()));
        }

        Ok(())
    }

    /// Put the zone file back to `previous` after a failed Corefile write
    fn compensate(&self, zone_path: &Path, previous: Option<&Domain>, original: ConfError) -> ConfError {
        let result = match previous {
            Some(domain) => self
                .filesystem
                .write_text_file(zone_path, &domain.to_zone_file()),
            None => self.remove_file(zone_path),
        };
        metrics::record_compensation(result.is_ok());

        match result {
            Ok(()) => {
                log::warn!("Restored {} after failed Corefile write", zone_path.display());
                original
            }
            Err(e) => {
                log::error!(
                    "Failed to restore {}: {}; zone file and Corefile disagree",
                    zone_path.display(),
                    e
                );
                ConfError::Unrecoverable {
                    original: Box::new(original),
                    compensation: Box::new(e.into()),
                }
            }
        }
    }

    /// Delete a file, treating an already missing one as done
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        match self.filesystem.delete_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("{} was already gone", path.display());
                Ok(())
            }
            result => result,
        }
    }
}

fn lookup(guard: &ConfGuard<'_>, uuid: &Uuid, tenant: Option<&Uuid>) -> Result<Domain> {
    match tenant {
        Some(tenant) => guard.get_by_uuid(uuid, tenant),
        None => guard.find_by_uuid(uuid),
    }
}

/// Fail when `domain.uuid` already names a cached domain other than `domain`
fn check_uuid_owner(guard: &ConfGuard<'_>, domain: &Domain) -> Result<()> {
    match guard.find_by_uuid(&domain.uuid) {
        Ok(owner) if owner.name != domain.name => Err(ConfError::DomainDuplicated(format!(
            "{} (uuid {} belongs to {})",
            domain.name, domain.uuid, owner.name
        ))),
        _ => Ok(()),
    }
}

fn load_zone_file(filesystem: &dyn Filesystem, hosts_dir: &Path, filename: &str) -> Result<Domain> {
    let result = filesystem
        .load_text_file(&hosts_dir.join(filename))
        .map_err(ConfError::from)
        .and_then(|content| Domain::parse(filename, &content));

    metrics::record_zone_load(result.is_ok());
    result
}
