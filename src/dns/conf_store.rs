//! In-memory authoritative cache of domains
//!
//! Every read and write of the cache goes through a [`ConfGuard`], obtained
//! from [`ConfStore::lock`]. The guard is the critical section: the whole map
//! and the Corefile rendering share one mutex, so operations on unrelated
//! domains still serialize against each other. Releasing happens when the
//! guard is dropped, on every exit path.
//!
//! There is no way to touch the cache without holding the guard:
//!
//! ```compile_fail
//! # use coredns_api::dns::conf_store::ConfStore;
//! fn peek(store: &ConfStore) {
//!     let _ = store.get_all();
//! }
//! ```
//!
//! Code that needs several cache operations in one critical section takes
//! `&mut ConfGuard` instead of locking again; the mutex is not re-entrant.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::dns::corefile::CorefileGenerator;
use crate::dns::domain::Domain;
use crate::dns::errors::{ConfError, Result};
use crate::dns::identifiers::{DomainName, Uuid};

struct ConfState {
    domains: BTreeMap<DomainName, Domain>,
    generator: CorefileGenerator,
    conf_path: PathBuf,
}

pub struct ConfStore {
    state: Mutex<ConfState>,
}

impl ConfStore {
    pub fn new(generator: CorefileGenerator, conf_path: &Path) -> ConfStore {
        ConfStore::with_domains(Vec::new(), generator, conf_path)
    }

    /// Build a store already holding `domains`. Later entries win on
    /// duplicate names.
    pub fn with_domains(
        domains: Vec<Domain>,
        generator: CorefileGenerator,
        conf_path: &Path,
    ) -> ConfStore {
        let domains = domains
            .into_iter()
            .map(|domain| (domain.name.clone(), domain))
            .collect();

        ConfStore {
            state: Mutex::new(ConfState {
                domains,
                generator,
                conf_path: conf_path.to_path_buf(),
            }),
        }
    }

    /// Enter the critical section, blocking until it is free
    pub fn lock(&self) -> ConfGuard<'_> {
        ConfGuard {
            state: self.state.lock(),
        }
    }

    /// Like [`ConfStore::lock`] but gives up after `timeout`
    pub fn try_lock_for(&self, timeout: Duration) -> Option<ConfGuard<'_>> {
        self.state
            .try_lock_for(timeout)
            .map(|state| ConfGuard { state })
    }
}

/// Scoped access to the cache. Reads hand out deep copies, so nothing
/// observed through a guard can change after the guard is released.
pub struct ConfGuard<'a> {
    state: MutexGuard<'a, ConfState>,
}

impl<'a> ConfGuard<'a> {
    pub fn get(&self, name: &DomainName) -> Result<Domain> {
        self.state
            .domains
            .get(name)
            .cloned()
            .ok_or_else(|| ConfError::DomainNotFound(name.to_string()))
    }

    /// Look a domain up by uuid on behalf of `tenant`
    pub fn get_by_uuid(&self, uuid: &Uuid, tenant: &Uuid) -> Result<Domain> {
        let domain = self.lookup_uuid(uuid)?;
        if !domain.has_tenant(tenant) {
            return Err(ConfError::DomainPermission {
                domain: uuid.to_string(),
                tenant: tenant.to_string(),
            });
        }

        Ok(domain.clone())
    }

    /// Look a domain up by uuid without any tenant check
    pub fn find_by_uuid(&self, uuid: &Uuid) -> Result<Domain> {
        self.lookup_uuid(uuid).map(Domain::clone)
    }

    /// Insert or replace the entry for `domain.name`, returning the replaced one
    pub fn add(&mut self, domain: Domain) -> Option<Domain> {
        log::debug!("caching domain {} ({})", domain.name, domain.uuid);
        self.state.domains.insert(domain.name.clone(), domain)
    }

    pub fn delete(&mut self, name: &DomainName) -> Option<Domain> {
        log::debug!("evicting domain {}", name);
        self.state.domains.remove(name)
    }

    /// Put the entry for `name` back to `previous` (remove it when `None`)
    pub fn restore(&mut self, name: &DomainName, previous: Option<Domain>) {
        match previous {
            Some(domain) => {
                self.state.domains.insert(name.clone(), domain);
            }
            None => {
                self.state.domains.remove(name);
            }
        }
    }

    pub fn contains(&self, name: &DomainName) -> bool {
        self.state.domains.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.state.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.domains.is_empty()
    }

    /// Snapshot of every domain, sorted by name
    pub fn get_all(&self) -> Vec<Domain> {
        self.state.domains.values().cloned().collect()
    }

    /// Snapshot of the domains `tenant` may access, sorted by name
    pub fn get_tenant_all(&self, tenant: &Uuid) -> Vec<Domain> {
        self.state
            .domains
            .values()
            .filter(|domain| domain.has_tenant(tenant))
            .cloned()
            .collect()
    }

    /// Render the Corefile for the current cache contents
    pub fn get_file_info(&self) -> Result<String> {
        self.state.generator.render(self.state.domains.values())
    }

    pub fn conf_path(&self) -> &Path {
        &self.state.conf_path
    }

    pub fn hosts_dir(&self) -> &Path {
        self.state.generator.hosts_dir()
    }

    fn lookup_uuid(&self, uuid: &Uuid) -> Result<&Domain> {
        self.state
            .domains
            .values()
            .find(|domain| &domain.uuid == uuid)
            .ok_or_else(|| ConfError::DomainNotFound(uuid.to_string()))
    }
}
