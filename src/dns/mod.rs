//! CoreDNS configuration management
//!
//! This module keeps a set of domains, their host records and tenant ACLs in
//! memory and mirrors them to disk:
//! * one zone file per domain, read by the CoreDNS `hosts` plugin
//! * a generated Corefile with one server block per domain
//!
//! # Module Structure
//!
//! * `identifiers` - validated uuid and domain name types
//! * `host` / `domain` - the data model and host mutation rules
//! * `zone_file` - zone file parser and serializer
//! * `corefile` - Corefile rendering
//! * `conf_store` - the locked in-memory cache
//! * `filesystem` - disk access behind a trait
//! * `repository` - the write path and every domain, host and tenant operation
//! * `context` - configuration and wiring

/// Validated identifiers: uuids and domain names
pub mod identifiers;

/// Host records
pub mod host;

/// Domains and host mutation
pub mod domain;

/// Zone file codec
pub mod zone_file;

/// Corefile generation
pub mod corefile;

/// Domain cache guarded by a scoped lock
pub mod conf_store;

/// Filesystem gateway with atomic writes
pub mod filesystem;

/// Domain, host and tenant operations with the persistence protocol
pub mod repository;

/// Configuration and shared context
pub mod context;

/// Error types for configuration management
pub mod errors;

/// Prometheus metrics collection and export
pub mod metrics;



#[cfg(test)]
mod repository_test;
