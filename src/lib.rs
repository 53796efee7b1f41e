//! CoreDNS API
//!
//! Multi-tenant management of CoreDNS `hosts` zones.
//!
//! # Features
//!
//! * Domains with ordered IPv4 host records and a tenant access list
//! * One zone file per domain, in the format read by the CoreDNS `hosts` plugin
//! * Deterministic Corefile generation
//! * A single locked cache; every change is persisted before the lock is released
//! * Atomic file replacement, with rollback of the zone file when the
//!   Corefile cannot be written
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use coredns_api::dns::context::{ConfConfig, ConfContext};
//! use coredns_api::dns::filesystem::LocalFilesystem;
//!
//! let mut config = ConfConfig::default();
//! config.apply_env().unwrap();
//!
//! let context = ConfContext::new(config, Arc::new(LocalFilesystem::new())).unwrap();
//! let domain = context
//!     .repository()
//!     .create_domain("hogehoge.hoge", &["5cdc62c5-a110-4d89-9cdd-5e19f1983f0f"])
//!     .unwrap();
//! println!("created {}", domain.uuid);
//! ```

/// Zone and Corefile management
pub mod dns;
