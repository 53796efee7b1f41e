//! Corefile generation
//!
//! Renders the aggregate CoreDNS configuration from the cached domains:
//!
//! ```text
//! hogehoge.hoge. {
//!     hosts /var/lib/coredns/hosts/hogehoge.hoge
//!     reload 10s 5s
//!     log
//! }
//!
//! . {
//!     forward . 8.8.8.8
//! }
//! ```

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;

use crate::dns::domain::Domain;
use crate::dns::errors::{ConfError, Result};

const DOMAIN_TEMPLATE_NAME: &str = "domain";
const FORWARD_TEMPLATE_NAME: &str = "forward";

const DOMAIN_TEMPLATE: &str = "{{name}}. {
    hosts {{file_path}}
    reload {{reload_interval}} {{reload_jitter}}
    log
}
";

const FORWARD_TEMPLATE: &str = ". {
    forward . {{forward}}
}";

pub const DEFAULT_FORWARD: &str = "8.8.8.8";

#[derive(Serialize)]
struct DomainBlock<'a> {
    name: &'a str,
    file_path: String,
    reload_interval: &'a str,
    reload_jitter: &'a str,
}

#[derive(Serialize)]
struct ForwardBlock<'a> {
    forward: &'a str,
}

/// Renders the Corefile. Domains must be passed in the order they should
/// appear; the store hands them over sorted by name.
pub struct CorefileGenerator {
    handlebars: Handlebars<'static>,
    hosts_dir: PathBuf,
    forward: String,
}

impl CorefileGenerator {
    pub fn new(hosts_dir: &Path, forward: &str) -> Result<CorefileGenerator> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(true);
        handlebars.register_template_string(DOMAIN_TEMPLATE_NAME, DOMAIN_TEMPLATE)?;
        handlebars.register_template_string(FORWARD_TEMPLATE_NAME, FORWARD_TEMPLATE)?;

        Ok(CorefileGenerator {
            handlebars,
            hosts_dir: hosts_dir.to_path_buf(),
            forward: forward.to_string(),
        })
    }

    pub fn hosts_dir(&self) -> &Path {
        &self.hosts_dir
    }

    pub fn forward(&self) -> &str {
        &self.forward
    }

    /// Render the whole file. Any block failing aborts the generation.
    pub fn render<'a, I>(&self, domains: I) -> Result<String>
    where
        I: IntoIterator<Item = &'a Domain>,
    {
        let mut conf = String::new();

        for domain in domains {
            conf.push_str(&self.render_domain(domain)?);
        }

        if !conf.is_empty() {
            conf.push('\n');
        }

        let forward = ForwardBlock {
            forward: &self.forward,
        };
        conf.push_str(&self.handlebars.render(FORWARD_TEMPLATE_NAME, &forward)?);

        Ok(conf)
    }

    fn render_domain(&self, domain: &Domain) -> Result<String> {
        let file_path = domain.file_path(&self.hosts_dir);
        let file_path = file_path.to_str().ok_or_else(|| {
            ConfError::ServerSide(format!(
                "zone file path of {} is not valid UTF-8",
                domain.name
            ))
        })?;

        let block = DomainBlock {
            name: domain.name.as_str(),
            file_path: file_path.to_string(),
            reload_interval: domain.reload_interval(),
            reload_jitter: domain.reload_jitter(),
        };

        self.handlebars.render(DOMAIN_TEMPLATE_NAME, &block).map_err(|e| {
            log::error!("Failed to render Corefile block for {}: {}", domain.name, e);
            ConfError::from(e)
        })
    }
}
