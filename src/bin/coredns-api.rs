//! CoreDNS API CLI Tool
//!
//! Command-line management of CoreDNS hosts zones: domains, host records,
//! tenant access lists and the generated Corefile.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use comfy_table::Table;
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use coredns_api::dns::context::{ConfConfig, ConfContext, TenantMode};
use coredns_api::dns::domain::Domain;
use coredns_api::dns::errors::{ConfError, ErrorKind};
use coredns_api::dns::filesystem::LocalFilesystem;
use coredns_api::dns::host::{qualify, Host};
use coredns_api::dns::identifiers::Uuid;
use coredns_api::dns::metrics;
use coredns_api::dns::repository::{ConfRepository, TenantDomains};

/// CoreDNS API - manage CoreDNS hosts zones from the command line
#[derive(Parser)]
#[command(name = "coredns-api")]
#[command(version)]
#[command(about = "Manage CoreDNS hosts zones and the generated Corefile", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "COREDNS_API_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the zone files
    #[arg(long)]
    hosts_dir: Option<PathBuf>,

    /// Path of the generated Corefile
    #[arg(long)]
    conf_path: Option<PathBuf>,

    /// Act on behalf of this tenant; without it every domain is reachable
    #[arg(short, long, env = "COREDNS_API_TENANT")]
    tenant: Option<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// No color output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Table,
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage domains
    Domain {
        #[command(subcommand)]
        action: DomainCommands,
    },

    /// Manage host records
    Host {
        #[command(subcommand)]
        action: HostCommands,
    },

    /// Inspect tenants
    Tenant {
        #[command(subcommand)]
        action: TenantCommands,
    },

    /// Inspect or regenerate the Corefile
    Corefile {
        #[command(subcommand)]
        action: CorefileCommands,
    },

    /// Print metrics in Prometheus text format
    Metrics,
}

#[derive(Subcommand)]
enum DomainCommands {
    /// List domains
    List,

    /// Show a domain and its hosts
    Get {
        /// Domain uuid
        domain: String,
    },

    /// Create an empty domain
    Create {
        /// Domain name, e.g. hogehoge.hoge
        name: String,
        /// Tenants allowed to access the domain
        tenants: Vec<String>,
    },

    /// Delete a domain and its zone file
    Delete {
        /// Domain uuid
        domain: String,
    },

    /// Replace the tenant list of a domain
    Tenants {
        /// Domain uuid
        domain: String,
        /// New tenant list
        tenants: Vec<String>,
    },

    /// Read a zone file that is not cached yet
    Load {
        /// Domain name
        name: String,
    },
}

#[derive(Subcommand)]
enum HostCommands {
    /// Add a host record
    Add {
        /// Domain uuid
        domain: String,
        /// Host name; relative names are qualified with the domain
        name: String,
        /// IPv4 address
        address: String,
    },

    /// Show a host record
    Get {
        /// Domain uuid
        domain: String,
        /// Host uuid
        host: String,
    },

    /// Change the name and/or address of a host record
    Update {
        /// Domain uuid
        domain: String,
        /// Host uuid
        host: String,
        /// New host name
        #[arg(long)]
        name: Option<String>,
        /// New IPv4 address
        #[arg(long)]
        address: Option<String>,
    },

    /// Delete a host record
    Delete {
        /// Domain uuid
        domain: String,
        /// Host uuid
        host: String,
    },
}

#[derive(Subcommand)]
enum TenantCommands {
    /// List tenants and the domains they can access
    List,
}

#[derive(Subcommand)]
enum CorefileCommands {
    /// Print the Corefile for the current zones
    Render,

    /// Regenerate the Corefile on disk
    Write,
}

/// Output formatter
struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    fn new(format: OutputFormat, no_color: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format }
    }

    /// Print `data` as JSON or YAML, or as a table built from `rows`
    fn print<T, F>(&self, data: &T, rows: F) -> Result<(), ConfError>
    where
        T: Serialize,
        F: FnOnce(&T) -> Value,
    {
        match self.format {
            OutputFormat::Json => {
                let text = serde_json::to_string_pretty(data)
                    .map_err(|e| ConfError::ServerSide(e.to_string()))?;
                println!("{}", text);
            }
            OutputFormat::Yaml => {
                let text =
                    serde_yaml::to_string(data).map_err(|e| ConfError::ServerSide(e.to_string()))?;
                print!("{}", text);
            }
            OutputFormat::Table => self.print_table(&rows(data)),
        }
        Ok(())
    }

    fn print_table(&self, data: &Value) {
        let mut table = Table::new();

        if let Some(array) = data.as_array() {
            if let Some(first) = array.first().and_then(|v| v.as_object()) {
                let headers: Vec<String> = first.keys().cloned().collect();
                table.set_header(&headers);

                for item in array {
                    if let Some(obj) = item.as_object() {
                        let row: Vec<String> = headers
                            .iter()
                            .map(|h| obj.get(h).map(value_to_string).unwrap_or_default())
                            .collect();
                        table.add_row(row);
                    }
                }
            }
        } else if let Some(obj) = data.as_object() {
            table.set_header(vec!["Key", "Value"]);
            for (key, value) in obj {
                table.add_row(vec![key.clone(), value_to_string(value)]);
            }
        }

        println!("{}", table);
    }

    fn print_success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    fn print_error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        _ => value.to_string(),
    }
}

fn domain_row(domain: &Domain) -> Value {
    json!({
        "uuid": domain.uuid.as_str(),
        "domain": domain.name.as_str(),
        "hosts": domain.hosts.len(),
        "tenants": domain.tenants.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
    })
}

fn host_rows(hosts: &[Host]) -> Value {
    Value::Array(
        hosts
            .iter()
            .map(|host| {
                json!({
                    "uuid": host.uuid().as_str(),
                    "hostname": host.name(),
                    "address": host.address(),
                })
            })
            .collect(),
    )
}

fn tenant_rows(tenants: &[TenantDomains]) -> Value {
    Value::Array(
        tenants
            .iter()
            .map(|t| {
                json!({
                    "tenant": t.tenant.as_str(),
                    "domains": t.domains.iter().map(|d| d.as_str()).collect::<Vec<_>>(),
                })
            })
            .collect(),
    )
}

/// Exit status for a failed command
fn exit_code(error: &ConfError) -> i32 {
    match error.kind() {
        ErrorKind::ServerSide => 1,
        ErrorKind::InvalidParameter => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::PermissionDenied => 4,
        ErrorKind::Duplicated => 5,
        ErrorKind::Unrecoverable => 70,
    }
}

fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("Warning: Tracing subscriber already initialized: {}", e);
    }
}

/// Defaults, then the config file, then the environment, then flags
fn load_config(cli: &Cli) -> Result<ConfConfig, ConfError> {
    let mut config = match &cli.config {
        Some(path) => ConfConfig::from_file(path)?,
        None => ConfConfig::default(),
    };
    config.apply_env()?;

    if let Some(hosts_dir) = &cli.hosts_dir {
        config.hosts_dir = hosts_dir.clone();
    }
    if let Some(conf_path) = &cli.conf_path {
        config.conf_path = conf_path.clone();
    }

    Ok(config)
}

fn main() {
    let cli = Cli::parse();
    let formatter = OutputFormatter::new(cli.output, cli.no_color);

    if let Err(e) = run(cli, &formatter) {
        formatter.print_error(&e.to_string());
        process::exit(exit_code(&e));
    }
}

fn run(cli: Cli, formatter: &OutputFormatter) -> Result<(), ConfError> {
    let config = load_config(&cli)?;
    init_logging(&config.log_level, cli.verbose);
    tracing::debug!(
        hosts_dir = %config.hosts_dir.display(),
        conf_path = %config.conf_path.display(),
        tenant_mode = %config.tenant_mode,
        "configuration loaded"
    );
    if config.tenant_mode == TenantMode::Legacy {
        tracing::warn!("tenant ACLs are optional in legacy mode");
    }

    let context = ConfContext::new(config, Arc::new(LocalFilesystem::new()))?;
    let repository = context.repository();
    let tenant = cli.tenant.as_deref().map(Uuid::new).transpose()?;

    match cli.command {
        Commands::Domain { action } => {
            handle_domain_commands(action, repository, tenant.as_ref(), formatter)
        }
        Commands::Host { action } => {
            handle_host_commands(action, repository, tenant.as_ref(), formatter)
        }
        Commands::Tenant { action } => match action {
            TenantCommands::List => {
                let tenants = repository.list_tenants();
                formatter.print(&tenants, |t| tenant_rows(t))
            }
        },
        Commands::Corefile { action } => match action {
            CorefileCommands::Render => {
                println!("{}", repository.render_corefile()?);
                Ok(())
            }
            CorefileCommands::Write => {
                repository.write_corefile()?;
                formatter.print_success(&format!(
                    "Wrote {}",
                    context.config().conf_path.display()
                ));
                Ok(())
            }
        },
        Commands::Metrics => {
            print!("{}", metrics::gather());
            Ok(())
        }
    }
}

fn handle_domain_commands(
    action: DomainCommands,
    repository: &ConfRepository,
    tenant: Option<&Uuid>,
    formatter: &OutputFormatter,
) -> Result<(), ConfError> {
    match action {
        DomainCommands::List => {
            let domains = repository.list_domains(tenant);
            formatter.print(&domains, |d| {
                Value::Array(d.iter().map(domain_row).collect())
            })
        }
        DomainCommands::Get { domain } => {
            let domain = repository.get_domain(&Uuid::new(&domain)?, tenant)?;
            formatter.print(&domain, |d| host_rows(&d.hosts))
        }
        DomainCommands::Create { name, tenants } => {
            let mut tenants = tenants;
            if tenants.is_empty() {
                if let Some(tenant) = tenant {
                    tenants.push(tenant.to_string());
                }
            }

            let domain = repository.create_domain(&name, &tenants)?;
            formatter.print_success(&format!("Created domain {} ({})", domain.name, domain.uuid));
            formatter.print(&domain, domain_row)
        }
        DomainCommands::Delete { domain } => {
            let domain = repository.delete_domain(&Uuid::new(&domain)?, tenant)?;
            formatter.print_success(&format!("Deleted domain {} ({})", domain.name, domain.uuid));
            Ok(())
        }
        DomainCommands::Tenants { domain, tenants } => {
            let domain = repository.update_tenants(&Uuid::new(&domain)?, tenant, &tenants)?;
            formatter.print_success(&format!("Updated tenants of {}", domain.name));
            formatter.print(&domain, domain_row)
        }
        DomainCommands::Load { name } => {
            let domain = repository.load_domain(&name)?;
            formatter.print(&domain, domain_row)
        }
    }
}

fn handle_host_commands(
    action: HostCommands,
    repository: &ConfRepository,
    tenant: Option<&Uuid>,
    formatter: &OutputFormatter,
) -> Result<(), ConfError> {
    match action {
        HostCommands::Add {
            domain,
            name,
            address,
        } => {
            let domain_uuid = Uuid::new(&domain)?;
            let domain = repository.get_domain(&domain_uuid, tenant)?;
            let host = Host::new_original(&qualify(&name, domain.name.as_str()), &address)?;

            repository.add_host(&domain_uuid, tenant, host.clone())?;
            formatter.print_success(&format!("Added {} to {}", host.name(), domain.name));
            formatter.print(&host, |h| host_rows(std::slice::from_ref(h)))
        }
        HostCommands::Get { domain, host } => {
            let host = repository.get_host(&Uuid::new(&domain)?, tenant, &Uuid::new(&host)?)?;
            formatter.print(&host, |h| host_rows(std::slice::from_ref(h)))
        }
        HostCommands::Update {
            domain,
            host,
            name,
            address,
        } => {
            let domain_uuid = Uuid::new(&domain)?;
            let name = match name {
                Some(name) => {
                    let domain = repository.get_domain(&domain_uuid, tenant)?;
                    Some(qualify(&name, domain.name.as_str()))
                }
                None => None,
            };

            let host = repository.update_host(
                &domain_uuid,
                tenant,
                &Uuid::new(&host)?,
                name.as_deref(),
                address.as_deref(),
            )?;
            formatter.print_success(&format!("Updated {}", host.name()));
            formatter.print(&host, |h| host_rows(std::slice::from_ref(h)))
        }
        HostCommands::Delete { domain, host } => {
            let host = repository.delete_host(&Uuid::new(&domain)?, tenant, &Uuid::new(&host)?)?;
            formatter.print_success(&format!("Deleted {} ({})", host.name(), host.address()));
            Ok(())
        }
    }
}
