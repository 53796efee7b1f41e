//! Zone file codec
//!
//! A zone file is a hosts file whose comments carry the domain metadata:
//!
//! ```text
//! # DomainUUID: 3e8fc6b1-0a93-4c57-9f2b-95d3e66a66e0
//! # Tenats:
//! #   - df397e50-8006-450e-b18b-5c5bd940baff
//! 172.21.1.1  hogeserver1.hogehoge.hoge  # 5b9ea8eb-5ce5-422a-9d70-37d25fa896ae
//! ```
//!
//! Lines starting with `#` are metadata, every other non-blank line is a host
//! record. The `Tenats:` spelling is what existing files contain; `Tenants:`
//! is accepted when reading.

use crate::dns::domain::Domain;
use crate::dns::errors::ConfError;
use crate::dns::host::Host;
use crate::dns::identifiers::Uuid;

const DOMAIN_UUID_MARKER: &str = "DomainUUID:";
const TENANTS_MARKER: &str = "Tenats:";
const TENANTS_MARKER_ALT: &str = "Tenants:";

/// Parser errors with line number information
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    MissingDomainUuid,
    DuplicateDomainUuid { line: usize },
    RecordBeforeHeader { line: usize },
    InvalidHostLine { line: usize, message: String },
    InvalidTenant { line: usize, message: String },
    InvalidValue { line: usize, message: String },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingDomainUuid => write!(f, "domain UUID missing"),
            ParseError::DuplicateDomainUuid { line } =>
                write!(f, "Line {}: domain UUID declared twice", line),
            ParseError::RecordBeforeHeader { line } =>
                write!(f, "Line {}: record found before the domain UUID header", line),
            ParseError::InvalidHostLine { line, message } =>
                write!(f, "Line {}: Invalid host record: {}", line, message),
            ParseError::InvalidTenant { line, message } =>
                write!(f, "Line {}: Invalid tenant entry: {}", line, message),
            ParseError::InvalidValue { line, message } =>
                write!(f, "Line {}: {}", line, message),
        }
    }
}

impl std::error::Error for ParseError {}

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Header,
    Tenants,
    Records,
}

/// Line oriented zone file parser
pub struct ZoneFileParser {
    name: String,
    line_number: usize,
    section: Section,
}

impl ZoneFileParser {
    /// Create a parser for the zone file of the domain `name`
    pub fn new(name: &str) -> Self {
        ZoneFileParser {
            name: name.to_string(),
            line_number: 0,
            section: Section::Header,
        }
    }

    pub fn parse_string(&mut self, content: &str) -> Result<Domain> {
        let mut domain: Option<Domain> = None;
        self.section = Section::Header;

        for (idx, line) in content.lines().enumerate() {
            self.line_number = idx + 1;
            self.parse_line(&mut domain, line)?;
        }

        domain.ok_or(ParseError::MissingDomainUuid)
    }

    fn parse_line(&mut self, domain: &mut Option<Domain>, line: &str) -> Result<()> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }

        if let Some(comment) = trimmed.strip_prefix('#') {
            return self.parse_comment(domain, comment.trim());
        }

        self.section = Section::Records;
        let domain = domain.as_mut().ok_or(ParseError::RecordBeforeHeader {
            line: self.line_number,
        })?;
        let host = self.parse_host(trimmed)?;
        domain.hosts.push(host);
        Ok(())
    }

    fn parse_comment(&mut self, domain: &mut Option<Domain>, comment: &str) -> Result<()> {
        if let Some(rest) = comment.strip_prefix(DOMAIN_UUID_MARKER) {
            if domain.is_some() {
                return Err(ParseError::DuplicateDomainUuid { line: self.line_number });
            }
            let uuid = self.value(Uuid::new(rest.trim()))?;
            *domain = Some(self.value(Domain::new_empty(uuid, &self.name))?);
            self.section = Section::Header;
            return Ok(());
        }

        if comment == TENANTS_MARKER || comment == TENANTS_MARKER_ALT {
            if domain.is_none() {
                return Err(ParseError::RecordBeforeHeader { line: self.line_number });
            }
            self.section = Section::Tenants;
            return Ok(());
        }

        if self.section == Section::Tenants {
            if let Some(item) = comment.strip_prefix('-') {
                let tenant = Uuid::new(item.trim()).map_err(|e| ParseError::InvalidTenant {
                    line: self.line_number,
                    message: e.to_string(),
                })?;
                if let Some(domain) = domain.as_mut() {
                    domain.tenants.push(tenant);
                }
                return Ok(());
            }
        }

        // Free-form comment; it also ends a tenant list
        if self.section == Section::Tenants {
            self.section = Section::Header;
        }
        Ok(())
    }

    fn parse_host(&self, line: &str) -> Result<Host> {
        let (record, uuid) = line.split_once('#').ok_or_else(|| ParseError::InvalidHostLine {
            line: self.line_number,
            message: "missing '# <uuid>' comment".to_string(),
        })?;

        let fields: Vec<&str> = record.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(ParseError::InvalidHostLine {
                line: self.line_number,
                message: format!("expected '<address> <name>', found {} fields", fields.len()),
            });
        }

        let uuid = Uuid::new(uuid.trim()).map_err(|e| ParseError::InvalidHostLine {
            line: self.line_number,
            message: e.to_string(),
        })?;

        Host::new(uuid, fields[1], fields[0]).map_err(|e| ParseError::InvalidHostLine {
            line: self.line_number,
            message: e.to_string(),
        })
    }

    fn value<T>(&self, result: std::result::Result<T, ConfError>) -> Result<T> {
        result.map_err(|e| ParseError::InvalidValue {
            line: self.line_number,
            message: e.to_string(),
        })
    }
}

/// Parse the zone file of the domain `name`
pub fn parse(name: &str, content: &str) -> std::result::Result<Domain, ConfError> {
    let mut parser = ZoneFileParser::new(name);
    Ok(parser.parse_string(content)?)
}

/// Render `domain` in zone file format. Hosts keep their list order.
pub fn serialize(domain: &Domain) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {} {}\n", DOMAIN_UUID_MARKER, domain.uuid));
    out.push_str(&format!("# {}\n", TENANTS_MARKER));
    for tenant in &domain.tenants {
        out.push_str(&format!("#   - {}\n", tenant));
    }
    for host in &domain.hosts {
        out.push_str(&format!("{}  {}  # {}\n", host.address(), host.name(), host.uuid()));
    }

    out
}
