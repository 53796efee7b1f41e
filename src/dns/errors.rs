//! Error types for zone and Corefile management

use std::fmt;
use std::error::Error;
use std::io;

use derive_more::Display;

use crate::dns::zone_file::ParseError;

/// Coarse classification of a [`ConfError`], used by callers to pick a
/// status code or exit code without matching every variant.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    NotFound,
    PermissionDenied,
    Duplicated,
    ServerSide,
    Unrecoverable,
}

#[derive(Debug)]
pub enum ConfError {
    /// Malformed identifier, name or address supplied by a client
    InvalidParameterGiven(String),
    DomainNotFound(String),
    /// A domain with the same name already exists
    DomainDuplicated(String),
    /// The requesting tenant is not in the domain's ACL
    DomainPermission { domain: String, tenant: String },
    HostNotFound(String),
    HostDuplicated(String),
    ServerSide(String),
    Parse(ParseError),
    Template(String),
    Io(io::Error),
    Config(String),
    /// A write failed and so did the attempt to undo it. Disk and cache
    /// may disagree until an operator intervenes.
    Unrecoverable {
        original: Box<ConfError>,
        compensation: Box<ConfError>,
    },
}

impl ConfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfError::InvalidParameterGiven(_) => ErrorKind::InvalidParameter,
            ConfError::DomainNotFound(_) | ConfError::HostNotFound(_) => ErrorKind::NotFound,
            ConfError::DomainPermission { .. } => ErrorKind::PermissionDenied,
            ConfError::DomainDuplicated(_) | ConfError::HostDuplicated(_) => ErrorKind::Duplicated,
            ConfError::ServerSide(_)
            | ConfError::Parse(_)
            | ConfError::Template(_)
            | ConfError::Io(_)
            | ConfError::Config(_) => ErrorKind::ServerSide,
            ConfError::Unrecoverable { .. } => ErrorKind::Unrecoverable,
        }
    }

    /// True when retrying with the same input can never succeed
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidParameter
                | ErrorKind::NotFound
                | ErrorKind::PermissionDenied
                | ErrorKind::Duplicated
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConfError::InvalidParameterGiven(message.into())
    }
}

impl fmt::Display for ConfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfError::InvalidParameterGiven(msg) => write!(f, "Invalid parameter: {}", msg),
            ConfError::DomainNotFound(domain) => write!(f, "Domain not found: {}", domain),
            ConfError::DomainDuplicated(domain) => write!(f, "Domain already exists: {}", domain),
            ConfError::DomainPermission { domain, tenant } => {
                write!(f, "Tenant {} is not permitted to access domain {}", tenant, domain)
            }
            ConfError::HostNotFound(host) => write!(f, "Host not found: {}", host),
            ConfError::HostDuplicated(host) => write!(f, "Host already exists: {}", host),
            ConfError::ServerSide(msg) => write!(f, "Server side error: {}", msg),
            ConfError::Parse(e) => write!(f, "Zone file parse error: {}", e),
            ConfError::Template(msg) => write!(f, "Template error: {}", msg),
            ConfError::Io(e) => write!(f, "IO error: {}", e),
            ConfError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ConfError::Unrecoverable { original, compensation } => write!(
                f,
                "Unrecoverable error: {} (compensation also failed: {})",
                original, compensation
            ),
        }
    }
}

impl Error for ConfError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfError::Parse(e) => Some(e),
            ConfError::Io(e) => Some(e),
            ConfError::Unrecoverable { original, .. } => Some(original.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for ConfError {
    fn from(err: io::Error) -> Self {
        ConfError::Io(err)
    }
}

impl From<ParseError> for ConfError {
    fn from(err: ParseError) -> Self {
        ConfError::Parse(err)
    }
}

impl From<handlebars::RenderError> for ConfError {
    fn from(err: handlebars::RenderError) -> Self {
        ConfError::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for ConfError {
    fn from(err: handlebars::TemplateError) -> Self {
        ConfError::Template(err.to_string())
    }
}

impl From<toml::de::Error> for ConfError {
    fn from(err: toml::de::Error) -> Self {
        ConfError::Config(err.to_string())
    }
}

/// Result type alias for zone and Corefile operations
pub type Result<T> = std::result::Result<T, ConfError>;
