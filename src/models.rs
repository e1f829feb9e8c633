//! Shared models and types
//!
//! Types used by discovery, negotiation and the device info manager
//! live here to avoid circular dependencies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Username/password pair tried against a device
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse `user:pass`; the password may be empty or contain ':'
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((user, pass)) if !user.is_empty() => Ok(Self::new(user, pass)),
            _ => Err(Error::Input(format!(
                "credential must be user:pass, got '{}'",
                s
            ))),
        }
    }

    /// Password replaced with asterisks for diagnostics
    pub fn masked(&self) -> String {
        format!("{}:{}", self.username, "*".repeat(self.password.len()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Authentication schemes, in negotiation priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    None,
    #[serde(rename = "wsse")]
    WsSecurity,
    Digest,
    Basic,
}

impl AuthScheme {
    /// Fixed priority: none -> wsse -> digest -> basic
    pub const PRIORITY: [AuthScheme; 4] = [
        AuthScheme::None,
        AuthScheme::WsSecurity,
        AuthScheme::Digest,
        AuthScheme::Basic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::None => "none",
            AuthScheme::WsSecurity => "wsse",
            AuthScheme::Digest => "digest",
            AuthScheme::Basic => "basic",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Multicast,
    Scan,
    Manual,
}

/// A device endpoint that answered like an ONVIF device service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub address: String,
    pub port: u16,
    pub path: String,
    /// Full device service URL
    pub xaddr: String,
    /// WS-Addressing endpoint reference (multicast only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    pub source: CandidateSource,
}

impl Candidate {
    /// Candidate for `http://address:port{path}`
    pub fn from_parts(address: &str, port: u16, path: &str, source: CandidateSource) -> Self {
        Self {
            address: address.to_string(),
            port,
            path: path.to_string(),
            xaddr: format!("http://{}:{}{}", address, port, path),
            endpoint: None,
            types: Vec::new(),
            scopes: Vec::new(),
            source,
        }
    }

    /// Candidate from an advertised XAddr URL
    pub fn from_xaddr(xaddr: &str, source: CandidateSource) -> Result<Self> {
        let url = reqwest::Url::parse(xaddr)
            .map_err(|e| Error::Parse(format!("invalid XAddr '{}': {}", xaddr, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Parse(format!("unsupported XAddr scheme '{}'", url.scheme())));
        }
        let address = url
            .host_str()
            .ok_or_else(|| Error::Parse(format!("XAddr '{}' has no host", xaddr)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::Parse(format!("XAddr '{}' has no port", xaddr)))?;
        let path = match url.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        Ok(Self {
            address,
            port,
            path,
            xaddr: xaddr.to_string(),
            endpoint: None,
            types: Vec::new(),
            scopes: Vec::new(),
            source,
        })
    }

    /// Dedup key
    pub fn key(&self) -> (String, u16) {
        (self.address.clone(), self.port)
    }
}

/// GetDeviceInformation fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInformation {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub hardware_id: String,
}

impl DeviceInformation {
    /// Model, else `manufacturer-serial`
    pub fn display_name(&self) -> String {
        if !self.model.is_empty() {
            self.model.clone()
        } else if !self.manufacturer.is_empty() || !self.serial_number.is_empty() {
            format!("{}-{}", self.manufacturer, self.serial_number)
        } else {
            String::new()
        }
    }
}

/// Service XAddrs from GetCapabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceXAddrs {
    pub device: Option<String>,
    pub media: Option<String>,
    pub events: Option<String>,
    pub ptz: Option<String>,
    pub imaging: Option<String>,
}

/// One media profile with its stream URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// 1-based
    pub index: usize,
    pub profile_token: String,
    pub name: String,
    pub stream_uri: Option<String>,
}
