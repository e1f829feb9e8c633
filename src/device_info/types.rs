use serde::{Deserialize, Serialize};

use crate::models::{AuthScheme, Candidate, Channel, DeviceInformation, ServiceXAddrs};
use crate::negotiator::DeviceSession;

/// Result of a successful describe(): the session plus best-effort extras
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub session: DeviceSession,
    /// Partial-failure notes, shown with --verbose
    pub diagnostics: Vec<String>,
}

impl DeviceInfo {
    pub fn name(&self) -> String {
        self.session.device_info.display_name()
    }
}

/// Per-device authentication result in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthStatus {
    Success,
    /// Device wants credentials and none were supplied
    AuthRequired,
    /// Every supplied credential was rejected
    #[serde(rename = "failed-all-creds")]
    CredentialsRejected,
    /// No attempt got an authentication answer at all
    #[serde(rename = "failed")]
    Unreachable,
}

impl AuthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStatus::Success => "success",
            AuthStatus::AuthRequired => "auth-required",
            AuthStatus::CredentialsRejected => "failed-all-creds",
            AuthStatus::Unreachable => "failed",
        }
    }
}

/// One row of batch output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub candidate: Candidate,
    pub status: AuthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<AuthScheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInformation>,
    pub services: ServiceXAddrs,
    pub channels: Vec<Channel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub diagnostics: Vec<String>,
}

impl DeviceReport {
    pub fn success(info: DeviceInfo) -> Self {
        let name = info.name();
        let DeviceInfo {
            session,
            diagnostics,
        } = info;
        Self {
            status: AuthStatus::Success,
            scheme: Some(session.auth.scheme),
            username: Some(session.auth.credential.username.clone()),
            name,
            device_info: Some(session.device_info),
            services: session.services,
            channels: session.channels,
            candidate: session.candidate,
            error: None,
            diagnostics,
        }
    }

    pub fn failure(
        candidate: Candidate,
        status: AuthStatus,
        error: String,
        diagnostics: Vec<String>,
    ) -> Self {
        Self {
            candidate,
            status,
            scheme: None,
            username: None,
            name: String::new(),
            device_info: None,
            services: ServiceXAddrs::default(),
            channels: Vec::new(),
            error: Some(error),
            diagnostics,
        }
    }
}
