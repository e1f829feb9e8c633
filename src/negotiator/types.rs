use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};
use crate::models::{AuthScheme, Candidate, Channel, Credential, DeviceInformation, ServiceXAddrs};
use crate::soap::{AuthDirective, Operation, SoapClient, XmlElement};

/// Winning (scheme, credential) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub scheme: AuthScheme,
    #[serde(skip)]
    pub credential: Credential,
}

impl AuthOutcome {
    pub fn directive(&self) -> AuthDirective {
        AuthDirective::new(self.scheme, &self.credential)
    }
}

/// One negotiation attempt, kept for verbose diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub scheme: AuthScheme,
    pub username: String,
    /// `None` on success
    pub failure: Option<ErrorKind>,
    pub detail: String,
}

/// Authenticated view of one device, built once per successful negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSession {
    pub candidate: Candidate,
    pub auth: AuthOutcome,
    pub device_info: DeviceInformation,
    pub services: ServiceXAddrs,
    pub channels: Vec<Channel>,
}

impl DeviceSession {
    pub fn new(candidate: Candidate, auth: AuthOutcome, device_info: DeviceInformation) -> Self {
        Self {
            candidate,
            auth,
            device_info,
            services: ServiceXAddrs::default(),
            channels: Vec::new(),
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        self.auth.scheme
    }

    pub fn credential(&self) -> &Credential {
        &self.auth.credential
    }

    /// Issue a further SOAP call with the negotiated scheme, no renegotiation
    pub async fn invoke(
        &self,
        client: &SoapClient,
        url: &str,
        operation: &Operation,
    ) -> Result<XmlElement> {
        client.call(url, operation, &self.auth.directive()).await
    }
}
