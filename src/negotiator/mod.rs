//! Auth Negotiator
//!
//! Linear search over credentials x schemes. For each credential, in order,
//! schemes are tried in fixed priority `none -> wsse -> digest -> basic`;
//! the first pair whose GetDeviceInformation call decodes wins. Attempts are
//! strictly sequential per device.

mod types;

pub use types::{Attempt, AuthOutcome, DeviceSession};

use crate::error::{Error, Result};
use crate::models::{AuthScheme, Candidate, Credential};
use crate::soap::{response, AuthDirective, Operation, SoapClient};

#[derive(Clone)]
pub struct Negotiator {
    client: SoapClient,
}

impl Negotiator {
    pub fn new(client: SoapClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SoapClient {
        &self.client
    }

    pub async fn negotiate(
        &self,
        candidate: &Candidate,
        credentials: &[Credential],
    ) -> Result<DeviceSession> {
        let mut attempts = Vec::new();
        self.negotiate_traced(candidate, credentials, &mut attempts)
            .await
    }

    /// Same as [`negotiate`](Self::negotiate), recording every attempt
    pub async fn negotiate_traced(
        &self,
        candidate: &Candidate,
        credentials: &[Credential],
        attempts: &mut Vec<Attempt>,
    ) -> Result<DeviceSession> {
        // No credentials: only anonymous access can succeed
        let anonymous = [Credential::default()];
        let priority = AuthScheme::PRIORITY;
        let (credentials, schemes): (&[Credential], &[AuthScheme]) = if credentials.is_empty() {
            (&anonymous[..], &priority[..1])
        } else {
            (credentials, &priority[..])
        };

        for credential in credentials {
            for &scheme in schemes {
                let directive = AuthDirective::new(scheme, credential);
                match self
                    .client
                    .call(&candidate.xaddr, &Operation::GetDeviceInformation, &directive)
                    .await
                {
                    Ok(el) => {
                        attempts.push(Attempt {
                            scheme,
                            username: credential.username.clone(),
                            failure: None,
                            detail: "ok".to_string(),
                        });
                        tracing::info!(
                            xaddr = %candidate.xaddr,
                            scheme = %scheme,
                            username = %credential.username,
                            "Authenticated"
                        );
                        let info = response::decode_device_information(&el);
                        let outcome = AuthOutcome {
                            scheme,
                            credential: credential.clone(),
                        };
                        return Ok(DeviceSession::new(candidate.clone(), outcome, info));
                    }
                    Err(e) => {
                        tracing::debug!(
                            xaddr = %candidate.xaddr,
                            scheme = %scheme,
                            username = %credential.username,
                            error = %e,
                            "Auth attempt failed"
                        );
                        attempts.push(Attempt {
                            scheme,
                            username: credential.username.clone(),
                            failure: Some(e.kind()),
                            detail: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::warn!(
            xaddr = %candidate.xaddr,
            attempts = attempts.len(),
            "All credentials failed"
        );
        Err(Error::CredentialsExhausted(candidate.xaddr.clone()))
    }
}
