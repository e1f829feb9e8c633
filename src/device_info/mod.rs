//! Device Info Manager
//!
//! Negotiates authentication for a candidate, then reuses the winning scheme
//! for GetDeviceInformation, GetCapabilities and GetProfiles/GetStreamUri.
//! Only the negotiation can fail the call; the three follow-ups are
//! best-effort and land in `diagnostics` when they fail.

mod batch;
mod types;

pub use batch::describe_all;
pub use types::{AuthStatus, DeviceInfo, DeviceReport};

use crate::error::{ErrorKind, Result};
use crate::models::{Candidate, Channel, Credential};
use crate::negotiator::{Attempt, Negotiator};
use crate::soap::{response, Operation, SoapClient};

#[derive(Clone)]
pub struct DeviceInfoManager {
    negotiator: Negotiator,
}

impl DeviceInfoManager {
    pub fn new(client: SoapClient) -> Self {
        Self {
            negotiator: Negotiator::new(client),
        }
    }

    fn client(&self) -> &SoapClient {
        self.negotiator.client()
    }

    pub async fn describe(
        &self,
        candidate: &Candidate,
        credentials: &[Credential],
    ) -> Result<DeviceInfo> {
        let mut attempts = Vec::new();
        self.describe_traced(candidate, credentials, &mut attempts)
            .await
    }

    /// Describe and produce a report row, classifying failures
    pub async fn report(&self, candidate: &Candidate, credentials: &[Credential]) -> DeviceReport {
        let mut attempts = Vec::new();
        match self
            .describe_traced(candidate, credentials, &mut attempts)
            .await
        {
            Ok(info) => DeviceReport::success(info),
            Err(e) => {
                let status = classify_failure(&attempts, credentials.is_empty());
                let diagnostics = attempts.iter().map(describe_attempt).collect();
                DeviceReport::failure(candidate.clone(), status, e.to_string(), diagnostics)
            }
        }
    }

    async fn describe_traced(
        &self,
        candidate: &Candidate,
        credentials: &[Credential],
        attempts: &mut Vec<Attempt>,
    ) -> Result<DeviceInfo> {
        let mut session = self
            .negotiator
            .negotiate_traced(candidate, credentials, attempts)
            .await?;
        let mut diagnostics: Vec<String> = attempts.iter().map(describe_attempt).collect();
        let client = self.client();
        let device_url = candidate.xaddr.clone();

        match session
            .invoke(client, &device_url, &Operation::GetDeviceInformation)
            .await
        {
            Ok(el) => session.device_info = response::decode_device_information(&el),
            Err(e) => note(&mut diagnostics, &device_url, "GetDeviceInformation", &e),
        }

        match session
            .invoke(client, &device_url, &Operation::GetCapabilities)
            .await
        {
            Ok(el) => session.services = response::decode_capabilities(&el),
            Err(e) => note(&mut diagnostics, &device_url, "GetCapabilities", &e),
        }

        let media_url = match session.services.media.clone() {
            Some(url) => url,
            None => {
                diagnostics.push("no media service advertised, skipping profiles".to_string());
                return Ok(DeviceInfo {
                    session,
                    diagnostics,
                });
            }
        };

        let profiles = match session
            .invoke(client, &media_url, &Operation::GetProfiles)
            .await
        {
            Ok(el) => response::decode_profiles(&el),
            Err(e) => {
                note(&mut diagnostics, &media_url, "GetProfiles", &e);
                Vec::new()
            }
        };

        for (i, (token, name)) in profiles.into_iter().enumerate() {
            let index = i + 1;
            let op = Operation::GetStreamUri {
                profile_token: token.clone(),
            };
            let stream_uri = match session.invoke(client, &media_url, &op).await {
                Ok(el) => response::decode_stream_uri(&el),
                Err(e) => {
                    note(&mut diagnostics, &media_url, "GetStreamUri", &e);
                    None
                }
            };
            session.channels.push(Channel {
                index,
                profile_token: token,
                name: name.unwrap_or_else(|| format!("Profile_{}", index)),
                stream_uri,
            });
        }

        tracing::info!(
            xaddr = %candidate.xaddr,
            scheme = %session.scheme(),
            channels = session.channels.len(),
            "Device described"
        );
        Ok(DeviceInfo {
            session,
            diagnostics,
        })
    }
}

fn note(diagnostics: &mut Vec<String>, url: &str, operation: &str, err: &crate::error::Error) {
    tracing::debug!(url = %url, operation, error = %err, "Best-effort call failed");
    diagnostics.push(format!("{} failed at {}: {}", operation, url, err));
}

fn describe_attempt(a: &Attempt) -> String {
    match a.failure {
        None => format!("{} as '{}': ok", a.scheme, a.username),
        Some(_) => format!("{} as '{}': {}", a.scheme, a.username, a.detail),
    }
}

/// Map a failed negotiation's attempts onto a batch status
fn classify_failure(attempts: &[Attempt], no_credentials: bool) -> AuthStatus {
    let auth_answered = attempts
        .iter()
        .any(|a| a.failure == Some(ErrorKind::Auth));
    match (auth_answered, no_credentials) {
        (false, _) => AuthStatus::Unreachable,
        (true, true) => AuthStatus::AuthRequired,
        (true, false) => AuthStatus::CredentialsRejected,
    }
}
