//! Fork-join describe over many candidates
//!
//! One task per device behind a semaphore; each device's failure stays in its
//! own report row.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::types::{AuthStatus, DeviceReport};
use super::DeviceInfoManager;
use crate::models::{Candidate, Credential};

/// Reports come back in the order of `candidates`
pub async fn describe_all(
    manager: &DeviceInfoManager,
    candidates: &[Candidate],
    credentials: &[Credential],
    max_in_flight: usize,
) -> Vec<DeviceReport> {
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let credentials: Arc<[Credential]> = credentials.into();

    let mut handles = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let manager = manager.clone();
        let candidate = candidate.clone();
        let credentials = credentials.clone();
        handles.push(tokio::spawn(async move {
            let report = manager.report(&candidate, &credentials).await;
            drop(permit);
            report
        }));
    }

    let results = futures::future::join_all(handles).await;
    let reports: Vec<DeviceReport> = results
        .into_iter()
        .zip(candidates)
        .map(|(result, candidate)| match result {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(xaddr = %candidate.xaddr, error = %e, "Describe task failed");
                DeviceReport::failure(
                    candidate.clone(),
                    AuthStatus::Unreachable,
                    format!("task failed: {}", e),
                    Vec::new(),
                )
            }
        })
        .collect();

    let ok = reports
        .iter()
        .filter(|r| r.status == AuthStatus::Success)
        .count();
    tracing::info!(devices = reports.len(), authenticated = ok, "Batch describe complete");
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthScheme, CandidateSource};
    use crate::soap::testing::{reply, FnTransport, DEVICE_INFO_BODY};
    use crate::soap::{SoapClient, SoapRequest};

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let transport = Arc::new(FnTransport::new(|req: &SoapRequest| {
            if req.url.contains("10.0.0.2") {
                reply(401, "")
            } else if req.body.contains("GetDeviceInformation") {
                reply(200, DEVICE_INFO_BODY)
            } else {
                reply(500, "")
            }
        }));
        let manager = DeviceInfoManager::new(SoapClient::with_transport(transport));
        let candidates: Vec<Candidate> = (1..=3)
            .map(|i| {
                Candidate::from_parts(
                    &format!("10.0.0.{}", i),
                    80,
                    "/onvif/device_service",
                    CandidateSource::Scan,
                )
            })
            .collect();

        let creds = [Credential::new("admin", "admin")];
        let reports = describe_all(&manager, &candidates, &creds, 2).await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].status, AuthStatus::Success);
        assert_eq!(reports[0].scheme, Some(AuthScheme::None));
        assert_eq!(reports[1].status, AuthStatus::CredentialsRejected);
        assert_eq!(reports[1].candidate.address, "10.0.0.2");
        assert_eq!(reports[2].status, AuthStatus::Success);
        assert_eq!(reports[2].name, "CAM-9");
    }
}
