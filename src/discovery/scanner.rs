//! Range Scanner
//!
//! Brute-force probe of every IP x port x service path combination with a
//! semaphore capping live tasks. A combination counts as an ONVIF device on
//! HTTP 401, or on a SOAP body with ONVIF or auth-fault markers.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use super::range::IpRange;
use super::types::CandidateSet;
use crate::config::{ClientConfig, ScanConfig};
use crate::error::Result;
use crate::models::{Candidate, CandidateSource};
use crate::soap::{
    build_envelope, has_fault_marker, HttpReply, HttpTransport, Operation, SoapRequest,
    SoapTransport,
};

const ONVIF_MARKERS: [&str; 3] = ["onvif", "GetDeviceInformationResponse", "Manufacturer"];

/// Does this reply indicate an ONVIF device service?
///
/// Any status counts when the body is a SOAP envelope carrying an ONVIF
/// marker or an auth fault; WS-Security-only devices answer 400/500 with
/// `ter:NotAuthorized`.
pub fn is_onvif_reply(reply: &HttpReply) -> bool {
    if reply.status == 401 {
        return true;
    }
    reply.body.contains("Envelope")
        && (ONVIF_MARKERS.iter().any(|m| reply.body.contains(m))
            || has_fault_marker(&reply.body))
}

pub struct RangeScanner {
    transport: Arc<dyn SoapTransport>,
    config: ScanConfig,
}

impl RangeScanner {
    /// Scanner over HTTP with the per-probe timeout from `config`
    pub fn new(config: ScanConfig, client: &ClientConfig) -> Result<Self> {
        let client = ClientConfig {
            request_timeout: config.probe_timeout,
            ..client.clone()
        };
        let transport = Arc::new(HttpTransport::new(&client)?);
        Ok(Self::with_transport(transport, config))
    }

    pub fn with_transport(transport: Arc<dyn SoapTransport>, config: ScanConfig) -> Self {
        Self { transport, config }
    }

    /// Scan `[start, end]` and return deduplicated candidates
    pub async fn scan(&self, start: Ipv4Addr, end: Ipv4Addr) -> Result<Vec<Candidate>> {
        let range = IpRange::new(start, end)?;
        Ok(self.scan_range(range).await)
    }

    pub async fn scan_range(&self, range: IpRange) -> Vec<Candidate> {
        let total = range.len() * self.config.ports.len() * self.config.paths.len();
        tracing::info!(
            start = %range.start(),
            end = %range.end(),
            ports = ?self.config.ports,
            total_probes = total,
            max_in_flight = self.config.max_in_flight,
            "Range scan started"
        );

        let limit = self.config.max_in_flight.clamp(1, u32::MAX as usize);
        let semaphore = Arc::new(Semaphore::new(limit));
        let found = Arc::new(Mutex::new(CandidateSet::new()));
        let completed = Arc::new(AtomicUsize::new(0));
        let interval = self.config.progress_interval.max(1);
        let body: Arc<str> = build_envelope(&Operation::GetDeviceInformation, None).into();

        for ip in range.iter() {
            for &port in &self.config.ports {
                for path in &self.config.paths {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => break,
                    };
                    let transport = self.transport.clone();
                    let found = found.clone();
                    let completed = completed.clone();
                    let body = body.clone();
                    let path = path.clone();
                    let timeout = self.config.probe_timeout;

                    tokio::spawn(async move {
                        // held until the task finishes; the final acquire_many is the join barrier
                        let _permit = permit;
                        let url = format!("http://{}:{}{}", ip, port, path);
                        let request = SoapRequest {
                            url: url.clone(),
                            body: body.to_string(),
                            authorization: None,
                        };
                        let hit = matches!(
                            tokio::time::timeout(timeout, transport.post(request)).await,
                            Ok(Ok(reply)) if is_onvif_reply(&reply)
                        );

                        let found_count = if hit {
                            tracing::debug!(url = %url, "ONVIF endpoint responded");
                            let mut set = found.lock().await;
                            set.insert(Candidate::from_parts(
                                &ip.to_string(),
                                port,
                                &path,
                                CandidateSource::Scan,
                            ));
                            Some(set.len())
                        } else {
                            None
                        };

                        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                        if done % interval == 0 || done == total {
                            let found = match found_count {
                                Some(n) => n,
                                None => found.lock().await.len(),
                            };
                            tracing::info!(done, total, found, "Scan progress");
                        }
                    });
                }
            }
        }

        if semaphore.acquire_many(limit as u32).await.is_err() {
            tracing::warn!("Scan semaphore closed before all probes finished");
        }

        let set = std::mem::take(&mut *found.lock().await);
        tracing::info!(devices = set.len(), "Range scan complete");
        set.into_sorted_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::Error;
    use crate::soap::testing::{reply, FnTransport, DEVICE_INFO_BODY};

    const NOT_AUTHORIZED_FAULT: &str = concat!(
        r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope" "#,
        r#"xmlns:ter="http://www.onvif.org/ver10/error"><env:Body><env:Fault>"#,
        r#"<env:Code><env:Value>env:Sender</env:Value><env:Subcode>"#,
        r#"<env:Value>ter:NotAuthorized</env:Value></env:Subcode></env:Code>"#,
        r#"<env:Reason><env:Text xml:lang="en">Sender not Authorized</env:Text></env:Reason>"#,
        r#"</env:Fault></env:Body></env:Envelope>"#
    );

    fn config(max_in_flight: usize) -> ScanConfig {
        ScanConfig {
            ports: vec![80, 8000, 8080],
            paths: crate::config::DEFAULT_SERVICE_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            probe_timeout: Duration::from_secs(2),
            max_in_flight,
            progress_interval: 500,
        }
    }

    /// Tracks how many posts are in flight at once
    #[derive(Default)]
    struct GaugeTransport {
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SoapTransport for GaugeTransport {
        async fn post(&self, _request: SoapRequest) -> Result<HttpReply> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Err(Error::Transport("connection refused".into()))
        }
    }

    #[test]
    fn test_is_onvif_reply() {
        assert!(is_onvif_reply(&reply(401, "")));
        assert!(is_onvif_reply(&reply(200, DEVICE_INFO_BODY)));
        assert!(is_onvif_reply(&reply(
            200,
            "<s:Envelope xmlns:tds=\"http://www.onvif.org/ver10/device/wsdl\"/>"
        )));
        assert!(!is_onvif_reply(&reply(200, "<html>onvif</html>")));
        assert!(!is_onvif_reply(&reply(200, "<s:Envelope/>")));
        assert!(is_onvif_reply(&reply(500, DEVICE_INFO_BODY)));
        assert!(is_onvif_reply(&reply(400, NOT_AUTHORIZED_FAULT)));
        assert!(!is_onvif_reply(&reply(400, "<html>Bad Request</html>")));
        assert!(!is_onvif_reply(&reply(404, "")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_peak_in_flight_respects_ceiling() {
        let gauge = Arc::new(GaugeTransport::default());
        let scanner = RangeScanner::with_transport(gauge.clone(), config(64));

        let start = Ipv4Addr::new(10, 1, 0, 1);
        let end = Ipv4Addr::from(u32::from(start) + 299);
        let found = scanner.scan(start, end).await.unwrap();

        assert!(found.is_empty());
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 300 * 3 * 4);
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= 64, "peak in-flight {} exceeded ceiling", peak);
        assert!(peak > 1);
    }

    #[tokio::test]
    async fn test_single_host_answering_on_one_port() {
        let transport = Arc::new(FnTransport::new(|req: &SoapRequest| {
            if req.url.starts_with("http://192.168.1.1:8000/") {
                reply(200, DEVICE_INFO_BODY)
            } else {
                reply(404, "")
            }
        }));
        let scanner = RangeScanner::with_transport(transport.clone(), config(10));
        let ip = Ipv4Addr::new(192, 168, 1, 1);
        let found = scanner.scan(ip, ip).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "192.168.1.1");
        assert_eq!(found[0].port, 8000);
        assert_eq!(found[0].path, "/onvif/services");
        assert_eq!(found[0].xaddr, "http://192.168.1.1:8000/onvif/services");
        assert_eq!(transport.requests().len(), 12);
        assert!(transport.requests().iter().all(|r| r.authorization.is_none()));
    }

    #[tokio::test]
    async fn test_wsse_only_device_fault_counts_as_present() {
        let transport =
            Arc::new(FnTransport::new(|_: &SoapRequest| reply(400, NOT_AUTHORIZED_FAULT)));
        let single_path = ScanConfig {
            ports: vec![80],
            paths: vec!["/onvif/device_service".to_string()],
            ..config(10)
        };
        let scanner = RangeScanner::with_transport(transport, single_path);
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let found = scanner.scan(ip, ip).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].xaddr, "http://10.0.0.1:80/onvif/device_service");
    }

    #[tokio::test]
    async fn test_reversed_range_rejected() {
        let transport = Arc::new(FnTransport::new(|_: &SoapRequest| reply(404, "")));
        let scanner = RangeScanner::with_transport(transport.clone(), config(10));
        let err = scanner
            .scan(Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_counts_as_present() {
        let transport = Arc::new(FnTransport::new(|req: &SoapRequest| {
            if req.url.contains(":80/") {
                reply(401, "")
            } else {
                reply(404, "")
            }
        }));
        let scanner = RangeScanner::with_transport(transport, config(10));
        let found = scanner
            .scan(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 3))
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|c| c.port == 80 && c.path == "/onvif/services"));
        assert_eq!(found[2].address, "10.0.0.3");
    }
}
