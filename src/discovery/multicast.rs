//! Multicast Prober (WS-Discovery)
//!
//! Sends one Probe per interface to 239.255.255.250:3702 and collects
//! ProbeMatch replies until the listen window closes. Replies are read with
//! tolerant regex extraction since vendors disagree on namespace prefixes.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::config::MulticastConfig;
use crate::error::{Error, Result};
use crate::models::{Candidate, CandidateSource};

lazy_static! {
    static ref PROBE_MATCH: Regex =
        Regex::new(r"(?s)<(?:[\w-]+:)?ProbeMatch\b[^>]*>(.*?)</(?:[\w-]+:)?ProbeMatch>")
            .expect("valid regex");
    static ref ADDRESS: Regex =
        Regex::new(r"(?s)<(?:[\w-]+:)?Address\b[^>]*>(.*?)</(?:[\w-]+:)?Address>")
            .expect("valid regex");
    static ref XADDRS: Regex =
        Regex::new(r"(?s)<(?:[\w-]+:)?XAddrs\b[^>]*>(.*?)</(?:[\w-]+:)?XAddrs>")
            .expect("valid regex");
    static ref TYPES: Regex =
        Regex::new(r"(?s)<(?:[\w-]+:)?Types\b[^>]*>(.*?)</(?:[\w-]+:)?Types>")
            .expect("valid regex");
    static ref SCOPES: Regex =
        Regex::new(r"(?s)<(?:[\w-]+:)?Scopes\b[^>]*>(.*?)</(?:[\w-]+:)?Scopes>")
            .expect("valid regex");
}

/// Random v4 UUID, or a time-seeded one if the OS RNG is unavailable
pub fn message_uuid() -> uuid::Uuid {
    let mut bytes = [0u8; 16];
    if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
        tracing::debug!(error = %e, "OS randomness unavailable, deriving message id from time");
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        bytes = nanos.to_le_bytes();
    }
    uuid::Builder::from_random_bytes(bytes).into_uuid()
}

/// WS-Discovery Probe for NetworkVideoTransmitter devices
pub fn probe_message(message_id: &uuid::Uuid) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing">
  <s:Header>
    <a:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</a:Action>
    <a:MessageID>uuid:{}</a:MessageID>
    <a:ReplyTo>
      <a:Address>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</a:Address>
    </a:ReplyTo>
    <a:To s:mustUnderstand="1">urn:schemas-xmlsoap-org:ws:2005:04:discovery</a:To>
  </s:Header>
  <s:Body>
    <Probe xmlns="http://schemas.xmlsoap.org/ws/2005/04/discovery">
      <d:Types xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery" xmlns:dp0="http://www.onvif.org/ver10/network/wsdl">dp0:NetworkVideoTransmitter</d:Types>
    </Probe>
  </s:Body>
</s:Envelope>"#,
        message_id.hyphenated()
    )
}

/// Fields pulled out of one ProbeMatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeMatch {
    pub endpoint: Option<String>,
    pub xaddrs: Vec<String>,
    pub types: Vec<String>,
    pub scopes: Vec<String>,
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn words(value: Option<String>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Extract ProbeMatch entries; entries without XAddrs are dropped
pub fn parse_probe_matches(body: &str) -> Vec<ProbeMatch> {
    let mut sections: Vec<&str> = PROBE_MATCH
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if sections.is_empty() {
        sections.push(body);
    }

    sections
        .into_iter()
        .map(|section| ProbeMatch {
            endpoint: capture(&ADDRESS, section),
            xaddrs: words(capture(&XADDRS, section)),
            types: words(capture(&TYPES, section)),
            scopes: words(capture(&SCOPES, section)),
        })
        .filter(|m| !m.xaddrs.is_empty())
        .collect()
}

/// Deduplicate by endpoint address and expand each XAddr into a candidate
pub fn matches_to_candidates(matches: Vec<ProbeMatch>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in matches {
        let key = m.endpoint.clone().unwrap_or_else(|| m.xaddrs.join(" "));
        if !seen.insert(key) {
            continue;
        }
        for xaddr in &m.xaddrs {
            match Candidate::from_xaddr(xaddr, CandidateSource::Multicast) {
                Ok(c) if c.address.starts_with('[') => {
                    tracing::debug!(xaddr = %xaddr, "Skipping IPv6 XAddr");
                }
                Ok(mut c) => {
                    c.endpoint = m.endpoint.clone();
                    c.types = m.types.clone();
                    c.scopes = m.scopes.clone();
                    out.push(c);
                }
                Err(e) => tracing::debug!(xaddr = %xaddr, error = %e, "Skipping XAddr"),
            }
        }
    }
    out
}

const IFF_UP: u32 = 0x1;
const IFF_MULTICAST: u32 = 0x1000;

fn is_up_multicast(flags: u32) -> bool {
    flags & (IFF_UP | IFF_MULTICAST) == IFF_UP | IFF_MULTICAST
}

/// Kernel interface flags from sysfs
#[cfg(target_os = "linux")]
fn interface_flags(name: &str) -> Option<u32> {
    let raw = std::fs::read_to_string(format!("/sys/class/net/{}/flags", name)).ok()?;
    u32::from_str_radix(raw.trim().trim_start_matches("0x"), 16).ok()
}

#[cfg(not(target_os = "linux"))]
fn interface_flags(_name: &str) -> Option<u32> {
    None
}

/// IPv4 interfaces to probe: the named one, or every non-loopback one that is
/// up and multicast-capable. Interfaces with unreadable flags are kept and
/// left to fail at join time.
pub fn select_interfaces(name: Option<&str>) -> Result<Vec<(String, Ipv4Addr)>> {
    let all = local_ip_address::list_afinet_netifas()
        .map_err(|e| Error::Transport(format!("failed to list network interfaces: {}", e)))?;
    let v4: Vec<(String, Ipv4Addr)> = all
        .into_iter()
        .filter_map(|(n, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some((n, v4)),
            _ => None,
        })
        .filter(|(n, addr)| match interface_flags(n) {
            Some(flags) if !is_up_multicast(flags) => {
                tracing::debug!(
                    interface = %n,
                    addr = %addr,
                    flags,
                    "Interface down or not multicast"
                );
                false
            }
            _ => true,
        })
        .collect();

    match name {
        None => Ok(v4),
        Some(wanted) => {
            let picked: Vec<_> = v4.into_iter().filter(|(n, _)| n == wanted).collect();
            if picked.is_empty() {
                Err(Error::Input(format!(
                    "interface '{}' not found, down, or has no IPv4 multicast address",
                    wanted
                )))
            } else {
                Ok(picked)
            }
        }
    }
}

fn open_socket(iface: Ipv4Addr, config: &MulticastConfig) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(iface, 0)).into())?;
    socket.join_multicast_v4(config.group.ip(), &iface)?;
    socket.set_multicast_if_v4(&iface)?;
    socket.set_multicast_ttl_v4(config.ttl)?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

/// Send `message` to `target` once and gather ProbeMatches until the deadline
pub async fn exchange(
    socket: &UdpSocket,
    target: SocketAddr,
    message: &str,
    deadline: Instant,
) -> Result<Vec<ProbeMatch>> {
    socket.send_to(message.as_bytes(), target).await?;

    let mut buf = vec![0u8; 65535];
    let mut matches = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => {
                let body = String::from_utf8_lossy(&buf[..n]);
                let found = parse_probe_matches(&body);
                tracing::debug!(from = %from, matches = found.len(), "WS-Discovery reply");
                matches.extend(found);
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "WS-Discovery receive failed");
                break;
            }
            Err(_) => break,
        }
    }
    Ok(matches)
}

/// Probe the configured interface(s), one listen window each, in sequence
pub async fn probe(config: &MulticastConfig) -> Result<Vec<Candidate>> {
    let interfaces = select_interfaces(config.interface.as_deref())?;
    if interfaces.is_empty() {
        tracing::warn!("No multicast-capable IPv4 interfaces found");
    }

    let mut matches = Vec::new();
    for (name, addr) in interfaces {
        let socket = match open_socket(addr, config) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(interface = %name, addr = %addr, error = %e, "Skipping interface");
                continue;
            }
        };
        let message = probe_message(&message_uuid());
        let deadline = Instant::now() + config.timeout;
        match exchange(&socket, SocketAddr::V4(config.group), &message, deadline).await {
            Ok(found) => {
                tracing::info!(
                    interface = %name,
                    matches = found.len(),
                    "WS-Discovery probe finished"
                );
                matches.extend(found);
            }
            Err(e) => {
                tracing::warn!(interface = %name, error = %e, "WS-Discovery probe failed");
            }
        }
    }

    Ok(matches_to_candidates(matches))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const PROBE_MATCHES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope" xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery">
<SOAP-ENV:Body>
<d:ProbeMatches>
<d:ProbeMatch>
<wsa:EndpointReference><wsa:Address>urn:uuid:11111111-2222-3333-4444-555555555555</wsa:Address></wsa:EndpointReference>
<d:Types>dn:NetworkVideoTransmitter tds:Device</d:Types>
<d:Scopes>onvif://www.onvif.org/type/video_encoder onvif://www.onvif.org/name/CAM</d:Scopes>
<d:XAddrs>http://192.168.1.64/onvif/device_service http://[fe80::1]/onvif/device_service</d:XAddrs>
<d:MetadataVersion>1</d:MetadataVersion>
</d:ProbeMatch>
</d:ProbeMatches>
</SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    #[test]
    fn test_message_uuid_is_v4() {
        let a = message_uuid();
        assert_eq!(a.get_version_num(), 4);
        assert_eq!(a.get_variant(), uuid::Variant::RFC4122);
        assert_ne!(a, message_uuid());
    }

    #[test]
    fn test_probe_message() {
        let id = message_uuid();
        let msg = probe_message(&id);
        assert!(msg.contains(&format!("<a:MessageID>uuid:{}</a:MessageID>", id.hyphenated())));
        assert!(msg.contains("urn:schemas-xmlsoap-org:ws:2005:04:discovery"));
        assert!(msg.contains("NetworkVideoTransmitter"));
    }

    #[test]
    fn test_parse_probe_match() {
        let matches = parse_probe_matches(PROBE_MATCHES);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.endpoint.as_deref(), Some("urn:uuid:11111111-2222-3333-4444-555555555555"));
        assert_eq!(m.xaddrs.len(), 2);
        assert_eq!(m.types, vec!["dn:NetworkVideoTransmitter", "tds:Device"]);
        assert_eq!(m.scopes.len(), 2);
    }

    #[test]
    fn test_unprefixed_and_missing_xaddrs() {
        let body = "<Envelope><Body><ProbeMatches><ProbeMatch><EndpointReference><Address>a</Address></EndpointReference><XAddrs>http://10.0.0.9:8080/onvif/device_service</XAddrs></ProbeMatch>\
                    <ProbeMatch><EndpointReference><Address>b</Address></EndpointReference></ProbeMatch></ProbeMatches></Body></Envelope>";
        let matches = parse_probe_matches(body);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].endpoint.as_deref(), Some("a"));
        assert!(parse_probe_matches("<Envelope/>").is_empty());
    }

    #[test]
    fn test_candidates_expand_and_dedup() {
        let mut matches = parse_probe_matches(PROBE_MATCHES);
        matches.extend(parse_probe_matches(PROBE_MATCHES));
        let candidates = matches_to_candidates(matches);
        // IPv6 XAddr dropped, duplicate endpoint ignored
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "192.168.1.64");
        assert_eq!(candidates[0].port, 80);
        assert_eq!(candidates[0].types.len(), 2);
        assert!(candidates[0].endpoint.is_some());
    }

    #[test]
    fn test_xaddrs_expand_with_shared_metadata() {
        let body = PROBE_MATCHES.replace(
            "http://[fe80::1]/onvif/device_service",
            "http://192.168.1.64:8080/onvif/device_service",
        );
        let candidates = matches_to_candidates(parse_probe_matches(&body));

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].port, 80);
        assert_eq!(candidates[1].port, 8080);
        assert!(candidates.iter().all(|c| c.address == "192.168.1.64"));
        assert_eq!(candidates[0].endpoint, candidates[1].endpoint);
        assert_eq!(candidates[0].types, candidates[1].types);
        assert_eq!(candidates[0].scopes, candidates[1].scopes);
        assert_eq!(candidates[0].scopes.len(), 2);
    }

    #[test]
    fn test_interface_flags_filter() {
        // BROADCAST|MULTICAST|UP, as a typical ethernet NIC reports
        assert!(is_up_multicast(0x1003));
        // down
        assert!(!is_up_multicast(0x1002));
        // point-to-point without multicast
        assert!(!is_up_multicast(0x91));
    }

    #[test]
    fn test_unknown_interface_is_input_error() {
        let err = select_interfaces(Some("definitely-not-an-interface0")).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[tokio::test]
    async fn test_exchange_collects_until_deadline() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = responder.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 8192];
            let (_, from) = responder.recv_from(&mut buf).await.unwrap();
            responder.send_to(PROBE_MATCHES.as_bytes(), from).await.unwrap();
            responder.send_to(b"garbage", from).await.unwrap();
        });

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(300);
        let matches = exchange(&socket, target, &probe_message(&message_uuid()), deadline)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert!(Instant::now() >= deadline);
    }
}
