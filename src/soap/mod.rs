//! SOAP Transport
//!
//! Builds an envelope for an operation and auth directive, performs the POST
//! (plus at most one Digest retry) and classifies the reply:
//!
//! 1. HTTP 401 -> `Error::Auth`
//! 2. SOAP fault markers in the body -> `Error::Auth`
//! 3. any other non-200 -> `Error::Transport`
//! 4. expected response element missing -> `Error::Parse`

pub mod envelope;
pub mod response;
pub mod transport;

use std::sync::Arc;

pub use envelope::{build_envelope, AuthDirective, Operation};
pub use response::XmlElement;
pub use transport::{HttpReply, HttpTransport, SoapRequest, SoapTransport};

use crate::config::ClientConfig;
use crate::digest::{self, DigestChallenge, UsernameToken};
use crate::error::{Error, Result};

/// Body substrings that mark an authentication fault
pub const FAULT_MARKERS: [&str; 3] = ["NotAuthorized", "Sender not Authorized", ":Fault"];

pub fn has_fault_marker(body: &str) -> bool {
    FAULT_MARKERS.iter().any(|m| body.contains(m))
}

/// Path component used as the Digest `uri`
fn request_uri(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| Error::Input(format!("invalid URL '{}': {}", url, e)))?;
    let mut uri = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        uri.push('?');
        uri.push_str(query);
    }
    Ok(uri)
}

/// Single-call SOAP client over a pluggable transport
#[derive(Clone)]
pub struct SoapClient {
    transport: Arc<dyn SoapTransport>,
}

impl SoapClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new(config)?)))
    }

    pub fn with_transport(transport: Arc<dyn SoapTransport>) -> Self {
        Self { transport }
    }

    /// Issue one operation and return the decoded response element
    pub async fn call(
        &self,
        url: &str,
        operation: &Operation,
        auth: &AuthDirective,
    ) -> Result<XmlElement> {
        let reply = self.exchange(url, operation, auth).await?;
        classify(&reply)?;
        response::body_element(&reply.body, operation.response_element())
    }

    /// POST the envelope, answering a Digest challenge at most once
    async fn exchange(
        &self,
        url: &str,
        operation: &Operation,
        auth: &AuthDirective,
    ) -> Result<HttpReply> {
        let token = match auth {
            AuthDirective::WsSecurity(cred) => {
                Some(UsernameToken::generate(&cred.username, &cred.password))
            }
            _ => None,
        };
        let body = build_envelope(operation, token.as_ref());
        let authorization = match auth {
            AuthDirective::Basic(cred) => {
                Some(digest::basic_authorization(&cred.username, &cred.password))
            }
            _ => None,
        };

        let reply = self
            .transport
            .post(SoapRequest {
                url: url.to_string(),
                body: body.clone(),
                authorization,
            })
            .await?;

        let cred = match auth {
            AuthDirective::Digest(cred) if reply.status == 401 => cred,
            _ => return Ok(reply),
        };

        let header = reply.www_authenticate.as_deref().unwrap_or_default();
        let challenge = DigestChallenge::parse(header).ok_or_else(|| {
            Error::DigestUnsupported(if header.is_empty() {
                "401 without WWW-Authenticate".to_string()
            } else {
                header.to_string()
            })
        })?;

        let uri = request_uri(url)?;
        let authorization = digest::http_digest_authorization(
            &cred.username,
            &cred.password,
            "POST",
            &uri,
            &challenge,
        );
        tracing::debug!(url = %url, realm = %challenge.realm, "Answering digest challenge");

        let retry = self
            .transport
            .post(SoapRequest {
                url: url.to_string(),
                body,
                authorization: Some(authorization),
            })
            .await?;
        if retry.status == 401 {
            return Err(Error::Auth("digest credentials rejected".to_string()));
        }
        Ok(retry)
    }
}

/// Status/fault classification shared with the range scanner
pub fn classify(reply: &HttpReply) -> Result<()> {
    if reply.status == 401 {
        return Err(Error::Auth("HTTP 401 Unauthorized".to_string()));
    }
    if has_fault_marker(&reply.body) {
        return Err(Error::Auth(format!("SOAP fault (HTTP {})", reply.status)));
    }
    if reply.status != 200 {
        return Err(Error::Transport(format!("HTTP {}", reply.status)));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport shared by unit tests across modules

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{HttpReply, SoapRequest, SoapTransport};
    use crate::error::Result;

    pub const DEVICE_INFO_BODY: &str = r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl"><s:Body><tds:GetDeviceInformationResponse><tds:Manufacturer>Acme</tds:Manufacturer><tds:Model>CAM-9</tds:Model><tds:FirmwareVersion>1.0</tds:FirmwareVersion><tds:SerialNumber>SN1</tds:SerialNumber><tds:HardwareId>HW</tds:HardwareId></tds:GetDeviceInformationResponse></s:Body></s:Envelope>"#;

    pub fn reply(status: u16, body: &str) -> HttpReply {
        HttpReply {
            status,
            www_authenticate: None,
            body: body.to_string(),
        }
    }

    /// Returns queued replies in order and records every request
    #[derive(Default)]
    pub struct ScriptedTransport {
        pub replies: Mutex<VecDeque<HttpReply>>,
        pub requests: Mutex<Vec<SoapRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(replies: Vec<HttpReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    type Responder = Box<dyn Fn(&SoapRequest) -> HttpReply + Send + Sync>;

    /// Answers each request with a closure and records it
    pub struct FnTransport {
        respond: Responder,
        requests: Mutex<Vec<SoapRequest>>,
    }

    impl FnTransport {
        pub fn new(respond: impl Fn(&SoapRequest) -> HttpReply + Send + Sync + 'static) -> Self {
            Self {
                respond: Box::new(respond),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<SoapRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SoapTransport for FnTransport {
        async fn post(&self, request: SoapRequest) -> Result<HttpReply> {
            let reply = (self.respond)(&request);
            self.requests.lock().unwrap().push(request);
            Ok(reply)
        }
    }

    #[async_trait]
    impl SoapTransport for ScriptedTransport {
        async fn post(&self, request: SoapRequest) -> Result<HttpReply> {
            self.requests.lock().unwrap().push(request);
            Ok(self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| reply(500, "")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{reply, ScriptedTransport, DEVICE_INFO_BODY};
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Credential;

    const URL: &str = "http://10.0.0.5:80/onvif/device_service";

    fn client(t: &Arc<ScriptedTransport>) -> SoapClient {
        SoapClient::with_transport(t.clone())
    }

    #[tokio::test]
    async fn test_success() {
        let t = Arc::new(ScriptedTransport::new(vec![reply(200, DEVICE_INFO_BODY)]));
        let el = client(&t)
            .call(URL, &Operation::GetDeviceInformation, &AuthDirective::None)
            .await
            .unwrap();
        assert_eq!(el.child_text("Model").as_deref(), Some("CAM-9"));
        let requests = t.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].authorization.is_none());
        assert!(!requests[0].body.contains("wsse:Security"));
    }

    #[tokio::test]
    async fn test_classification() {
        let cases = vec![
            (reply(401, ""), ErrorKind::Auth),
            (
                reply(400, "<s:Envelope><s:Body><s:Fault>NotAuthorized</s:Fault></s:Body></s:Envelope>"),
                ErrorKind::Auth,
            ),
            (reply(200, "<env:Fault>Sender not Authorized</env:Fault>"), ErrorKind::Auth),
            (reply(404, "not found"), ErrorKind::Transport),
            (reply(200, "<s:Envelope><s:Body></s:Body></s:Envelope>"), ErrorKind::Parse),
        ];
        for (r, kind) in cases {
            let t = Arc::new(ScriptedTransport::new(vec![r]));
            let err = client(&t)
                .call(URL, &Operation::GetDeviceInformation, &AuthDirective::None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), kind, "{}", err);
        }
    }

    #[tokio::test]
    async fn test_wsse_and_basic_headers() {
        let cred = Credential::new("admin", "12345");
        let t = Arc::new(ScriptedTransport::new(vec![
            reply(200, DEVICE_INFO_BODY),
            reply(200, DEVICE_INFO_BODY),
        ]));
        let c = client(&t);
        c.call(URL, &Operation::GetDeviceInformation, &AuthDirective::WsSecurity(cred.clone()))
            .await
            .unwrap();
        c.call(URL, &Operation::GetDeviceInformation, &AuthDirective::Basic(cred))
            .await
            .unwrap();
        let requests = t.requests.lock().unwrap();
        assert!(requests[0].body.contains("<wsse:Username>admin</wsse:Username>"));
        assert!(requests[0].authorization.is_none());
        assert_eq!(requests[1].authorization.as_deref(), Some("Basic YWRtaW46MTIzNDU="));
        assert!(!requests[1].body.contains("wsse:Security"));
    }

    #[tokio::test]
    async fn test_digest_single_retry() {
        let mut challenge = reply(401, "");
        challenge.www_authenticate = Some(r#"Digest realm="x", nonce="y", qop="auth""#.into());
        let t = Arc::new(ScriptedTransport::new(vec![challenge.clone(), challenge]));
        let err = client(&t)
            .call(
                URL,
                &Operation::GetDeviceInformation,
                &AuthDirective::Digest(Credential::new("a", "b")),
            )
            .await
            .unwrap_err();
        assert!(err.is_auth());
        let requests = t.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let auth = requests[1].authorization.as_deref().unwrap();
        assert!(auth.contains(r#"uri="/onvif/device_service""#));
        assert!(auth.contains("nc=00000001"));
    }

    #[tokio::test]
    async fn test_digest_unsupported_challenge() {
        let mut challenge = reply(401, "");
        challenge.www_authenticate = Some(r#"Basic realm="x""#.into());
        let t = Arc::new(ScriptedTransport::new(vec![challenge]));
        let err = client(&t)
            .call(
                URL,
                &Operation::GetDeviceInformation,
                &AuthDirective::Digest(Credential::new("a", "b")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DigestUnsupported(_)));
        assert_eq!(t.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_request_uri() {
        assert_eq!(
            request_uri("http://h:80/onvif/device_service").unwrap(),
            "/onvif/device_service"
        );
        assert_eq!(request_uri("http://h/a?b=c").unwrap(), "/a?b=c");
        assert!(request_uri("nope").is_err());
    }
}
