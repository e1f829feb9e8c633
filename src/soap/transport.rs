//! HTTP transport seam
//!
//! The SOAP client only needs "POST this body, give me status, challenge and
//! body back". Keeping that behind a trait lets the scanner and negotiator be
//! driven by stub devices in tests.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};

use crate::config::ClientConfig;
use crate::error::Result;

pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// One outgoing POST
#[derive(Debug, Clone)]
pub struct SoapRequest {
    pub url: String,
    pub body: String,
    /// Value for the `Authorization` header, if any
    pub authorization: Option<String>,
}

/// What came back
#[derive(Debug, Clone, Default)]
pub struct HttpReply {
    pub status: u16,
    pub www_authenticate: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn post(&self, request: SoapRequest) -> Result<HttpReply>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SoapTransport for HttpTransport {
    async fn post(&self, request: SoapRequest) -> Result<HttpReply> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(request.body);
        if let Some(auth) = request.authorization {
            builder = builder.header(AUTHORIZATION, auth);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let www_authenticate = resp
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.trim_start().to_ascii_lowercase().starts_with("digest"))
            .or_else(|| {
                resp.headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
            })
            .map(|v| v.to_string());
        let body = resp.text().await?;

        Ok(HttpReply {
            status,
            www_authenticate,
            body,
        })
    }
}
