//! SOAP 1.2 envelope builder
//!
//! One builder for every operation and auth variant: the operation supplies
//! the body payload, the auth directive decides whether a WS-Security header
//! is emitted.

use quick_xml::escape::escape;

use crate::digest::UsernameToken;
use crate::models::{AuthScheme, Credential};

const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
const NS_DEVICE: &str = "http://www.onvif.org/ver10/device/wsdl";
const NS_MEDIA: &str = "http://www.onvif.org/ver10/media/wsdl";
const NS_SCHEMA: &str = "http://www.onvif.org/ver10/schema";
const NS_WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
const NS_WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
const PASSWORD_DIGEST_TYPE: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest";
const NONCE_ENCODING: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

/// SOAP operation payload plus the element expected in a successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    GetDeviceInformation,
    GetCapabilities,
    GetProfiles,
    GetStreamUri { profile_token: String },
    /// Raw body payload for operations outside the discovery core
    Custom {
        payload: String,
        response_element: String,
    },
}

impl Operation {
    pub fn payload(&self) -> String {
        match self {
            Operation::GetDeviceInformation => "<tds:GetDeviceInformation/>".to_string(),
            Operation::GetCapabilities => {
                "<tds:GetCapabilities><tds:Category>All</tds:Category></tds:GetCapabilities>"
                    .to_string()
            }
            Operation::GetProfiles => "<trt:GetProfiles/>".to_string(),
            Operation::GetStreamUri { profile_token } => format!(
                "<trt:GetStreamUri>\
                 <trt:StreamSetup>\
                 <tt:Stream>RTP-Unicast</tt:Stream>\
                 <tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport>\
                 </trt:StreamSetup>\
                 <trt:ProfileToken>{}</trt:ProfileToken>\
                 </trt:GetStreamUri>",
                escape(profile_token.as_str())
            ),
            Operation::Custom { payload, .. } => payload.clone(),
        }
    }

    /// Local name of the element a successful response carries in its Body
    pub fn response_element(&self) -> &str {
        match self {
            Operation::GetDeviceInformation => "GetDeviceInformationResponse",
            Operation::GetCapabilities => "GetCapabilitiesResponse",
            Operation::GetProfiles => "GetProfilesResponse",
            Operation::GetStreamUri { .. } => "GetStreamUriResponse",
            Operation::Custom {
                response_element, ..
            } => response_element,
        }
    }

    pub fn name(&self) -> &str {
        self.response_element()
            .strip_suffix("Response")
            .unwrap_or(self.response_element())
    }
}

/// Which authentication a single request carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDirective {
    None,
    WsSecurity(Credential),
    Digest(Credential),
    Basic(Credential),
}

impl AuthDirective {
    pub fn new(scheme: AuthScheme, credential: &Credential) -> Self {
        match scheme {
            AuthScheme::None => AuthDirective::None,
            AuthScheme::WsSecurity => AuthDirective::WsSecurity(credential.clone()),
            AuthScheme::Digest => AuthDirective::Digest(credential.clone()),
            AuthScheme::Basic => AuthDirective::Basic(credential.clone()),
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        match self {
            AuthDirective::None => AuthScheme::None,
            AuthDirective::WsSecurity(_) => AuthScheme::WsSecurity,
            AuthDirective::Digest(_) => AuthScheme::Digest,
            AuthDirective::Basic(_) => AuthScheme::Basic,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        match self {
            AuthDirective::None => None,
            AuthDirective::WsSecurity(c) | AuthDirective::Digest(c) | AuthDirective::Basic(c) => {
                Some(c)
            }
        }
    }
}

fn security_header(token: &UsernameToken) -> String {
    format!(
        "<wsse:Security s:mustUnderstand=\"1\" xmlns:wsse=\"{}\" xmlns:wsu=\"{}\">\
         <wsse:UsernameToken>\
         <wsse:Username>{}</wsse:Username>\
         <wsse:Password Type=\"{}\">{}</wsse:Password>\
         <wsse:Nonce EncodingType=\"{}\">{}</wsse:Nonce>\
         <wsu:Created>{}</wsu:Created>\
         </wsse:UsernameToken>\
         </wsse:Security>",
        NS_WSSE,
        NS_WSU,
        escape(token.username.as_str()),
        PASSWORD_DIGEST_TYPE,
        token.password_digest,
        NONCE_ENCODING,
        token.nonce_b64,
        token.created
    )
}

/// Build a complete envelope. `token` is only present for WS-Security requests.
pub fn build_envelope(operation: &Operation, token: Option<&UsernameToken>) -> String {
    let header = match token {
        Some(token) => format!("<s:Header>{}</s:Header>", security_header(token)),
        None => String::new(),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <s:Envelope xmlns:s=\"{}\" xmlns:tds=\"{}\" xmlns:trt=\"{}\" xmlns:tt=\"{}\">\
         {}<s:Body>{}</s:Body></s:Envelope>",
        NS_SOAP,
        NS_DEVICE,
        NS_MEDIA,
        NS_SCHEMA,
        header,
        operation.payload()
    )
}
