//! onvif-scout
//!
//! ONVIF camera discovery and authentication client.
//!
//! ## Components (leaves first)
//!
//! 1. digest - WS-Security PasswordDigest and HTTP Digest/Basic values
//! 2. soap - envelope builder, HTTP transport, response classification
//! 3. negotiator - credential x scheme ladder (none, wsse, digest, basic)
//! 4. discovery - WS-Discovery multicast probe and range scanner
//! 5. device_info - device metadata, service XAddrs, media channels
//!
//! Control flow: discovery -> Candidate -> DeviceInfoManager -> Negotiator
//! -> SoapClient -> digest. The resulting [`negotiator::DeviceSession`] is
//! what further SOAP operations reuse without renegotiating.

pub mod config;
pub mod device_info;
pub mod digest;
pub mod discovery;
pub mod error;
pub mod models;
pub mod negotiator;
pub mod report;
pub mod soap;

pub use config::DiscoveryConfig;
pub use error::{Error, Result};
pub use models::{AuthScheme, Candidate, Credential};
