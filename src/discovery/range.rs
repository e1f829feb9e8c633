//! IPv4 range enumeration and CIDR conversion

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Inclusive IPv4 range with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    start: u32,
    end: u32,
}

impl IpRange {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        let (s, e) = (u32::from(start), u32::from(end));
        if s > e {
            return Err(Error::Input(format!(
                "start address {} is greater than end address {}",
                start, end
            )));
        }
        Ok(Self { start: s, end: e })
    }

    pub fn single(ip: Ipv4Addr) -> Self {
        let n = u32::from(ip);
        Self { start: n, end: n }
    }

    /// Parse two dotted-quad strings
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_ipv4(start)?, parse_ipv4(end)?)
    }

    /// `a.b.c.d/n` without the network and broadcast addresses, or a bare address
    pub fn from_cidr(cidr: &str) -> Result<Self> {
        let (base, prefix) = match cidr.split_once('/') {
            None => return Ok(Self::single(parse_ipv4(cidr)?)),
            Some(parts) => parts,
        };
        let base = parse_ipv4(base)?;
        let prefix: u8 = prefix
            .trim()
            .parse()
            .map_err(|e| Error::Input(format!("invalid prefix in '{}': {}", cidr, e)))?;
        if prefix > 32 {
            return Err(Error::Input(format!(
                "invalid prefix: {} (must be 0-32)",
                prefix
            )));
        }

        let mask = if prefix == 0 {
            0
        } else {
            !((1u64 << (32 - prefix)) - 1) as u32
        };
        let network = u32::from(base) & mask;
        let broadcast = network | !mask;

        // /31 and /32 have no separate network/broadcast address
        if prefix >= 31 {
            return Ok(Self {
                start: network,
                end: broadcast,
            });
        }
        Ok(Self {
            start: network + 1,
            end: broadcast - 1,
        })
    }

    pub fn start(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.start)
    }

    pub fn end(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.end)
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Ascending addresses
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        (self.start..=self.end).map(Ipv4Addr::from)
    }
}

pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    s.trim()
        .parse()
        .map_err(|e| Error::Input(format!("invalid IPv4 address '{}': {}", s, e)))
}
