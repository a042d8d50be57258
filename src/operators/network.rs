//! Network operators (@ipMatch).

use super::traits::Operator;
use crate::engine::Transaction;
use crate::error::{Error, Result};
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// IP address list match (@ipMatch).
///
/// The argument is a space- or comma-separated list of addresses and CIDR
/// networks; bare addresses match exactly.
pub struct IpMatch {
    networks: Vec<IpNetwork>,
}

impl IpMatch {
    /// Parse the address list.
    pub fn new(list: &str) -> Result<Self> {
        let mut networks = Vec::new();
        for item in list.split([' ', ',']).map(str::trim).filter(|s| !s.is_empty()) {
            let network = if let Ok(ip) = item.parse::<IpAddr>() {
                IpNetwork::from(ip)
            } else {
                item.parse::<IpNetwork>().map_err(|e| Error::InvalidIp {
                    value: item.to_string(),
                    message: e.to_string(),
                })?
            };
            networks.push(network);
        }
        if networks.is_empty() {
            return Err(Error::InvalidIp {
                value: list.to_string(),
                message: "empty address list".to_string(),
            });
        }
        Ok(Self { networks })
    }
}

impl Operator for IpMatch {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        match value.parse::<IpAddr>() {
            Ok(ip) => self.networks.iter().any(|net| net.contains(ip)),
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "ipMatch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Ruleset, Waf};

    fn tx() -> Transaction {
        Waf::new(Ruleset::new()).transaction()
    }

    #[test]
    fn test_single_address() {
        let mut tx = tx();
        let op = IpMatch::new("192.168.1.1").unwrap();
        assert!(op.evaluate(&mut tx, "192.168.1.1"));
        assert!(!op.evaluate(&mut tx, "192.168.1.2"));
    }

    #[test]
    fn test_cidr() {
        let mut tx = tx();
        let op = IpMatch::new("10.0.0.0/8, 192.168.0.0/16").unwrap();
        assert!(op.evaluate(&mut tx, "10.1.2.3"));
        assert!(op.evaluate(&mut tx, "192.168.44.5"));
        assert!(!op.evaluate(&mut tx, "172.16.0.1"));
    }

    #[test]
    fn test_ipv6() {
        let mut tx = tx();
        let op = IpMatch::new("2001:db8::/32").unwrap();
        assert!(op.evaluate(&mut tx, "2001:db8::1"));
        assert!(!op.evaluate(&mut tx, "2001:db9::1"));
    }

    #[test]
    fn test_garbage_value_is_no_match() {
        let mut tx = tx();
        let op = IpMatch::new("10.0.0.0/8").unwrap();
        assert!(!op.evaluate(&mut tx, "not-an-ip"));
    }

    #[test]
    fn test_invalid_list_rejected() {
        assert!(matches!(IpMatch::new("999.1.2.3"), Err(Error::InvalidIp { .. })));
        assert!(matches!(IpMatch::new(""), Err(Error::InvalidIp { .. })));
    }
}
