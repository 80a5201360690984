//! Peer-address allow/deny gate (tinyproxy `acl.c`).
//!
//! Deny entries are checked first, then allow entries; an empty allow
//! list means "allow everyone not explicitly denied", matching
//! tinyproxy's default-permissive posture when no `Allow` directives are
//! configured. CIDR parsing follows `ipnet`, as used for address-range
//! matching in the retrieval pack's other proxy/gateway manifests.

use std::net::IpAddr;

use ipnet::IpNet;

pub struct Acl {
    enabled: bool,
    allow: Vec<IpNet>,
    deny: Vec<IpNet>,
}

impl Acl {
    pub fn new(enabled: bool, allow: &[String], deny: &[String]) -> Self {
        Acl {
            enabled,
            allow: allow.iter().filter_map(|s| parse_net(s)).collect(),
            deny: deny.iter().filter_map(|s| parse_net(s)).collect(),
        }
    }

    /// `true` when `peer` may proceed.
    pub fn check(&self, peer: IpAddr) -> bool {
        if !self.enabled {
            return true;
        }
        if self.deny.iter().any(|net| net.contains(&peer)) {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|net| net.contains(&peer))
    }
}

fn parse_net(s: &str) -> Option<IpNet> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net);
    }
    s.parse::<IpAddr>().ok().map(IpNet::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_acl_allows_everyone() {
        let acl = Acl::new(false, &[], &["0.0.0.0/0".to_string()]);
        assert!(acl.check("203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn deny_wins_over_allow() {
        let acl = Acl::new(
            true,
            &["10.0.0.0/8".to_string()],
            &["10.0.0.5/32".to_string()],
        );
        assert!(!acl.check("10.0.0.5".parse().unwrap()));
        assert!(acl.check("10.0.0.6".parse().unwrap()));
    }

    #[test]
    fn empty_allow_list_permits_anyone_not_denied() {
        let acl = Acl::new(true, &[], &["192.168.1.1/32".to_string()]);
        assert!(acl.check("198.51.100.1".parse().unwrap()));
        assert!(!acl.check("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn non_empty_allow_list_restricts_to_members() {
        let acl = Acl::new(true, &["127.0.0.1/32".to_string()], &[]);
        assert!(acl.check("127.0.0.1".parse().unwrap()));
        assert!(!acl.check("8.8.8.8".parse().unwrap()));
    }
}
