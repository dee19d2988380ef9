//! IP-literal detection and apex-domain equivalence.

use addr::parse_domain_name;

pub fn is_ip_address(host: &str) -> bool {
    host.parse::<std::net::IpAddr>().is_ok()
}

/// True if `a` and `b` are DNS names sharing the same registered-domain
/// label (e.g. `api.baidu.com` and `www.baidu.com` both reduce to `baidu`).
/// IP-literal hosts never participate.
pub fn is_same_apex_domain(a: &str, b: &str) -> bool {
    if is_ip_address(a) || is_ip_address(b) {
        return false;
    }
    match (registered_domain_label(a), registered_domain_label(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn registered_domain_label(host: &str) -> Option<String> {
    let name = parse_domain_name(host).ok()?;
    name.root().map(|root| root.to_string())
}
