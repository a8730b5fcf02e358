//! Helpers for `host@backend#pool` identity strings.

/// Pool name used when a backend reports no `pools` list.
pub const DEFAULT_POOL_NAME: &str = "_pool0";

/// Granularity at which to read an identity string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostLevel {
    /// `host`
    Host,
    /// `host@backend`
    Backend,
    /// `pool`
    Pool,
}

/// Extract one level of a `host@backend#pool` string.
///
/// For [`HostLevel::Pool`] this returns `None` when the string has no pool
/// part.
pub fn extract_host(host: &str, level: HostLevel) -> Option<String> {
    match level {
        HostLevel::Host => {
            let backend = host.split('#').next().unwrap_or(host);
            Some(backend.split('@').next().unwrap_or(backend).to_string())
        }
        HostLevel::Backend => Some(host.split('#').next().unwrap_or(host).to_string()),
        HostLevel::Pool => host.split_once('#').map(|(_, pool)| pool.to_string()),
    }
}

/// Build a pool identity from a backend identity and a pool name.
pub fn append_pool(backend_id: &str, pool_name: &str) -> String {
    format!("{backend_id}#{pool_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_each_level() {
        let id = "node1@lvm#fast";
        assert_eq!(extract_host(id, HostLevel::Host).as_deref(), Some("node1"));
        assert_eq!(extract_host(id, HostLevel::Backend).as_deref(), Some("node1@lvm"));
        assert_eq!(extract_host(id, HostLevel::Pool).as_deref(), Some("fast"));
    }

    #[test]
    fn missing_parts() {
        assert_eq!(extract_host("node1", HostLevel::Backend).as_deref(), Some("node1"));
        assert_eq!(extract_host("node1@lvm", HostLevel::Pool), None);
        assert_eq!(extract_host("node1#p", HostLevel::Host).as_deref(), Some("node1"));
    }

    #[test]
    fn append_pool_round_trips() {
        let id = append_pool("node1@lvm", DEFAULT_POOL_NAME);
        assert_eq!(id, "node1@lvm#_pool0");
        assert_eq!(extract_host(&id, HostLevel::Pool).as_deref(), Some(DEFAULT_POOL_NAME));
    }
}
