//! Host name resolution used by the network range check

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

/// Resolves a host name into the addresses a renderer would connect to
#[derive(Debug, Clone, Default)]
pub enum HostResolver {
    /// System resolver via `tokio::net::lookup_host`
    #[default]
    System,
    /// Fixed table; hosts absent from it fail to resolve
    Static(HashMap<String, Vec<IpAddr>>),
}

impl HostResolver {
    /// Build a static resolver from `(host, addresses)` pairs
    pub fn fixed<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<IpAddr>)>,
        S: Into<String>,
    {
        Self::Static(
            entries
                .into_iter()
                .map(|(host, addrs)| (host.into().to_ascii_lowercase(), addrs))
                .collect(),
        )
    }

    /// Resolve `host`
    ///
    /// An empty answer is reported as an error.
    pub async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = match self {
            Self::System => tokio::net::lookup_host((host, 0))
                .await?
                .map(|addr| addr.ip())
                .collect::<Vec<_>>(),
            Self::Static(table) => table
                .get(&host.to_ascii_lowercase())
                .cloned()
                .unwrap_or_default(),
        };

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for host '{host}'"),
            ));
        }
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = HostResolver::fixed([("Intranet.corp", vec!["10.0.0.5".parse().unwrap()])]);
        let addrs = resolver.resolve("intranet.corp").await.unwrap();
        assert_eq!(addrs, vec!["10.0.0.5".parse::<IpAddr>().unwrap()]);
        assert!(resolver.resolve("unknown.corp").await.is_err());
    }
}
