//! Target collection: explicit targets, target files and CIDR expansion.

use std::net::Ipv4Addr;
use std::path::Path;

use contracts::Scheme;
use ipnetwork::IpNetwork;
use tracing::{debug, info};

use crate::cli::ScanArgs;
use crate::error::{CliError, Result};

/// Smallest accepted CIDR prefix (/16 = 65534 hosts)
const MIN_PREFIX: u8 = 16;

/// Gather every raw target named on the command line, in order:
/// `--target`, then `--file`, then `--cidr`.
pub fn collect_targets(args: &ScanArgs, scheme: Scheme) -> Result<Vec<String>> {
    let mut targets = args.targets.clone();

    if let Some(path) = &args.file {
        let from_file = read_target_file(path)?;
        info!(path = %path.display(), count = from_file.len(), "Targets loaded from file");
        targets.extend(from_file);
    }

    for cidr in &args.cidr {
        let expanded = expand_cidr(cidr, &args.ports, scheme)?;
        info!(cidr = %cidr, count = expanded.len(), "Targets expanded from CIDR");
        targets.extend(expanded);
    }

    if targets.is_empty() {
        return Err(CliError::NoTargets);
    }
    Ok(targets)
}

/// One target per line; blank lines and `#` comments are skipped
pub fn read_target_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::TargetFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_target_lines(&content))
}

fn parse_target_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Expand an IPv4 network into `host × port` targets
///
/// Network and broadcast addresses are dropped when the prefix leaves
/// more than two addresses.
pub fn expand_cidr(cidr: &str, ports: &[u16], scheme: Scheme) -> Result<Vec<String>> {
    let network: IpNetwork = cidr
        .trim()
        .parse()
        .map_err(|e: ipnetwork::IpNetworkError| CliError::invalid_cidr(cidr, e.to_string()))?;

    let IpNetwork::V4(network) = network else {
        return Err(CliError::invalid_cidr(cidr, "only IPv4 networks are supported"));
    };
    if network.prefix() < MIN_PREFIX {
        return Err(CliError::invalid_cidr(
            cidr,
            format!("prefix must be /{MIN_PREFIX} or longer"),
        ));
    }

    let mut hosts: Vec<Ipv4Addr> = network.iter().collect();
    if hosts.len() > 2 {
        hosts.remove(0);
        hosts.pop();
    }
    debug!(cidr = %network, hosts = hosts.len(), "CIDR expanded");

    Ok(hosts
        .iter()
        .flat_map(|ip| ports.iter().map(move |&port| target_for(*ip, port, scheme)))
        .collect())
}

/// URL for a host/port pair: 80 is http, 443 is https, anything else
/// uses `scheme` with an explicit port.
fn target_for(ip: Ipv4Addr, port: u16, scheme: Scheme) -> String {
    match port {
        80 => format!("http://{ip}"),
        443 => format!("https://{ip}"),
        _ => format!("{}://{ip}:{port}", scheme.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    use crate::cli::{Cli, Commands};

    fn scan_args(argv: &[&str]) -> ScanArgs {
        let mut full = vec!["snir", "scan"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Scan(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_expand_cidr_skips_network_and_broadcast() {
        let targets = expand_cidr("192.0.2.0/30", &[80, 443], Scheme::Https).unwrap();
        assert_eq!(
            targets,
            vec![
                "http://192.0.2.1",
                "https://192.0.2.1",
                "http://192.0.2.2",
                "https://192.0.2.2",
            ]
        );
    }

    #[test]
    fn test_expand_cidr_other_ports_use_scheme() {
        let targets = expand_cidr("192.0.2.7/32", &[8080], Scheme::Http).unwrap();
        assert_eq!(targets, vec!["http://192.0.2.7:8080"]);
    }

    #[test]
    fn test_expand_cidr_rejects_bad_input() {
        assert!(matches!(
            expand_cidr("not-a-cidr", &[80], Scheme::Https),
            Err(CliError::InvalidCidr { .. })
        ));
        assert!(matches!(
            expand_cidr("2001:db8::/120", &[80], Scheme::Https),
            Err(CliError::InvalidCidr { .. })
        ));
        assert!(matches!(
            expand_cidr("10.0.0.0/8", &[80], Scheme::Https),
            Err(CliError::InvalidCidr { .. })
        ));
    }

    #[test]
    fn test_parse_target_lines() {
        let content = "# targets\nexample.com\n\n  https://example.org  \n#skip.me\n";
        assert_eq!(
            parse_target_lines(content),
            vec!["example.com", "https://example.org"]
        );
    }

    #[test]
    fn test_collect_targets_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from-file.example").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = scan_args(&[
            "-t",
            "first.example",
            "-f",
            &path,
            "--cidr",
            "198.51.100.4/32",
            "--ports",
            "443",
        ]);
        let targets = collect_targets(&args, Scheme::Https).unwrap();
        assert_eq!(
            targets,
            vec!["first.example", "from-file.example", "https://198.51.100.4"]
        );
    }

    #[test]
    fn test_collect_targets_empty() {
        let args = scan_args(&[]);
        assert!(matches!(
            collect_targets(&args, Scheme::Https),
            Err(CliError::NoTargets)
        ));
    }

    #[test]
    fn test_missing_target_file() {
        let err = read_target_file(Path::new("/nonexistent/targets.txt")).unwrap_err();
        assert!(matches!(err, CliError::TargetFile { .. }));
    }
}
