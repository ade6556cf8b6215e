//! User IP list file loader.
//!
//! Parses black/white list files containing IP addresses and CIDR blocks.
//! Format:
//! - One entry per line
//! - Lines starting with # are comments
//! - Empty lines are ignored
//! - IP addresses: 10.0.0.1 (treated as a /32)
//! - CIDR blocks: 192.168.0.0/24

use std::path::{Path, PathBuf};

use ipnetwork::IpNetwork;
use thiserror::Error;

/// Errors from IP list loading.
#[derive(Debug, Error)]
pub enum IpListError {
    #[error("failed to read ip list file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid entry on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ipnetwork::IpNetworkError,
    },
}

/// Load an IP list from a file.
pub fn load_ip_list(path: &Path) -> Result<Vec<IpNetwork>, IpListError> {
    let content = std::fs::read_to_string(path).map_err(|source| IpListError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_ip_list(&content)
}

/// Parse IP list content from a string.
///
/// This is the core parsing logic, separated for testability.
pub fn parse_ip_list(content: &str) -> Result<Vec<IpNetwork>, IpListError> {
    let mut entries = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        // Skip empty lines and comments
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let network = trimmed
            .parse::<IpNetwork>()
            .map_err(|source| IpListError::Parse {
                line: line_num + 1,
                source,
            })?;
        entries.push(network);
    }

    Ok(entries)
}
