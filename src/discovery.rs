// Copyright 2025 the arbor-collect authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Child host discovery from the leader's host table.

use std::collections::HashSet;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{run_remote_command, ExecutionResult};
use crate::session::SessionClient;

/// The command run on the leader to obtain its host table.
pub const DISCOVERY_COMMAND: &str = "cat /etc/hosts";

/// The raw discovery run plus the parsed host list. `hosts` is `None` when
/// the command itself failed; the raw output is kept either way so callers
/// can report or salvage it.
#[derive(Debug)]
pub struct Discovery {
    pub raw: ExecutionResult,
    pub hosts: Option<Vec<String>>,
}

/// Reads the leader's host table and extracts the child host addresses.
pub async fn discover_child_hosts(
    client: Arc<dyn SessionClient>,
    timeout: Duration,
) -> Discovery {
    let raw = run_remote_command(client, DISCOVERY_COMMAND.to_string(), timeout).await;
    let hosts = if raw.error.is_none() {
        let hosts = parse_host_ips(&raw.output);
        tracing::info!("discovered {} child hosts", hosts.len());
        Some(hosts)
    } else {
        tracing::warn!("discovery command failed: {:?}", raw.error);
        None
    };
    Discovery { raw, hosts }
}

/// Extracts IP addresses from hosts(5)-format text: blank lines and
/// comments are skipped, inline comments stripped, and the first
/// whitespace-separated field of each remaining line is kept when it
/// parses as an IPv4 or IPv6 address. Order is preserved, duplicates
/// dropped.
pub fn parse_host_ips(content: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(content);
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    for line in text.lines() {
        let line = match line.find('#') {
            Some(i) => &line[..i],
            None => line,
        };
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        if IpAddr::from_str(first).is_err() {
            continue;
        }
        if seen.insert(first.to_string()) {
            hosts.push(first.to_string());
        }
    }
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_typical_host_table() {
        let table = b"\
127.0.0.1 localhost
# cluster nodes
10.0.0.1 node-a
10.0.0.2 node-b # spare
10.0.0.1 node-a-alias

::1 ip6-localhost
not-an-ip something
";
        assert_eq!(
            parse_host_ips(table),
            vec!["127.0.0.1", "10.0.0.1", "10.0.0.2", "::1"]
        );
    }

    #[test]
    fn preserves_first_seen_order_across_duplicates() {
        let table = b"10.0.0.2 b\n10.0.0.1 a\n10.0.0.2 b2\n";
        assert_eq!(parse_host_ips(table), vec!["10.0.0.2", "10.0.0.1"]);
    }

    #[test]
    fn ignores_comment_only_and_blank_lines() {
        assert!(parse_host_ips(b"# nothing here\n\n   \n").is_empty());
    }

    #[test]
    fn inline_comment_does_not_hide_the_address() {
        assert_eq!(parse_host_ips(b"10.1.1.1#host\n"), vec!["10.1.1.1"]);
    }

    #[test]
    fn non_utf8_bytes_do_not_panic() {
        let mut table = b"10.0.0.9 ok\n".to_vec();
        table.extend_from_slice(&[0xff, 0xfe, b'\n']);
        assert_eq!(parse_host_ips(&table), vec!["10.0.0.9"]);
    }
}
