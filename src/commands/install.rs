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

//! The install workflow: create the collection user and install an SSH
//! public key on every discovered non-loopback host.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::cli::Cli;
use crate::dial::{Dialer, SessionMode, SshDialer};
use crate::discovery::discover_child_hosts;
use crate::dispatch::run_remote_command;
use crate::manifest::Manifest;
use crate::quote::shell_quote;

/// The account created on each child host.
const COLLECT_USER: &str = "arbor-collect";

/// Builds the provisioning script run on each host via `sudo -n`. Creates
/// the collection user when absent, its `~/.ssh`, and appends the public
/// key to `authorized_keys` with owner-only modes.
pub fn install_command(public_key: &str) -> String {
    let key_arg = shell_quote(public_key);
    let script = format!(
        "u={COLLECT_USER}; \
         if ! id -u \"$u\" >/dev/null 2>&1; then \
         (useradd -m -s /bin/bash \"$u\" 2>/dev/null || adduser --disabled-password --gecos '' \"$u\"); fi; \
         home=$(getent passwd \"$u\" | cut -d: -f6); [ -n \"$home\" ] || home=/home/$u; \
         install -d -m 700 -o \"$u\" -g \"$u\" \"$home/.ssh\"; \
         printf '%s\\n' {key_arg} >> \"$home/.ssh/authorized_keys\"; \
         chown -R \"$u\":\"$u\" \"$home/.ssh\"; \
         chmod 600 \"$home/.ssh/authorized_keys\""
    );
    format!("sudo -n /bin/sh -c {}", shell_quote(&script))
}

fn is_loopback(host: &str) -> bool {
    host == "::1" || host.starts_with("127.")
}

/// Runs the install workflow: discover from the leader, then provision
/// each non-loopback host over a direct connection. Per-host failures are
/// counted and the run fails when any host failed.
pub async fn execute_install(
    public_key: &str,
    timeout: Duration,
    dialer: &dyn Dialer,
) -> Result<()> {
    let leader = dialer
        .dial_leader()
        .await
        .context("ssh connection to leader failed")?;
    let discovery = discover_child_hosts(leader.clone(), timeout).await;
    leader.shutdown().await;

    // Salvage addresses from the raw bytes even when the discovery
    // command itself reported an error.
    let hosts = discovery
        .hosts
        .unwrap_or_else(|| crate::discovery::parse_host_ips(&discovery.raw.output));
    let targets: Vec<&String> = hosts.iter().filter(|h| !is_loopback(h)).collect();
    if targets.is_empty() {
        tracing::warn!("no non-loopback hosts discovered; nothing to install");
        return Ok(());
    }

    let command = install_command(public_key);
    let mut failures = 0usize;
    for host in targets {
        let client = match dialer.dial_host(host).await {
            Ok(c) => c,
            Err(err) => {
                failures += 1;
                tracing::error!("host {host}: dial failed: {err:#}");
                continue;
            }
        };
        let result = run_remote_command(client.clone(), command.clone(), timeout).await;
        client.shutdown().await;
        if result.error.is_some() || result.exit_code != 0 {
            failures += 1;
            match &result.error {
                Some(err) => tracing::error!("host {host}: install error: {err}"),
                None => tracing::error!("host {host}: install exit code {}", result.exit_code),
            }
            if !result.output.is_empty() {
                tracing::error!(
                    "host {host} output: {}",
                    String::from_utf8_lossy(&result.output)
                );
            }
            continue;
        }
        tracing::info!("host {host}: {COLLECT_USER} key installed");
    }

    if failures > 0 {
        bail!("install completed with {failures} failures");
    }
    Ok(())
}

/// CLI entry point for `arbor-collect install`.
pub async fn cmd_install(cli: &Cli, pubkey_path: &Path) -> Result<()> {
    let manifest_path = cli.require_manifest()?;
    let mf = Manifest::load(manifest_path).context("failed to read manifest")?;
    let (target, user) = cli.resolve_leader(&mf, false)?;

    let public_key = std::fs::read_to_string(pubkey_path)
        .with_context(|| format!("read public key at {}", pubkey_path.display()))?;
    let public_key = public_key.trim();
    if public_key.is_empty() {
        bail!("public key file is empty: {}", pubkey_path.display());
    }

    let dialer = SshDialer::new(
        cli.connect_options(target, user),
        SessionMode::PersistentShell,
    );
    execute_install(public_key, cli.cmd_timeout, &dialer).await
}
