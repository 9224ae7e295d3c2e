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

//! The default workflow: run the manifest against the leader only, one
//! exec session per command, writing a delimited plain-text report.

use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::cli::Cli;
use crate::dial::{Dialer, SessionMode, SshDialer};
use crate::dispatch::run_remote_command;
use crate::manifest::Manifest;
use crate::report::{write_text_header, write_text_section};

/// Runs every manifest command against the leader, streaming sections to
/// `out` as they complete. The header is written before dialing so a
/// connection failure still leaves an identifiable report stub.
pub async fn execute_collect(
    mf: &Manifest,
    default_timeout: Duration,
    dialer: &dyn Dialer,
    out: &mut impl Write,
) -> Result<()> {
    write_text_header(out, mf)?;

    let mut client = dialer.dial_leader().await?;

    let total = mf.commands.len();
    for (i, entry) in mf.commands.iter().enumerate() {
        tracing::info!("[{}/{}] {}", i + 1, total, entry.line());

        let timeout = entry.timeout_or(default_timeout);
        let result = run_remote_command(client.clone(), entry.line(), timeout).await;
        write_text_section(out, entry, &result, timeout)
            .context("failed to write command section")?;

        if result.connection_lost() {
            tracing::warn!("connection lost; reconnecting to the leader");
            client.shutdown().await;
            client = dialer
                .dial_leader()
                .await
                .context("reconnect failed after timeout")?;
        }
    }

    client.shutdown().await;
    Ok(())
}

/// CLI entry point for the default (no subcommand) invocation.
pub async fn cmd_collect(cli: &Cli) -> Result<()> {
    let Some(target) = cli.target.clone().filter(|t| !t.trim().is_empty()) else {
        bail!("--target is required (FQDN/IP:port)");
    };
    let Some(user) = cli.user.clone().filter(|u| !u.trim().is_empty()) else {
        bail!("--user is required for SSH authentication");
    };
    if user.trim() == "admin" {
        bail!("the admin account must not be used for collection");
    }
    let manifest_path = cli.require_manifest()?;
    let out_path = cli.require_out()?;

    let mf = Manifest::load(manifest_path).context("failed to read manifest")?;
    if mf.commands.is_empty() {
        bail!("manifest contains no commands");
    }

    if let Some(dir) = out_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).context("failed to create output dir")?;
    }
    let mut out_file =
        std::fs::File::create(out_path).context("failed to create output file")?;

    let dialer = SshDialer::new(cli.connect_options(target, user), SessionMode::Exec);
    execute_collect(&mf, cli.cmd_timeout, &dialer, &mut out_file).await?;
    tracing::info!("done, output written to {}", out_path.display());
    Ok(())
}
