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

//! The fanout workflow: discover child hosts from the leader and run the
//! manifest against each one through a persistent shell, producing a YAML
//! report.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cli::Cli;
use crate::dial::{Dialer, SessionMode, SshDialer};
use crate::discovery::{discover_child_hosts, DISCOVERY_COMMAND};
use crate::dispatch::run_remote_command;
use crate::manifest::{CommandEntry, Manifest};
use crate::quote::{shell_quote, shell_quote_forced};
use crate::report::Report;

pub struct RunOptions {
    pub default_timeout: Duration,
    pub noop: bool,
}

pub struct RunOutcome {
    pub report: Report,
    /// The command lines that would have run, present in noop mode.
    pub planned: Option<Vec<String>>,
}

/// Wraps a rendered manifest line for fanout execution. Commands run as
/// the appliance's `admin` user under the manifest-specified shell; the
/// command argument is always single-quoted, even when already safe.
pub fn fanout_command_line(entry: &CommandEntry) -> String {
    format!(
        "sudo -u admin --shell {} -c {}",
        shell_quote(&entry.shell),
        shell_quote_forced(&entry.line())
    )
}

/// Runs the fanout workflow against an already-configured dialer.
///
/// Discovery failure is not fatal: the run degrades to a single
/// empty-string target meaning "the leader itself". A lost connection
/// (command timeout or dead shell) triggers one reconnect attempt per
/// incident; a failed reconnect aborts the run.
pub async fn execute_run(
    mf: &Manifest,
    opts: &RunOptions,
    dialer: &dyn Dialer,
) -> Result<RunOutcome> {
    let mut report = Report::new(mf);

    let mut client = dialer.dial_leader().await?;

    let discovery = discover_child_hosts(client.clone(), opts.default_timeout).await;
    let discovered = discovery.hosts.clone().unwrap_or_default();
    report.set_discovery(
        &discovery.raw.output,
        discovered.clone(),
        !mf.commands.is_empty(),
    );

    if mf.commands.is_empty() {
        client.shutdown().await;
        return Ok(RunOutcome {
            report,
            planned: None,
        });
    }

    if opts.noop {
        client.shutdown().await;
        return Ok(RunOutcome {
            report,
            planned: Some(mf.commands.iter().map(fanout_command_line).collect()),
        });
    }

    let targets = if discovered.is_empty() {
        vec![String::new()]
    } else {
        discovered
    };

    let total = mf.commands.len();
    for host in &targets {
        for (i, entry) in mf.commands.iter().enumerate() {
            let line = fanout_command_line(entry);
            tracing::info!("[{}/{}] {}", i + 1, total, entry.line());

            let timeout = entry.timeout_or(opts.default_timeout);
            let result = run_remote_command(client.clone(), line, timeout).await;
            let lost = result.connection_lost();
            report.add_result(host, entry, &result, timeout);

            if lost {
                tracing::warn!("connection lost; reconnecting to the leader");
                client.shutdown().await;
                client = dialer
                    .dial_leader()
                    .await
                    .context("reconnect failed after timeout")?;
            }
        }
    }

    client.shutdown().await;
    Ok(RunOutcome {
        report,
        planned: None,
    })
}

/// CLI entry point for `arbor-collect run`.
pub async fn cmd_run(cli: &Cli) -> Result<()> {
    let manifest_path = cli.require_manifest()?;
    let out_path = cli.require_out()?;
    let mf = Manifest::load(manifest_path).context("failed to read manifest")?;

    let (target, user) = cli.resolve_leader(&mf, true)?;
    mf.require_shells()?;

    if let Some(dir) = out_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).context("failed to create output dir")?;
    }

    let dialer = SshDialer::new(
        cli.connect_options(target, user),
        SessionMode::PersistentShell,
    );
    let opts = RunOptions {
        default_timeout: cli.cmd_timeout,
        noop: cli.noop,
    };
    let outcome = execute_run(&mf, &opts, &dialer).await?;

    if let Some(planned) = &outcome.planned {
        let path = "debug.out";
        let mut f = std::fs::File::create(path).with_context(|| format!("create {path}"))?;
        writeln!(f, "# Planned commands ({} commands)", planned.len())?;
        writeln!(f, "# Discovery: {DISCOVERY_COMMAND}")?;
        for line in planned {
            writeln!(f, "{line}")?;
        }
        tracing::info!("noop mode: wrote planned commands to {path}");
    }

    let out_file = std::fs::File::create(out_path).context("failed to create output file")?;
    outcome
        .report
        .write_yaml(out_file)
        .context("failed to write YAML report")?;
    tracing::info!("done, output written to {}", out_path.display());
    Ok(())
}
