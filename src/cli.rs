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

//! Command-line interface. Every flag can also be supplied through an
//! `ARBOR_COLLECT_*` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{ArgAction, Parser, Subcommand};
use zeroize::Zeroizing;

use crate::manifest::{parse_duration, Manifest};
use crate::ssh::ConnectOptions;

#[derive(Debug, Parser)]
#[command(
    name = "arbor-collect",
    about = "Manifest-driven command collection for Arbor TMS clusters over SSH",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Leader address as FQDN/IP:port. Falls back to the manifest's
    /// ssh_host for the run and install workflows.
    #[arg(short = 't', long, env = "ARBOR_COLLECT_TARGET", global = true)]
    pub target: Option<String>,

    /// Path to the YAML manifest.
    #[arg(short = 'm', long, env = "ARBOR_COLLECT_MANIFEST", global = true)]
    pub manifest: Option<PathBuf>,

    /// Path of the report file to write.
    #[arg(short = 'o', long, env = "ARBOR_COLLECT_OUT", global = true)]
    pub out: Option<PathBuf>,

    /// SSH user name.
    #[arg(short = 'u', long, env = "ARBOR_COLLECT_USER", global = true)]
    pub user: Option<String>,

    /// SSH password. Prefer the environment variable over the flag.
    #[arg(
        long,
        env = "ARBOR_COLLECT_PASSWORD",
        hide_env_values = true,
        global = true
    )]
    pub password: Option<String>,

    /// Path to an SSH private key file.
    #[arg(long, env = "ARBOR_COLLECT_KEY", global = true)]
    pub key: Option<PathBuf>,

    /// Passphrase for the private key.
    #[arg(
        long,
        env = "ARBOR_COLLECT_PASSPHRASE",
        hide_env_values = true,
        global = true
    )]
    pub passphrase: Option<String>,

    /// known_hosts file used for host key verification.
    #[arg(
        long,
        env = "ARBOR_COLLECT_KNOWN_HOSTS",
        default_value = "~/.ssh/known_hosts",
        global = true
    )]
    pub known_hosts: String,

    /// Verify server host keys against known_hosts (fails closed when the
    /// file is missing). Pass false to accept any host key.
    #[arg(
        long,
        env = "ARBOR_COLLECT_STRICT_HOST_KEY",
        default_value_t = true,
        action = ArgAction::Set,
        global = true
    )]
    pub strict_host_key: bool,

    /// Default per-command timeout (e.g. 30s, 1h30m). 0 disables the
    /// timeout. Manifest entries may override per command.
    #[arg(
        long,
        env = "ARBOR_COLLECT_CMD_TIMEOUT",
        default_value = "0",
        value_parser = duration_arg,
        global = true
    )]
    pub cmd_timeout: Duration,

    /// SSH connection timeout.
    #[arg(
        long,
        env = "ARBOR_COLLECT_CONN_TIMEOUT",
        default_value = "15s",
        value_parser = duration_arg,
        global = true
    )]
    pub conn_timeout: Duration,

    /// Plan only: write the commands that would run, without executing.
    #[arg(long, env = "ARBOR_COLLECT_NOOP", global = true)]
    pub noop: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Discover child hosts and run the manifest against each one,
    /// writing a YAML report.
    Run,
    /// Validate a manifest file and exit.
    Verify,
    /// Create the collection user and install an SSH public key on every
    /// discovered non-loopback host.
    Install {
        /// Path to the SSH public key to install.
        #[arg(long = "install-pubkey", env = "ARBOR_COLLECT_INSTALL_PUBKEY")]
        install_pubkey: PathBuf,
    },
}

impl Cli {
    /// Resolves the leader target and user, falling back to the
    /// manifest's `ssh_host` and rejecting privileged accounts. The
    /// `admin` account is always refused; `root` additionally when
    /// `disallow_root` is set.
    pub fn resolve_leader(&self, mf: &Manifest, disallow_root: bool) -> Result<(String, String)> {
        let target = match self.target.clone().filter(|t| !t.trim().is_empty()) {
            Some(t) => t,
            None => {
                let host = mf.ssh_host.ip.trim();
                if host.is_empty() {
                    bail!("--target is required (FQDN/IP:port)");
                }
                if host.contains(':') {
                    host.to_string()
                } else {
                    format!("{host}:22")
                }
            }
        };

        let user = match self.user.clone().filter(|u| !u.trim().is_empty()) {
            Some(u) => u,
            None => {
                let u = mf.ssh_host.user.trim();
                if u.is_empty() {
                    bail!("--user is required for SSH authentication");
                }
                u.to_string()
            }
        };

        let trimmed = user.trim();
        if trimmed == "admin" || (disallow_root && trimmed == "root") {
            bail!("the {trimmed} account must not be used for collection");
        }

        Ok((target, user))
    }

    /// Builds transport options for one target.
    pub fn connect_options(&self, target: String, user: String) -> ConnectOptions {
        ConnectOptions {
            target,
            user,
            password: self.password.clone().map(Zeroizing::new),
            key_path: self.key.clone(),
            passphrase: self.passphrase.clone().map(Zeroizing::new),
            known_hosts: expand_tilde(&self.known_hosts),
            strict_host_key: self.strict_host_key,
            connect_timeout: self.conn_timeout,
        }
    }

    pub fn require_manifest(&self) -> Result<&Path> {
        self.manifest
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--manifest is required (path to YAML)"))
    }

    pub fn require_out(&self) -> Result<&Path> {
        self.out
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--out is required (path to output file)"))
    }
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).ok_or_else(|| format!("invalid duration '{s}' (examples: 30s, 1h30m, 0)"))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
