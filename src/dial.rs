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

//! The dialing seam between orchestrators and the SSH transport. The
//! orchestrators only see [`Dialer`], so tests can substitute stub
//! connections without a network.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::session::{ExecSessionClient, SessionClient, ShellSessionClient};
use crate::shell::PersistentShell;
use crate::ssh::{Client, ConnectOptions};

/// Which execution backend a leader connection should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// One exec channel per command.
    Exec,
    /// One persistent PTY shell shared by all commands.
    PersistentShell,
}

/// Opens authenticated connections for the orchestrators.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connects to the configured leader.
    async fn dial_leader(&self) -> Result<Arc<dyn SessionClient>>;

    /// Connects directly to a discovered child host. A bare address gets
    /// port 22 appended.
    async fn dial_host(&self, target: &str) -> Result<Arc<dyn SessionClient>>;
}

/// The production dialer, carrying leader credentials that are reused for
/// child hosts.
pub struct SshDialer {
    options: ConnectOptions,
    mode: SessionMode,
}

impl SshDialer {
    pub fn new(options: ConnectOptions, mode: SessionMode) -> Self {
        Self { options, mode }
    }

    async fn connect(&self, options: &ConnectOptions, mode: SessionMode) -> Result<Arc<dyn SessionClient>> {
        let client = Arc::new(
            Client::connect(options)
                .await
                .with_context(|| format!("ssh connection to {} failed", options.target))?,
        );
        match mode {
            SessionMode::Exec => Ok(Arc::new(ExecSessionClient::new(client))),
            SessionMode::PersistentShell => {
                let shell = PersistentShell::open(&client)
                    .await
                    .context("failed to start persistent shell")?;
                Ok(Arc::new(ShellSessionClient::new(
                    Arc::new(shell),
                    Some(client),
                )))
            }
        }
    }
}

#[async_trait]
impl Dialer for SshDialer {
    async fn dial_leader(&self) -> Result<Arc<dyn SessionClient>> {
        self.connect(&self.options, self.mode).await
    }

    async fn dial_host(&self, target: &str) -> Result<Arc<dyn SessionClient>> {
        let mut options = self.options.clone();
        options.target = if target.contains(':') {
            target.to_string()
        } else {
            format!("{target}:22")
        };
        // Child hosts always use one-shot sessions.
        self.connect(&options, SessionMode::Exec).await
    }
}
