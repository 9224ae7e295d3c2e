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

//! Session abstraction over the two execution backends: one-shot exec
//! channels and the marker-framed persistent shell.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Msg;
use russh::Channel;
use thiserror::Error;

use crate::shell::PersistentShell;
use crate::ssh::{self, exec_combined, Client};

/// Errors raised while executing a remote command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote shell stream closed")]
    StreamClosed { output: Vec<u8> },

    #[error("command exited with status {status}")]
    ExitStatus { status: u32, output: Vec<u8> },

    #[error("remote closed the channel without reporting an exit status")]
    NoExitStatus { output: Vec<u8> },

    #[error("failed to open session: {0}")]
    OpenSession(#[source] ssh::Error),

    #[error(transparent)]
    Ssh(#[from] ssh::Error),

    #[error("execution worker failed: {0}")]
    Worker(String),
}

impl ExecError {
    /// The remote exit status carried by the error, when it has one.
    pub fn exit_status(&self) -> Option<u32> {
        match self {
            ExecError::ExitStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Output produced before the failure, when the error carries any.
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            ExecError::StreamClosed { output }
            | ExecError::ExitStatus { output, .. }
            | ExecError::NoExitStatus { output } => Some(output),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Timeout(_))
    }

    pub fn is_stream_closed(&self) -> bool {
        matches!(self, ExecError::StreamClosed { .. })
    }
}

/// One command execution context. A session is used for exactly one
/// command; the dispatcher requests a fresh session per command.
#[async_trait]
pub trait Session: Send {
    /// Runs `command`, returning interleaved stdout and stderr. A non-zero
    /// exit is an error unless the backend reports codes out of band via
    /// [`Session::last_exit_code`].
    async fn combined_output(&mut self, command: &str) -> Result<Vec<u8>, ExecError>;

    /// The exit code of the last command, for backends that track it
    /// separately from the `combined_output` result. `None` means the
    /// backend has no such channel and the `Result` is authoritative.
    fn last_exit_code(&self) -> Option<i32> {
        None
    }

    /// Releases per-session resources.
    async fn close(&mut self) {}
}

/// Produces sessions against one remote host.
#[async_trait]
pub trait SessionClient: Send + Sync {
    async fn new_session(&self) -> Result<Box<dyn Session>, ExecError>;

    /// Tears down the underlying connection.
    async fn shutdown(&self) {}
}

/// Backend running each command on its own SSH exec channel.
pub struct ExecSessionClient {
    client: Arc<Client>,
}

impl ExecSessionClient {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SessionClient for ExecSessionClient {
    async fn new_session(&self) -> Result<Box<dyn Session>, ExecError> {
        let channel = self
            .client
            .open_session_channel()
            .await
            .map_err(ExecError::OpenSession)?;
        Ok(Box::new(ExecSession {
            channel: Some(channel),
        }))
    }

    async fn shutdown(&self) {
        self.client.disconnect().await;
    }
}

struct ExecSession {
    channel: Option<Channel<Msg>>,
}

#[async_trait]
impl Session for ExecSession {
    async fn combined_output(&mut self, command: &str) -> Result<Vec<u8>, ExecError> {
        let channel = self
            .channel
            .take()
            .ok_or_else(|| ExecError::Worker("session already consumed".to_string()))?;
        let result = exec_combined(channel, command).await?;
        match result.exit_status {
            Some(0) => Ok(result.output),
            Some(status) => Err(ExecError::ExitStatus {
                status,
                output: result.output,
            }),
            None => Err(ExecError::NoExitStatus {
                output: result.output,
            }),
        }
    }
}

/// Backend running every command through one long-lived remote shell. The
/// exit code is recovered from the marker line, so `combined_output`
/// succeeds even for non-zero exits and `last_exit_code` is authoritative.
pub struct ShellSessionClient {
    shell: Arc<PersistentShell>,
    client: Option<Arc<Client>>,
}

impl ShellSessionClient {
    pub fn new(shell: Arc<PersistentShell>, client: Option<Arc<Client>>) -> Self {
        Self { shell, client }
    }
}

#[async_trait]
impl SessionClient for ShellSessionClient {
    async fn new_session(&self) -> Result<Box<dyn Session>, ExecError> {
        Ok(Box::new(ShellSession {
            shell: Arc::clone(&self.shell),
            last_exit: None,
        }))
    }

    async fn shutdown(&self) {
        // close() backs off when an abandoned worker still holds the
        // shell; the disconnect below then EOFs its read and releases it.
        self.shell.close().await;
        if let Some(client) = &self.client {
            client.disconnect().await;
        }
    }
}

struct ShellSession {
    shell: Arc<PersistentShell>,
    last_exit: Option<i32>,
}

#[async_trait]
impl Session for ShellSession {
    async fn combined_output(&mut self, command: &str) -> Result<Vec<u8>, ExecError> {
        match self.shell.run_one(command).await {
            Ok((output, code)) => {
                self.last_exit = Some(code);
                Ok(output)
            }
            Err(err) => {
                self.last_exit = Some(-1);
                Err(err)
            }
        }
    }

    fn last_exit_code(&self) -> Option<i32> {
        self.last_exit
    }
}
