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

//! russh-backed SSH client: connection, authentication, one-shot command
//! execution, and the PTY shell channel used by the persistent shell.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{Config, Handle, Handler, Msg};
use russh::keys::PrivateKeyWithHashAlg;
use russh::{Channel, ChannelMsg, ChannelStream, Disconnect, Pty};
use zeroize::Zeroizing;

use super::error::Error;
use super::known_hosts::{check_method, ServerCheckMethod};

/// Everything needed to reach and authenticate against one host.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// `host:port`; a bare host defaults to port 22.
    pub target: String,
    pub user: String,
    pub password: Option<Zeroizing<String>>,
    pub key_path: Option<PathBuf>,
    pub passphrase: Option<Zeroizing<String>>,
    pub known_hosts: PathBuf,
    pub strict_host_key: bool,
    pub connect_timeout: Duration,
}

/// The result of a one-shot exec channel: combined stdout/stderr bytes and
/// the exit status, when the remote side reported one.
#[derive(Debug)]
pub struct CommandOutput {
    pub output: Vec<u8>,
    pub exit_status: Option<u32>,
}

/// An authenticated SSH connection to a single host.
pub struct Client {
    handle: Handle<ClientHandler>,
}

impl Client {
    /// Opens a TCP connection, performs the SSH handshake and host key
    /// check, and authenticates. The whole sequence is bounded by
    /// `connect_timeout`.
    pub async fn connect(opts: &ConnectOptions) -> Result<Self, Error> {
        let server_check = check_method(opts.strict_host_key, &opts.known_hosts)?;
        let (host, port) = split_target(&opts.target)?;

        tracing::debug!("connecting to {host}:{port}");
        let config = Arc::new(Config::default());
        let handler = ClientHandler {
            hostname: host.clone(),
            port,
            server_check,
        };

        let mut handle = tokio::time::timeout(
            opts.connect_timeout,
            russh::client::connect(config, (host.as_str(), port), handler),
        )
        .await
        .map_err(|_| Error::ConnectTimeout(opts.connect_timeout))??;

        authenticate(&mut handle, opts).await?;
        tracing::debug!("connected and authenticated to {host}:{port}");
        Ok(Self { handle })
    }

    /// Opens a fresh session channel for a one-shot exec.
    pub async fn open_session_channel(&self) -> Result<Channel<Msg>, Error> {
        Ok(self.handle.channel_open_session().await?)
    }

    /// Opens the long-lived shell channel used by the persistent shell: a
    /// PTY with echo disabled (command echo would pollute the combined
    /// stream) running `/bin/sh` in script mode.
    pub async fn open_shell_channel(&self) -> Result<ChannelStream<Msg>, Error> {
        let channel = self.handle.channel_open_session().await?;
        channel
            .request_pty(
                false,
                "xterm",
                80,
                40,
                0,
                0,
                &[
                    (Pty::ECHO, 0),
                    (Pty::TTY_OP_ISPEED, 14400),
                    (Pty::TTY_OP_OSPEED, 14400),
                ],
            )
            .await?;
        channel.exec(true, "/bin/sh -s -").await?;
        Ok(channel.into_stream())
    }

    /// Best-effort disconnect. Safe to call on an already-dead connection.
    pub async fn disconnect(&self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

/// Runs `command` on an already-open session channel, collecting stdout and
/// stderr into one combined buffer in arrival order.
pub async fn exec_combined(
    mut channel: Channel<Msg>,
    command: &str,
) -> Result<CommandOutput, Error> {
    channel.exec(true, command).await?;

    let mut output = Vec::new();
    let mut exit_status = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => output.extend_from_slice(data),
            // ext 1 is stderr; fold it into the combined buffer
            ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => {
                output.extend_from_slice(data)
            }
            // Data may still follow the status message; keep draining.
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            _ => {}
        }
    }

    Ok(CommandOutput {
        output,
        exit_status,
    })
}

/// Tries the configured authentication methods in order: private key file,
/// password, then SSH agent when `SSH_AUTH_SOCK` is set. First success wins.
async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    opts: &ConnectOptions,
) -> Result<(), Error> {
    let mut attempted = false;

    if let Some(key_path) = &opts.key_path {
        attempted = true;
        let passphrase = opts.passphrase.as_ref().map(|p| p.as_str());
        let key = russh::keys::load_secret_key(key_path, passphrase).map_err(Error::KeyInvalid)?;
        let hash = handle.best_supported_rsa_hash().await?.flatten();
        let result = handle
            .authenticate_publickey(&opts.user, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
            .await?;
        if result.success() {
            return Ok(());
        }
        tracing::debug!("private key rejected, trying next authentication method");
    }

    if let Some(password) = &opts.password {
        attempted = true;
        let result = handle
            .authenticate_password(&opts.user, password.as_str())
            .await?;
        if result.success() {
            return Ok(());
        }
        tracing::debug!("password rejected, trying next authentication method");
    }

    if std::env::var_os("SSH_AUTH_SOCK").is_some() {
        match russh::keys::agent::client::AgentClient::connect_env().await {
            Ok(mut agent) => {
                attempted = true;
                let identities = agent
                    .request_identities()
                    .await
                    .map_err(|_| Error::AgentAuthFailed)?;
                for identity in identities {
                    let hash = handle.best_supported_rsa_hash().await?.flatten();
                    let result = handle
                        .authenticate_publickey_with(&opts.user, identity, hash, &mut agent)
                        .await;
                    if let Ok(auth) = result {
                        if auth.success() {
                            return Ok(());
                        }
                    }
                }
                tracing::debug!("no agent identity was accepted");
            }
            Err(err) => {
                tracing::debug!("SSH agent unavailable: {err}");
            }
        }
    }

    Err(if attempted {
        Error::AuthenticationFailed
    } else {
        Error::NoAuthMethod
    })
}

/// Splits `host:port` into parts; a bare host gets port 22. IPv6 literals
/// may be bracketed (`[::1]:2222`); an unbracketed literal is taken as a
/// portless host.
pub fn split_target(target: &str) -> Result<(String, u16), Error> {
    let target = target.trim();
    if target.is_empty() {
        return Err(Error::AddressInvalid {
            target: target.to_string(),
            message: "empty target".to_string(),
        });
    }

    if let Some(rest) = target.strip_prefix('[') {
        let Some((host, tail)) = rest.split_once(']') else {
            return Err(Error::AddressInvalid {
                target: target.to_string(),
                message: "unterminated '[' in address".to_string(),
            });
        };
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| Error::AddressInvalid {
                target: target.to_string(),
                message: "invalid port number".to_string(),
            })?,
            None if tail.is_empty() => 22,
            None => {
                return Err(Error::AddressInvalid {
                    target: target.to_string(),
                    message: "unexpected characters after ']'".to_string(),
                })
            }
        };
        return Ok((host.to_string(), port));
    }

    match target.rfind(':') {
        Some(_) if target.matches(':').count() > 1 => Ok((target.to_string(), 22)),
        Some(idx) => {
            let port = target[idx + 1..]
                .parse()
                .map_err(|_| Error::AddressInvalid {
                    target: target.to_string(),
                    message: "invalid port number".to_string(),
                })?;
            Ok((target[..idx].to_string(), port))
        }
        None => Ok((target.to_string(), 22)),
    }
}

/// Verifies the server host key according to the configured policy.
#[derive(Debug, Clone)]
struct ClientHandler {
    hostname: String,
    port: u16,
    server_check: ServerCheckMethod,
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::KnownHostsFile(path) => russh::keys::check_known_hosts_path(
                &self.hostname,
                self.port,
                server_public_key,
                path,
            )
            .map_err(|_| Error::ServerCheckFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_target_defaults_to_port_22() {
        assert_eq!(
            split_target("tms.example.com").unwrap(),
            ("tms.example.com".to_string(), 22)
        );
    }

    #[test]
    fn split_target_parses_explicit_port() {
        assert_eq!(
            split_target("10.0.0.1:2222").unwrap(),
            ("10.0.0.1".to_string(), 2222)
        );
    }

    #[test]
    fn split_target_handles_bracketed_ipv6() {
        assert_eq!(split_target("[::1]:22").unwrap(), ("::1".to_string(), 22));
        assert_eq!(
            split_target("[fe80::1]").unwrap(),
            ("fe80::1".to_string(), 22)
        );
    }

    #[test]
    fn split_target_treats_bare_ipv6_as_portless() {
        assert_eq!(split_target("::1").unwrap(), ("::1".to_string(), 22));
    }

    #[test]
    fn split_target_rejects_garbage() {
        assert!(split_target("host:port").is_err());
        assert!(split_target("").is_err());
        assert!(split_target("[::1").is_err());
    }
}
