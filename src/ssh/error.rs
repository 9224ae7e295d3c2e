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

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while establishing or using the SSH transport.
#[derive(Debug, Error)]
pub enum Error {
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("failed to load private key: {0}")]
    KeyInvalid(#[source] russh::keys::Error),

    #[error("SSH agent authentication failed")]
    AgentAuthFailed,

    #[error("all configured authentication methods were rejected")]
    AuthenticationFailed,

    #[error("no authentication method available (provide --key, --password, or an SSH agent)")]
    NoAuthMethod,

    #[error("host key verification failed")]
    ServerCheckFailed,

    #[error("known_hosts file not found at {0} and strict host key checking is enabled")]
    KnownHostsMissing(PathBuf),

    #[error("invalid target address '{target}': {message}")]
    AddressInvalid { target: String, message: String },

    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),
}
