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

//! Per-command dispatch: session setup, timeout enforcement, and exit-code
//! normalization.

use std::sync::Arc;
use std::time::Duration;

use crate::session::{ExecError, SessionClient};

/// What one command produced, regardless of how it ended. Output captured
/// before a failure is preserved.
#[derive(Debug)]
pub struct ExecutionResult {
    pub output: Vec<u8>,
    pub exit_code: i32,
    pub error: Option<ExecError>,
}

impl ExecutionResult {
    fn failed(err: ExecError) -> Self {
        let output = err.output().map(<[u8]>::to_vec).unwrap_or_default();
        let exit_code = resolve_exit_code(None, Some(&err));
        Self {
            output,
            exit_code,
            error: Some(err),
        }
    }

    /// True when the failure indicates the transport is gone and the
    /// caller should reconnect before issuing further commands. Both a
    /// timed-out command (whose worker still owns the shell) and a closed
    /// stream leave the session unusable.
    pub fn connection_lost(&self) -> bool {
        matches!(
            &self.error,
            Some(err) if err.is_timeout() || err.is_stream_closed()
        )
    }
}

/// Runs one command with a timeout. A zero timeout means unbounded.
///
/// The timeout races a spawned worker against a timer; on expiry the
/// worker is abandoned rather than cancelled, since there is no way to
/// interrupt the remote command mid-flight. The caller must treat the
/// connection as lost (see [`ExecutionResult::connection_lost`]).
pub async fn run_remote_command(
    client: Arc<dyn SessionClient>,
    command: String,
    timeout: Duration,
) -> ExecutionResult {
    if timeout.is_zero() {
        return run_once(client.as_ref(), &command).await;
    }

    let worker = tokio::spawn(async move { run_once(client.as_ref(), &command).await });

    tokio::select! {
        joined = worker => match joined {
            Ok(result) => result,
            Err(err) => ExecutionResult::failed(ExecError::Worker(err.to_string())),
        },
        _ = tokio::time::sleep(timeout) => {
            ExecutionResult::failed(ExecError::Timeout(timeout))
        }
    }
}

async fn run_once(client: &dyn SessionClient, command: &str) -> ExecutionResult {
    let mut session = match client.new_session().await {
        Ok(s) => s,
        Err(err) => return ExecutionResult::failed(err),
    };

    let outcome = session.combined_output(command).await;
    let last_exit = session.last_exit_code();
    session.close().await;

    match outcome {
        Ok(output) => ExecutionResult {
            output,
            exit_code: resolve_exit_code(last_exit, None),
            error: None,
        },
        Err(err) => {
            let output = err.output().map(<[u8]>::to_vec).unwrap_or_default();
            ExecutionResult {
                output,
                exit_code: resolve_exit_code(last_exit, Some(&err)),
                error: Some(err),
            }
        }
    }
}

/// Normalizes the exit code across backends, in order of preference:
/// the backend's out-of-band code, success when the run returned Ok,
/// the status carried by the error, and -1 when nothing is known.
fn resolve_exit_code(last_exit: Option<i32>, err: Option<&ExecError>) -> i32 {
    if let Some(code) = last_exit {
        return code;
    }
    match err {
        None => 0,
        Some(e) => match e.exit_status() {
            Some(status) => status as i32,
            None => -1,
        },
    }
}
