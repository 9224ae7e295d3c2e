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

//! Leader-only collection workflow tests against stubbed sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use arbor_collect::commands::collect::execute_collect;
use arbor_collect::dial::Dialer;
use arbor_collect::manifest::{CommandEntry, Manifest, SshHost};
use arbor_collect::session::{ExecError, Session, SessionClient};

/// Scripted one-shot sessions in the style of exec channels: a non-zero
/// exit surfaces as an error carrying the captured output.
struct ScriptState {
    responses: Mutex<Vec<Result<Vec<u8>, ExecError>>>,
    dials: AtomicUsize,
}

struct ScriptSession {
    state: Arc<ScriptState>,
}

#[async_trait]
impl Session for ScriptSession {
    async fn combined_output(&mut self, _command: &str) -> Result<Vec<u8>, ExecError> {
        let mut responses = self.state.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(b"ok\n".to_vec());
        }
        responses.remove(0)
    }
}

struct ScriptClient {
    state: Arc<ScriptState>,
}

#[async_trait]
impl SessionClient for ScriptClient {
    async fn new_session(&self) -> Result<Box<dyn Session>, ExecError> {
        Ok(Box::new(ScriptSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptDialer {
    state: Arc<ScriptState>,
}

#[async_trait]
impl Dialer for ScriptDialer {
    async fn dial_leader(&self) -> Result<Arc<dyn SessionClient>> {
        self.state.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptClient {
            state: Arc::clone(&self.state),
        }))
    }

    async fn dial_host(&self, _target: &str) -> Result<Arc<dyn SessionClient>> {
        unreachable!("the collect workflow never dials child hosts")
    }
}

fn manifest(commands: &[&str]) -> Manifest {
    Manifest {
        name: "leader audit".to_string(),
        description: "leader-only checks".to_string(),
        ssh_host: SshHost::default(),
        commands: commands
            .iter()
            .map(|c| CommandEntry {
                command: c.to_string(),
                ..Default::default()
            })
            .collect(),
    }
}

fn dialer(responses: Vec<Result<Vec<u8>, ExecError>>) -> (ScriptDialer, Arc<ScriptState>) {
    let state = Arc::new(ScriptState {
        responses: Mutex::new(responses),
        dials: AtomicUsize::new(0),
    });
    (
        ScriptDialer {
            state: Arc::clone(&state),
        },
        state,
    )
}

#[tokio::test]
async fn report_has_header_and_one_section_per_command() {
    let (d, _) = dialer(vec![
        Ok(b"14:02 up 3 days\n".to_vec()),
        Ok(b"/dev/sda1 72%\n".to_vec()),
    ]);
    let mf = manifest(&["uptime", "df -h"]);

    let mut out = Vec::new();
    execute_collect(&mf, Duration::ZERO, &d, &mut out)
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("Name: leader audit"));
    assert!(text.contains("Command Count: 2"));
    assert!(text.contains(&"=".repeat(80)));
    assert_eq!(text.matches(&"-".repeat(80)).count(), 2);
    assert!(text.contains("Command: uptime"));
    assert!(text.contains("Command: df -h"));
    assert!(text.contains("---8<---\n14:02 up 3 days\n---8<---\n"));
    assert!(text.contains("Exit Code: 0"));
}

#[tokio::test]
async fn nonzero_exit_is_recorded_with_its_output() {
    let (d, _) = dialer(vec![Err(ExecError::ExitStatus {
        status: 2,
        output: b"no such file\n".to_vec(),
    })]);
    let mf = manifest(&["ls /nope"]);

    let mut out = Vec::new();
    execute_collect(&mf, Duration::ZERO, &d, &mut out)
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("Exit Code: 2"));
    assert!(text.contains("Error: command exited with status 2"));
    assert!(text.contains("no such file"));
}

#[tokio::test]
async fn dead_stream_triggers_a_reconnect() {
    let (d, state) = dialer(vec![
        Err(ExecError::StreamClosed {
            output: b"half a line".to_vec(),
        }),
        Ok(b"recovered\n".to_vec()),
    ]);
    let mf = manifest(&["cat big", "uptime"]);

    let mut out = Vec::new();
    execute_collect(&mf, Duration::ZERO, &d, &mut out)
        .await
        .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(state.dials.load(Ordering::SeqCst), 2);
    assert!(text.contains("Exit Code: -1"));
    assert!(text.contains("half a line"));
    assert!(text.contains("recovered"));
}

#[tokio::test]
async fn header_lands_even_when_the_dial_fails() {
    struct FailingDialer;

    #[async_trait]
    impl Dialer for FailingDialer {
        async fn dial_leader(&self) -> Result<Arc<dyn SessionClient>> {
            anyhow::bail!("connection refused")
        }
        async fn dial_host(&self, _target: &str) -> Result<Arc<dyn SessionClient>> {
            anyhow::bail!("connection refused")
        }
    }

    let mf = manifest(&["uptime"]);
    let mut out = Vec::new();
    let err = execute_collect(&mf, Duration::ZERO, &FailingDialer, &mut out)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("connection refused"));

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Name: leader audit"));
}
