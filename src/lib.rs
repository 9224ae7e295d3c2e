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

//! Manifest-driven command collection for Arbor TMS clusters over SSH.
//!
//! Connects to a leader appliance, optionally discovers child hosts from
//! its host table, executes a YAML-manifest-defined command sequence
//! against each target through either one-shot exec sessions or a
//! marker-framed persistent shell, and writes a structured report.

pub mod cli;
pub mod commands;
pub mod dial;
pub mod discovery;
pub mod dispatch;
pub mod logging;
pub mod manifest;
pub mod quote;
pub mod report;
pub mod session;
pub mod shell;
pub mod ssh;

pub use dial::{Dialer, SessionMode};
pub use dispatch::{run_remote_command, ExecutionResult};
pub use manifest::{CommandEntry, Manifest};
pub use session::{ExecError, Session, SessionClient};
pub use shell::PersistentShell;
