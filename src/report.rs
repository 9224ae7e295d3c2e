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

//! Report rendering: the YAML report of the fanout workflow and the
//! delimited plain-text report of the leader-only workflow.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::dispatch::ExecutionResult;
use crate::manifest::{CommandEntry, Manifest};

/// The structured report written by the `run` workflow.
#[derive(Debug, Serialize)]
pub struct Report {
    name: String,
    description: String,
    generated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    discovery: Option<DiscoverySection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    runs: Vec<HostRun>,
}

#[derive(Debug, Serialize)]
struct DiscoverySection {
    #[serde(skip_serializing_if = "Option::is_none")]
    hosts_content: Option<String>,
    discovered_hosts: Vec<String>,
}

/// Results grouped under one host. An empty host means the leader itself.
#[derive(Debug, Serialize)]
struct HostRun {
    #[serde(skip_serializing_if = "String::is_empty")]
    host: String,
    results: Vec<CommandResultRecord>,
}

#[derive(Debug, Serialize)]
struct CommandResultRecord {
    #[serde(skip_serializing_if = "String::is_empty")]
    title: String,
    command: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    shell: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    timeout: String,
    exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
    output: String,
}

impl Report {
    pub fn new(mf: &Manifest) -> Self {
        Self {
            name: mf.name.clone(),
            description: mf.description.clone(),
            generated: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            discovery: None,
            runs: Vec::new(),
        }
    }

    /// Records the discovery outcome. The raw host table is embedded only
    /// when `include_content` is set (when commands will actually run).
    pub fn set_discovery(&mut self, hosts_content: &[u8], hosts: Vec<String>, include_content: bool) {
        self.discovery = Some(DiscoverySection {
            hosts_content: include_content
                .then(|| String::from_utf8_lossy(hosts_content).into_owned()),
            discovered_hosts: hosts,
        });
    }

    /// Appends one command result under `host`, creating the host run on
    /// first use.
    pub fn add_result(
        &mut self,
        host: &str,
        entry: &CommandEntry,
        result: &ExecutionResult,
        timeout: Duration,
    ) {
        let record = CommandResultRecord {
            title: entry.title.trim().to_string(),
            command: entry.line(),
            shell: entry.shell.clone(),
            timeout: if timeout.is_zero() {
                String::new()
            } else {
                format_duration(timeout)
            },
            exit_code: result.exit_code,
            error: result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            output: String::from_utf8_lossy(&result.output).into_owned(),
        };
        match self.runs.iter_mut().find(|r| r.host == host) {
            Some(run) => run.results.push(record),
            None => self.runs.push(HostRun {
                host: host.to_string(),
                results: vec![record],
            }),
        }
    }

    pub fn write_yaml(&self, w: impl Write) -> Result<()> {
        serde_yaml::to_writer(w, self)?;
        Ok(())
    }
}

/// Writes the plain-text report header used by the leader-only workflow.
pub fn write_text_header(w: &mut impl Write, mf: &Manifest) -> Result<()> {
    writeln!(w, "Name: {}", mf.name)?;
    writeln!(w, "Description: {}", mf.description)?;
    writeln!(
        w,
        "Generated: {}",
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )?;
    writeln!(w, "Command Count: {}", mf.commands.len())?;
    writeln!(w, "{}", "=".repeat(80))?;
    Ok(())
}

/// Writes one delimited command section of the plain-text report.
pub fn write_text_section(
    w: &mut impl Write,
    entry: &CommandEntry,
    result: &ExecutionResult,
    timeout: Duration,
) -> Result<()> {
    writeln!(w, "{}", "-".repeat(80))?;
    writeln!(w, "Command: {}", entry.line())?;
    if !timeout.is_zero() {
        writeln!(w, "Timeout: {}", format_duration(timeout))?;
    }
    writeln!(w, "Exit Code: {}", result.exit_code)?;
    if let Some(err) = &result.error {
        writeln!(w, "Error: {err}")?;
    }
    writeln!(w, "Output:")?;
    writeln!(w, "---8<---")?;
    w.write_all(&result.output)?;
    if !result.output.ends_with(b"\n") {
        writeln!(w)?;
    }
    writeln!(w, "---8<---")?;
    Ok(())
}

/// Renders a duration in the compound `1h30m`, `45s`, `250ms` style used
/// throughout reports and logs.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d.subsec_millis() != 0 && d.as_secs() == 0 {
        return format!("{}ms", d.subsec_millis());
    }
    let mut secs = d.as_secs();
    let mut out = String::new();
    let hours = secs / 3600;
    secs %= 3600;
    let mins = secs / 60;
    secs %= 60;
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if mins > 0 {
        out.push_str(&format!("{mins}m"));
    }
    if secs > 0 || out.is_empty() {
        out.push_str(&format!("{secs}s"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::SshHost;

    fn manifest() -> Manifest {
        Manifest {
            name: "probe".to_string(),
            description: "cluster probe".to_string(),
            ssh_host: SshHost::default(),
            commands: vec![CommandEntry {
                command: "uptime".to_string(),
                shell: "/bin/sh".to_string(),
                ..Default::default()
            }],
        }
    }

    fn ok_result(output: &[u8]) -> ExecutionResult {
        ExecutionResult {
            output: output.to_vec(),
            exit_code: 0,
            error: None,
        }
    }

    #[test]
    fn yaml_report_contains_metadata_and_results() {
        let mf = manifest();
        let mut report = Report::new(&mf);
        report.set_discovery(b"10.0.0.1 node\n", vec!["10.0.0.1".to_string()], true);
        report.add_result(
            "10.0.0.1",
            &mf.commands[0],
            &ok_result(b"up 3 days\n"),
            Duration::from_secs(30),
        );

        let mut buf = Vec::new();
        report.write_yaml(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("name: probe"));
        assert!(text.contains("hosts_content:"));
        assert!(text.contains("- 10.0.0.1"));
        assert!(text.contains("command: uptime"));
        assert!(text.contains("timeout: 30s"));
        assert!(text.contains("exit_code: 0"));
        assert!(!text.contains("error:"));
    }

    #[test]
    fn empty_host_key_is_omitted() {
        let mf = manifest();
        let mut report = Report::new(&mf);
        report.add_result("", &mf.commands[0], &ok_result(b"ok\n"), Duration::ZERO);
        let mut buf = Vec::new();
        report.write_yaml(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("host:"));
        assert!(text.contains("results:"));
    }

    #[test]
    fn discovery_content_is_omitted_when_not_requested() {
        let mf = manifest();
        let mut report = Report::new(&mf);
        report.set_discovery(b"raw\n", Vec::new(), false);
        let mut buf = Vec::new();
        report.write_yaml(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("hosts_content"));
        assert!(text.contains("discovered_hosts: []"));
    }

    #[test]
    fn results_group_under_one_run_per_host() {
        let mf = manifest();
        let mut report = Report::new(&mf);
        report.add_result("h1", &mf.commands[0], &ok_result(b"a\n"), Duration::ZERO);
        report.add_result("h1", &mf.commands[0], &ok_result(b"b\n"), Duration::ZERO);
        assert_eq!(report.runs.len(), 1);
        assert_eq!(report.runs[0].results.len(), 2);
    }

    #[test]
    fn text_header_and_section_layout() {
        let mf = manifest();
        let mut buf = Vec::new();
        write_text_header(&mut buf, &mf).unwrap();
        write_text_section(
            &mut buf,
            &mf.commands[0],
            &ok_result(b"up 3 days"),
            Duration::from_secs(90),
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Name: probe"));
        assert!(text.contains("Command Count: 1"));
        assert!(text.contains(&"=".repeat(80)));
        assert!(text.contains(&"-".repeat(80)));
        assert!(text.contains("Command: uptime"));
        assert!(text.contains("Timeout: 1m30s"));
        assert!(text.contains("Exit Code: 0"));
        // output without a trailing newline gets one before the fence
        assert!(text.contains("---8<---\nup 3 days\n---8<---\n"));
    }

    #[test]
    fn text_section_includes_errors() {
        let mf = manifest();
        let result = ExecutionResult {
            output: Vec::new(),
            exit_code: -1,
            error: Some(crate::session::ExecError::Timeout(Duration::from_secs(5))),
        };
        let mut buf = Vec::new();
        write_text_section(&mut buf, &mf.commands[0], &result, Duration::from_secs(5)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Exit Code: -1"));
        assert!(text.contains("Error: command timed out"));
    }

    #[test]
    fn durations_render_compound_terms() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
    }
}
