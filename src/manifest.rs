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

//! YAML manifest loading, validation, and command-line rendering.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::quote::shell_quote;

/// The YAML schema consumed by arbor-collect: report metadata, optional SSH
/// defaults for the leader, and the ordered list of commands to execute
/// (which may be empty to request discovery-only).
#[derive(Debug, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub ssh_host: SshHost,

    #[serde(default)]
    pub commands: Vec<CommandEntry>,
}

/// Leader connection details sourced from the manifest when CLI flags are
/// not provided. Flags take precedence when set.
#[derive(Debug, Default, Deserialize)]
pub struct SshHost {
    #[serde(default)]
    pub ip: String,

    #[serde(default)]
    pub user: String,
}

/// A single command specification: the base invocation, zero or more
/// arguments (shell-quoted at render time, never mutated otherwise), an
/// optional display title, the shell that should run the command on the
/// remote system, and an optional per-command timeout overriding the
/// global default.
#[derive(Debug, Default, Deserialize)]
pub struct CommandEntry {
    #[serde(alias = "cmd", default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub shell: String,

    #[serde(default)]
    pub timeout: String,
}

impl CommandEntry {
    /// Renders the full command line, appending arguments with safe shell
    /// quoting. Does not wrap with sudo or an interpreter; callers wrap
    /// according to their execution context.
    pub fn line(&self) -> String {
        if self.args.is_empty() {
            return self.command.clone();
        }
        let quoted: Vec<String> = self.args.iter().map(|a| shell_quote(a)).collect();
        format!("{} {}", self.command, quoted.join(" "))
            .trim()
            .to_string()
    }

    /// The timeout for this command, falling back to `default` when the
    /// manifest does not specify one or specifies an unparseable string.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        if self.timeout.is_empty() {
            return default;
        }
        parse_duration(&self.timeout).unwrap_or(default)
    }
}

impl Manifest {
    /// Reads and validates a manifest file. `name`, `description`, and a
    /// non-empty `command` per entry are required.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest at {}", path.display()))?;
        let mf: Manifest = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse manifest YAML at {}", path.display()))?;
        if mf.name.trim().is_empty() {
            bail!("manifest.name is required");
        }
        if mf.description.trim().is_empty() {
            bail!("manifest.description is required");
        }
        for (i, c) in mf.commands.iter().enumerate() {
            if c.command.trim().is_empty() {
                bail!("commands[{i}].command is required");
            }
        }
        Ok(mf)
    }

    /// Ensures every command names a shell interpreter. Required by the
    /// fanout workflow, where commands run under `sudo --shell`.
    pub fn require_shells(&self) -> Result<()> {
        for (i, c) in self.commands.iter().enumerate() {
            if c.shell.trim().is_empty() {
                bail!("commands[{i}].shell is required");
            }
        }
        Ok(())
    }
}

/// Parses a Go-style duration string: a sequence of `<int><unit>` terms
/// where unit is one of `ms`, `s`, `m`, `h` (e.g. `30s`, `1h30m`, `250ms`).
/// Returns `None` for empty or malformed input.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s == "0" {
        return Some(Duration::ZERO);
    }
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits_end == 0 {
            return None;
        }
        let value: u64 = rest[..digits_end].parse().ok()?;
        rest = &rest[digits_end..];
        let (unit, next) = if let Some(r) = rest.strip_prefix("ms") {
            (Duration::from_millis(value), r)
        } else if let Some(r) = rest.strip_prefix('s') {
            (Duration::from_secs(value), r)
        } else if let Some(r) = rest.strip_prefix('m') {
            (Duration::from_secs(value * 60), r)
        } else if let Some(r) = rest.strip_prefix('h') {
            (Duration::from_secs(value * 3600), r)
        } else {
            return None;
        };
        total = total.checked_add(unit)?;
        rest = next;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn line_without_args_is_the_base_invocation() {
        let c = CommandEntry {
            command: "show version".to_string(),
            ..Default::default()
        };
        assert_eq!(c.line(), "show version");
    }

    #[test]
    fn line_quotes_unsafe_args() {
        let c = CommandEntry {
            command: "grep".to_string(),
            args: vec!["a b".to_string(), "plain".to_string()],
            ..Default::default()
        };
        assert_eq!(c.line(), "grep 'a b' plain");
    }

    #[test]
    fn rendering_is_idempotent() {
        let c = CommandEntry {
            command: "echo".to_string(),
            args: vec!["it's".to_string()],
            ..Default::default()
        };
        assert_eq!(c.line(), c.line());
    }

    #[test]
    fn timeout_falls_back_on_empty_or_garbage() {
        let default = Duration::from_secs(7);
        let mut c = CommandEntry::default();
        assert_eq!(c.timeout_or(default), default);
        c.timeout = "soon".to_string();
        assert_eq!(c.timeout_or(default), default);
        c.timeout = "30s".to_string();
        assert_eq!(c.timeout_or(default), Duration::from_secs(30));
    }

    #[test]
    fn parse_duration_accepts_compound_terms() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(
            parse_duration("1h30m"),
            Some(Duration::from_secs(3600 + 1800))
        );
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("12"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("-5s"), None);
    }

    #[test]
    fn load_requires_name_description_and_commands() {
        let f = write_manifest("name: n\ndescription: d\ncommands:\n  - command: whoami\n");
        let mf = Manifest::load(f.path()).unwrap();
        assert_eq!(mf.commands.len(), 1);

        let f = write_manifest("description: d\n");
        assert!(Manifest::load(f.path())
            .unwrap_err()
            .to_string()
            .contains("manifest.name"));

        let f = write_manifest("name: n\ndescription: d\ncommands:\n  - args: [x]\n");
        assert!(Manifest::load(f.path())
            .unwrap_err()
            .to_string()
            .contains("commands[0].command"));
    }

    #[test]
    fn cmd_is_accepted_as_alias_for_command() {
        let f = write_manifest("name: n\ndescription: d\ncommands:\n  - cmd: uptime\n");
        let mf = Manifest::load(f.path()).unwrap();
        assert_eq!(mf.commands[0].command, "uptime");
    }

    #[test]
    fn require_shells_flags_missing_interpreters() {
        let f = write_manifest(
            "name: n\ndescription: d\ncommands:\n  - command: a\n    shell: /bin/sh\n  - command: b\n",
        );
        let mf = Manifest::load(f.path()).unwrap();
        let err = mf.require_shells().unwrap_err();
        assert!(err.to_string().contains("commands[1].shell"));
    }

    #[test]
    fn ssh_host_defaults_parse() {
        let f = write_manifest(
            "name: n\ndescription: d\nssh_host:\n  ip: 10.0.0.5\n  user: tester\ncommands: []\n",
        );
        let mf = Manifest::load(f.path()).unwrap();
        assert_eq!(mf.ssh_host.ip, "10.0.0.5");
        assert_eq!(mf.ssh_host.user, "tester");
    }
}
