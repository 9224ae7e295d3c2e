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

//! Minimal POSIX shell quoting for remote command lines.

/// Quotes a single argument for a POSIX shell.
///
/// Tokens made solely of alphanumerics and `-_./@:,+=` pass through
/// unchanged, so quoting an already-safe token is idempotent. Everything
/// else is single-quoted with embedded single quotes escaped as `'\''`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Quotes an argument and forces the single-quote wrapping even for tokens
/// [`shell_quote`] would leave bare. Used when a whole command line is
/// passed as one argument (e.g. to `sudo ... -c`).
pub fn shell_quote_forced(s: &str) -> String {
    let quoted = shell_quote(s);
    if quoted.starts_with('\'') && quoted.ends_with('\'') && quoted.len() >= 2 {
        quoted
    } else {
        format!("'{quoted}'")
    }
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '@' | ':' | ',' | '+' | '=')
}
