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

//! Host key verification policy.

use std::path::{Path, PathBuf};

use super::error::Error;

/// How the server's host key is verified during connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCheckMethod {
    /// Accept any host key. Insecure; for lab and test targets only.
    NoCheck,
    /// Verify against the given known_hosts file.
    KnownHostsFile(PathBuf),
}

/// Resolves the check method for a connection. Strict mode fails closed:
/// a missing known_hosts file is an error rather than a silent downgrade.
pub fn check_method(strict: bool, known_hosts: &Path) -> Result<ServerCheckMethod, Error> {
    if !strict {
        tracing::debug!("host key checking disabled");
        return Ok(ServerCheckMethod::NoCheck);
    }
    if known_hosts.exists() {
        tracing::debug!("verifying host keys against {}", known_hosts.display());
        Ok(ServerCheckMethod::KnownHostsFile(known_hosts.to_path_buf()))
    } else {
        Err(Error::KnownHostsMissing(known_hosts.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_strict_never_checks() {
        let method = check_method(false, Path::new("/nonexistent/known_hosts")).unwrap();
        assert_eq!(method, ServerCheckMethod::NoCheck);
    }

    #[test]
    fn strict_fails_closed_when_file_is_missing() {
        let err = check_method(true, Path::new("/nonexistent/known_hosts")).unwrap_err();
        assert!(matches!(err, Error::KnownHostsMissing(_)));
    }

    #[test]
    fn strict_uses_existing_file() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let method = check_method(true, f.path()).unwrap();
        assert_eq!(
            method,
            ServerCheckMethod::KnownHostsFile(f.path().to_path_buf())
        );
    }
}
