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

//! Manifest validation without any network activity.

use anyhow::{Context, Result};

use crate::cli::Cli;
use crate::manifest::Manifest;

/// CLI entry point for `arbor-collect verify`.
pub fn cmd_verify(cli: &Cli) -> Result<()> {
    let manifest_path = cli.require_manifest()?;
    let mf = Manifest::load(manifest_path).context("invalid manifest")?;
    mf.require_shells().context("invalid manifest")?;
    println!("Manifest OK");
    Ok(())
}
