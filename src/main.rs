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

use anyhow::Result;
use clap::Parser;

use arbor_collect::cli::{Cli, Commands};
use arbor_collect::commands::{collect, install, run, verify};
use arbor_collect::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        None => collect::cmd_collect(&cli).await,
        Some(Commands::Run) => run::cmd_run(&cli).await,
        Some(Commands::Verify) => verify::cmd_verify(&cli),
        Some(Commands::Install { install_pubkey }) => {
            install::cmd_install(&cli, install_pubkey).await
        }
    }
}
