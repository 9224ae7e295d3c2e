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

//! SSH transport layer.

pub mod client;
pub mod error;
pub mod known_hosts;

pub use client::{exec_combined, split_target, Client, CommandOutput, ConnectOptions};
pub use error::Error;
pub use known_hosts::{check_method, ServerCheckMethod};
