// Copyright 2025 rpcpool Authors
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

//! # rpcpool CLI
//!
//! Command-line entry point for the rpcpool dispatch system.
//!
//! - `rpcpool server`: HTTP entry point, actor socket and optional local worker pool
//! - `rpcpool actor`: remote worker pool that connects to a server
//!
//! Settings are resolved by [`config`] from the command line, the
//! environment and the defaults before any component is constructed.

pub mod config;
