// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: updated entrypoint wiring the command line to the update agent

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    updated::init_logging();
    let cli = updated::Cli::parse();
    updated::execute(&cli)
}
