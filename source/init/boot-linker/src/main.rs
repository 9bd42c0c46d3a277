// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: boot-linker entrypoint, run by init before services start

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    boot_linker::init_logging();
    let cli = boot_linker::Cli::parse();
    boot_linker::execute(&cli)
}
