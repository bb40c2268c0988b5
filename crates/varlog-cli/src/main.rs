// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `varlog` command-line entry point.

mod cli;
mod render;
mod transcript;

fn main() -> anyhow::Result<()> {
    cli::entrypoint()
}
