// Copyright 2026 forex-extractor contributors
// SPDX-License-Identifier: MIT

use clap::Parser;
use forex_extractor_cli::{init_tracing, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let json = cli.json;
    let result = run(cli).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                })
            );
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
