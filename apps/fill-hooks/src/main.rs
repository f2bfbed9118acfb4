//! fill-hooks: answer `- 钩子:` questions in a note with an LLM.
//!
//! Reads every Markdown file under a context folder, asks the completion
//! service each hook question in turn, and writes the answers back into the
//! note as quote lines.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
