//! outlinekb CLI: outline-to-knowledge-base generator.
//!
//! Turns a Markdown study outline into a folder tree of linked notes
//! (topic folders, subtopic index notes, atomic notes, and an overview).

mod commands;

use clap::{CommandFactory, Parser};
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args: Vec<std::ffi::OsString> = std::env::args_os().collect();
    if commands::is_help_alias(&args) {
        Cli::command().print_long_help()?;
        return Ok(());
    }

    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
