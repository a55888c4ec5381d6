//! coursebook CLI — turns a scraped online course into book-ready content.
//!
//! Cleans raw lesson HTML, downloads the images it references, renders part
//! covers, and assembles ordered book records for an EPUB/PDF renderer.

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
