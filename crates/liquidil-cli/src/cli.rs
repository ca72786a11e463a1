use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "liquidil", bin_name = "liquidil")]
#[command(about = "Compiler, optimizer, and VM for liquidil templates")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a template and print the linked instruction listing
    Compile {
        /// Template file to compile
        path: PathBuf,
    },

    /// Render a template to stdout
    Render {
        /// Template file to render
        path: PathBuf,

        /// Top-level assigns as a JSON object, e.g. '{"name": "Ada"}'
        #[arg(long, value_name = "JSON")]
        json: Option<String>,

        /// Raise on the first recoverable runtime error instead of
        /// downgrading it to an inline error marker
        #[arg(long)]
        strict: bool,
    },

    /// List optimizer passes and whether LIQUIDIL_PASSES enables each
    Passes,

    /// Parse a template and print its unlinked, optimized IL
    Parse {
        /// Template file to parse
        src: PathBuf,

        /// Optimizer pass spec, overriding LIQUIDIL_PASSES (see `passes`)
        #[arg(short = 'p', long = "passes", value_name = "SPEC")]
        passes: Option<String>,
    },
}
