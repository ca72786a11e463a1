mod cli;
mod commands;
mod error;

use clap::Parser;

use cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Compile { path } => commands::compile::run(&path),
        Command::Render { path, json, strict } => commands::render::run(&path, json.as_deref(), strict),
        Command::Passes => {
            commands::passes::run();
            Ok(())
        }
        Command::Parse { src, passes } => commands::parse::run(&src, passes.as_deref()),
    };

    if result.is_err() {
        std::process::exit(1);
    }
}
