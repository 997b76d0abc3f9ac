//! Build script that renders the `ansible-vagrant` man page.
//!
//! The page is written to `OUT_DIR` as `<command>.1`, named after the clap
//! command so packaging picks it up without a separate manifest.

use std::env;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let command = Cli::command();
    let page = out_dir()?.join(format!("{}.1", command.get_name()));

    let mut buffer = Vec::new();
    Man::new(command).render(&mut buffer)?;
    File::create(page)?.write_all(&buffer)?;

    Ok(())
}

fn out_dir() -> io::Result<PathBuf> {
    env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))
}
