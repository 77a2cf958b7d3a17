//! Build script rendering the `busbridge(1)` man page from the CLI definition.

use std::{fs, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from("target/generated-man");
    fs::create_dir_all(&out_dir)?;

    let cmd = cli::Cli::command();
    let man = Man::new(cmd.clone());
    let mut buf: Vec<u8> = Vec::new();
    man.render(&mut buf)?;
    fs::write(out_dir.join("busbridge.1"), buf)?;

    for sub in cmd.get_subcommands() {
        let name = format!("busbridge-{}", sub.get_name());
        let mut buf: Vec<u8> = Vec::new();
        Man::new(sub.clone()).title(name.clone()).render(&mut buf)?;
        fs::write(out_dir.join(format!("{name}.1")), buf)?;
    }

    Ok(())
}
