//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, Context};
use clap::{self, crate_version, Arg, Command};
use fanc::{error::Diagnostics, semantic::Options, source::Source};

use std::{
    borrow::Cow,
    fs::{self, File},
    io::{self, Write},
    process,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Parsing de CLI
    let args = Command::new("FanC compiler")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .default_value("-")
                .help("Source file ('-' for stdin)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("runtime")
                .long("runtime")
                .takes_value(true)
                .value_name("FILE")
                .conflicts_with("no-runtime")
                .help("Replace the embedded helper library"),
        )
        .arg(
            Arg::new("no-runtime")
                .long("no-runtime")
                .help("Omit the helper library from the output"),
        )
        .arg(
            Arg::new("dump-scopes")
                .long("dump-scopes")
                .help("Print every scope to stderr as it closes"),
        )
        .get_matches();

    // Se extraen argumentos necesarios
    let input = args.value_of("input").unwrap_or("-");
    let output = args.value_of("output").unwrap_or("-");

    let library = match args.value_of("runtime") {
        _ if args.is_present("no-runtime") => Cow::Borrowed(""),
        None => Cow::Borrowed(fanc::RUNTIME),
        Some(path) => fs::read_to_string(path)
            .map(Cow::Owned)
            .with_context(|| format!("Failed to read helper library: {}", path))?,
    };

    let mut options = Options::empty();
    if args.is_present("dump-scopes") {
        options |= Options::DUMP_SCOPES;
    }

    let source = match input {
        "-" => Source::read(io::stdin(), "<stdin>").context("Failed to read from stdin")?,
        path => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open for reading: {}", path))?;

            Source::read(file, path).with_context(|| format!("Failed to read: {}", path))?
        }
    };

    let program = match fanc::compile(&source, options, &library) {
        Ok(program) => program,
        Err(failure) => {
            eprint!("{}", Diagnostics::from(failure));
            process::exit(1);
        }
    };

    eprint!("{}", program.listing());

    match output {
        "-" => {
            let mut stdout = io::stdout();
            program
                .write(&mut stdout)
                .and_then(|()| stdout.flush())
                .context("Failed to emit to stdout")?;
        }

        path => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            program
                .write(&mut file)
                .with_context(|| format!("Failed to emit to file: {}", path))?;
        }
    }

    Ok(())
}
