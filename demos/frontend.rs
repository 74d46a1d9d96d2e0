//! Compila un programa pequeño y muestra tanto el listado de ámbitos
//! como el IR resultante.
//!
//! ```text
//! RUST_LOG=debug cargo run --example frontend
//! ```

use fanc::{error::Diagnostics, semantic::Options, source::Source};

const PROGRAM: &str = r#"
int fib(int n) {
    if (n < 2)
        return n;

    return fib(n - 1) + fib(n - 2);
}

override void show(int value) {
    printi(value);
}

override void show(bool value) {
    if (value)
        print("true");
    else
        print("false");
}

void main() {
    int i = 0;
    while (i < 10) {
        show(fib(i));
        i = i + 1;
    }

    byte mask = 255b;
    show(i > 5 and not (mask == 0b));
}
"#;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let source = Source::new("<demo>", PROGRAM);
    let program = match fanc::compile(&source, Options::DUMP_SCOPES, fanc::RUNTIME) {
        Ok(program) => program,
        Err(failure) => {
            eprint!("{}", Diagnostics::from(failure));
            std::process::exit(1);
        }
    };

    println!("{}", program.listing());
    program.write(&mut std::io::stdout())?;

    Ok(())
}
