use fanc::{
    error::Failure,
    semantic::{Options, Output},
    source::Source,
};

/// Compila sin biblioteca auxiliar, para que la salida sea solo del programa.
pub fn compile_with(text: &str, options: Options) -> Result<Output, Failure> {
    let source = Source::new("test.fanc", text);
    fanc::compile(&source, options, "")
}

pub fn compile(text: &str) -> anyhow::Result<String> {
    compile_with(text, Options::empty())
        .map(|output| output.to_string())
        .map_err(|failure| anyhow::anyhow!("{}", failure))
}

/// Compila un programa que debe fallar.
pub fn reject(text: &str) -> Failure {
    match compile_with(text, Options::empty()) {
        Ok(output) => panic!("Program was accepted:\n{}", output),
        Err(failure) => failure,
    }
}

/// Envuelve sentencias en un `void main()`.
pub fn in_main(body: &str) -> String {
    format!("void main() {{\n{}\n}}\n", body)
}

/// Las cuatro líneas del punto de entrada real.
pub fn entry(version: u32) -> String {
    format!(
        "define i32 @main() {{\n    call void @main_{}()\n    ret i32 0\n}}\n",
        version
    )
}
