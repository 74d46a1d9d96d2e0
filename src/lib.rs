//! Compilador de FanC hacia IR textual de LLVM.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! reconoce por análisis sintáctico en [`parse`], el cual no construye
//! un árbol sino que dirige directamente a [`semantic`].
//!
//! # Traducción
//! El análisis semántico y la generación de código ocurren en una sola
//! pasada. Cada producción reconocida se verifica contra la tabla de
//! símbolos y se traduce de inmediato a instrucciones de [`ir`], las
//! cuales se acumulan en el buffer de [`codegen`]. Los destinos de salto
//! todavía desconocidos se resuelven después por backpatching.
//!
//! # Salida
//! El resultado es un módulo de LLVM completo, precedido por la
//! biblioteca auxiliar [`RUNTIME`], listo para `lli` o `llc`.

pub mod codegen;
pub mod error;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod semantic;
pub mod source;

use std::rc::Rc;

use crate::{
    error::Failure,
    lex::Lexer,
    semantic::{Context, Options, Output},
    source::Source,
};

/// Biblioteca auxiliar por omisión.
///
/// Define `print`, `printi` y la verificación de división entre cero.
pub const RUNTIME: &str = include_str!("runtime.ll");

/// Compila un programa completo.
///
/// `library` se antepone sin cambios a la salida, ver [`RUNTIME`].
pub fn compile(source: &Rc<Source>, options: Options, library: &str) -> Result<Output, Failure> {
    let eof = source::eof(source);
    let tokens = Lexer::new(eof.clone(), source::chars(source)).try_exhaustive()?;

    log::debug!("{} tokens in {}", tokens.len(), source.name());

    let cx = Context::new(options, library);
    parse::parse(&tokens, eof, cx)
}
