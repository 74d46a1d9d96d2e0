//! Análisis semántico y generación de código en una sola pasada.
//!
//! El parser invoca un método de [`Context`] por cada producción que
//! reduce, en el mismo orden en que lo haría un parser ascendente.
//! Cada método verifica tipos contra la tabla de símbolos y emite
//! código de inmediato. Los destinos de salto que todavía no se
//! conocen viajan hacia arriba como listas de parches, dentro de
//! expresiones booleanas perezosas ([`Form::Jumps`]) o de sentencias
//! ([`Statement`]), hasta que una construcción envolvente las resuelve.
//!
//! El primer error detectado aborta la traducción.

use std::{
    fmt::{self, Display},
    io::{self, Write},
};

use bitflags::bitflags;
use thiserror::Error;

use crate::{
    codegen::CodeBuffer,
    ir::{Instruction, Width},
    lex::Identifier,
    source::{Located, Location},
};

mod expr;
mod scope;
mod stmt;

pub use expr::{BinOp, Expr, Form, Invocation, Jumps, LogicOp, RelOp};
pub use scope::{Linkage, Scope, Signature, Symbol, SymbolTable};
pub use stmt::Statement;

bitflags! {
    /// Opciones de análisis semántico.
    pub struct Options: u32 {
        /// Acumular un listado de cada ámbito al cerrarlo.
        ///
        /// Cada ámbito se lista con sus símbolos en orden de
        /// declaración, junto con su tipo y desplazamiento.
        const DUMP_SCOPES = 0x01;
    }
}

/// Tipo de un símbolo o expresión.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Byte,
    Int,
    String,
}

impl Type {
    /// Determina si es `int` o `byte`.
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Byte)
    }

    /// Representación de máquina del tipo.
    pub fn width(self) -> Width {
        match self {
            Type::Void => Width::Void,
            Type::Bool | Type::Byte | Type::Int => Width::Word,
            Type::String => Width::Text,
        }
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Void => "void",
            Type::Bool => "bool",
            Type::Byte => "byte",
            Type::Int => "int",
            Type::String => "string",
        };

        fmt.write_str(name)
    }
}

/// Compatibilidad de asignación de `source` hacia `target`.
///
/// Tipos iguales son compatibles. La única conversión implícita es
/// el ensanchamiento de `byte` a `int`.
pub fn check_types(target: Type, source: Type) -> bool {
    target == source || (target == Type::Int && source == Type::Byte)
}

pub type Semantic<T> = Result<T, Located<SemanticError>>;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Symbol `{0}` is undefined")]
    Undefined(Identifier),

    #[error("Function `{0}` is undefined")]
    UndefinedFunction(Identifier),

    #[error("No declaration of `{0}` accepts arguments of types ({1})")]
    PrototypeMismatch(Identifier, TypeList),

    #[error("Call to `{0}` is ambiguous, more than one declaration accepts arguments of types ({1})")]
    AmbiguousCall(Identifier, TypeList),

    #[error("Symbol `{0}` is already declared")]
    Redeclared(Identifier),

    #[error("Function `{0}` is already defined with the same signature")]
    Redefined(Identifier),

    #[error("Type mismatch: expected `{0}`, found `{1}`")]
    ExpectedType(Type, Type),

    #[error("Type mismatch: expected `int` or `byte`, found `{0}`")]
    ExpectedNumeric(Type),

    #[error("Invalid cast from `{0}` to `{1}`")]
    BadCast(Type, Type),

    #[error("Expected variable, found function `{0}`")]
    NotAVariable(Identifier),

    #[error("Byte value {0} is out of range, valid range is [0, 255]")]
    OutOfRange(i32),

    #[error("`break` outside of a loop")]
    UnexpectedBreak,

    #[error("`continue` outside of a loop")]
    UnexpectedContinue,

    #[error("Function `{0}` was declared without `override` and cannot be overridden")]
    MissingOverrideKeyword(Identifier),

    #[error("Function `{0}` was declared with `override`, every declaration of it must use `override`")]
    SpuriousOverrideKeyword(Identifier),

    #[error("Function `main` cannot be declared with `override`")]
    MainOverride,

    #[error("Entrypoint not found, define a parameterless `void main()`")]
    NoMain,

    #[error("Too many local variables, a function may declare at most {0}")]
    FrameExhausted(u32),
}

/// Lista de tipos, como se muestra en diagnósticos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeList(pub Vec<Type>);

impl Display for TypeList {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, typ) in self.0.iter().enumerate() {
            if index > 0 {
                fmt.write_str(", ")?;
            }

            write!(fmt, "{}", typ)?;
        }

        Ok(())
    }
}

/// Estado de una compilación.
///
/// Posee tanto el buffer de código como la tabla de símbolos. Se
/// construye al inicio de la traducción y se consume exactamente una
/// vez por [`Context::finish`].
pub struct Context {
    code: CodeBuffer,
    symbols: SymbolTable,
    options: Options,
    listing: String,
}

/// Resultado de una compilación exitosa.
pub struct Output {
    code: CodeBuffer,
    listing: String,
}

impl Output {
    /// Escribe el programa LLVM completo: sección de datos y luego código.
    pub fn write<W: Write>(&self, output: &mut W) -> io::Result<()> {
        self.code.write(output)
    }

    /// Listado de ámbitos, si se solicitó con [`Options::DUMP_SCOPES`].
    pub fn listing(&self) -> &str {
        &self.listing
    }
}

impl Display for Output {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = Vec::new();
        self.write(&mut text).map_err(|_| fmt::Error)?;

        fmt.write_str(&String::from_utf8_lossy(&text))
    }
}

impl Context {
    /// Inicia una compilación.
    ///
    /// `library` se copia sin modificaciones al inicio de la sección
    /// de datos. Debe definir las funciones auxiliares `print`,
    /// `printi` y `check_division`.
    pub fn new(options: Options, library: &str) -> Self {
        let mut code = CodeBuffer::new();
        code.emit_library(library);

        Context {
            code,
            symbols: SymbolTable::new(),
            options,
            listing: String::new(),
        }
    }

    /// Abre un ámbito de bloque.
    pub fn enter_block(&mut self) {
        self.symbols.push_scope(false, None);
    }

    /// Abre el ámbito del cuerpo de un ciclo.
    pub fn enter_loop(&mut self) {
        self.symbols.push_scope(true, None);
    }

    /// Cierra el ámbito más interno.
    pub fn exit_block(&mut self) {
        let scope = self.symbols.pop_scope();
        self.dump(&scope);
    }

    /// Concluye la traducción.
    ///
    /// Verifica que exista exactamente un `void main()` y agrega el
    /// punto de entrada real del programa, el cual lo invoca.
    pub fn finish(mut self, eof: &Location) -> Semantic<Output> {
        let main = Identifier::from("main");
        let versions = self.symbols.exact_versions(&main, &[]);

        let entry = match versions.as_slice() {
            [only] if only.returns == Type::Void => only.symbol(),
            _ => return Err(Located::at(SemanticError::NoMain, eof.clone())),
        };

        let pending = self.code.pending();
        debug_assert_eq!(pending, 0, "Jump targets left unresolved after translation");

        let global = self.symbols.pop_scope();
        self.dump(&global);

        for line in [
            String::from("define i32 @main() {"),
            Instruction::Call {
                output: None,
                returns: Width::Void,
                function: entry,
                arguments: Vec::new(),
            }
            .to_string(),
            String::from("    ret i32 0"),
            String::from("}"),
        ] {
            self.code.emit_global(line);
        }

        Ok(Output {
            code: self.code,
            listing: self.listing,
        })
    }

    fn dump(&mut self, scope: &Scope) {
        for line in scope.to_string().lines() {
            log::debug!("{}", line);
        }

        if self.options.contains(Options::DUMP_SCOPES) {
            self.listing.push_str(&scope.to_string());
        }
    }
}
