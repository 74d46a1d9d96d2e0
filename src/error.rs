//! Reporte de errores.
//!
//! Todas las fases producen errores ubicados. [`Failure`] reúne el
//! resultado fallido de una compilación y [`Diagnostics`] lo presenta
//! citando el fragmento de código fuente responsable.

use crate::{
    lex::LexerError,
    parse::ParserError,
    semantic::SemanticError,
    source::{Located, Location},
};

use std::{
    error::Error,
    fmt::{self, Display},
};

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Causa por la cual se abandonó una compilación.
///
/// El lexer acumula todos los errores que encuentra. Las fases
/// posteriores se detienen en el primero.
#[derive(Debug)]
pub enum Failure {
    Lexical(Vec<Located<LexerError>>),
    Syntax(Located<ParserError>),
    Semantic(Located<SemanticError>),
}

impl Failure {
    /// Error semántico, si esa fue la causa.
    pub fn semantic(&self) -> Option<&SemanticError> {
        match self {
            Failure::Semantic(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    /// Error de sintaxis, si esa fue la causa.
    pub fn syntax(&self) -> Option<&ParserError> {
        match self {
            Failure::Syntax(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl Display for Failure {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Lexical(errors) => match errors.first() {
                Some(first) => write!(fmt, "{}: {}", first.location(), first.as_ref()),
                None => fmt.write_str("Lexical analysis failed"),
            },

            Failure::Syntax(error) => write!(fmt, "{}: {}", error.location(), error.as_ref()),
            Failure::Semantic(error) => write!(fmt, "{}: {}", error.location(), error.as_ref()),
        }
    }
}

impl Error for Failure {}

impl From<Vec<Located<LexerError>>> for Failure {
    fn from(errors: Vec<Located<LexerError>>) -> Self {
        Failure::Lexical(errors)
    }
}

impl From<Located<ParserError>> for Failure {
    fn from(error: Located<ParserError>) -> Self {
        Failure::Syntax(error)
    }
}

impl From<Located<SemanticError>> for Failure {
    fn from(error: Located<SemanticError>) -> Self {
        Failure::Semantic(error)
    }
}

impl From<Failure> for Diagnostics {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Lexical(errors) => Diagnostics::from(errors).kind("Lexical error"),
            Failure::Syntax(error) => Diagnostics::from(error).kind("Syntax error"),
            Failure::Semantic(error) => Diagnostics::from(error).kind("Semantic error"),
        }
    }
}

pub struct Diagnostics {
    kind: &'static str,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            errors: Default::default(),
        }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl<E: 'static + LocatedError> From<Vec<E>> for Diagnostics {
    fn from(errors: Vec<E>) -> Self {
        let errors = errors
            .into_iter()
            .map(|error| {
                let error: Box<dyn LocatedError> = Box::new(error);
                error
            })
            .collect();

        Diagnostics {
            errors,
            ..Default::default()
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, errors } = self;

        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;

            let location = error.location();
            writeln!(fmt, " --> {}", location)?;

            let digits = location.end().line().to_string().chars().count();
            writeln!(fmt, "{:digits$} |", "", digits = digits)?;

            for line_number in location.start().line()..=location.end().line() {
                location.source().with_line(line_number, |line| {
                    writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)
                })?
            }

            let (from, to) = (location.start().column(), location.end().column() - 1);
            let min = from.min(to);
            let max = from.max(to);

            let skip = (min - 1) as usize;
            let highlight = (max - min + 1) as usize;

            writeln!(
                fmt,
                "{:digits$} | {:skip$}{:^<highlight$}",
                "",
                "",
                "",
                digits = digits,
                skip = skip,
                highlight = highlight
            )?;

            writeln!(fmt)?;
        }

        let error_or_errors = if errors.len() == 1 { "error" } else { "errors" };
        writeln!(
            fmt,
            "Build failed with {} {}",
            errors.len(),
            error_or_errors
        )
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{self, Source};

    #[test]
    fn caret_under_the_offending_range() {
        let source = Source::new("test.fanc", "void main() {\n    byte b = 300b;\n}");
        let start = source::chars(&source)
            .find(|(_, location)| location.start().line() == 2 && location.start().column() == 14)
            .map(|(_, location)| location)
            .unwrap();

        let error = Located::at(SemanticError::OutOfRange(300), start);
        let text = Diagnostics::from(Failure::Semantic(error)).to_string();

        assert!(text.starts_with("Semantic error: Byte value 300 is out of range"));
        assert!(text.contains(" --> test.fanc:"));
        assert!(text.contains("2 |     byte b = 300b;"));
        assert!(text.contains(&format!(" | {}^\n", " ".repeat(13))));
        assert!(text.ends_with("Build failed with 1 error\n"));
    }

    #[test]
    fn lexical_errors_are_all_reported() {
        let source = Source::new("test.fanc", "$\n#");
        let errors: Vec<_> = source::chars(&source)
            .filter(|(c, _)| *c == '$' || *c == '#')
            .map(|(c, location)| Located::at(LexerError::BadChar(c), location))
            .collect();

        let diagnostics = Diagnostics::from(Failure::from(errors));
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.to_string().ends_with("Build failed with 2 errors\n"));
    }
}
