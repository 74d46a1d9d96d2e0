//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un flujo de
//! caracteres (ver [`source::chars`](crate::source::chars)) en unidades
//! léxicas denominadas tokens. Los espacios en blanco y los comentarios
//! se descartan durante esta operación. Cada token emitido está asociado
//! a una ubicación en el código fuente original.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por lo que son
//! y no incluyen lexemas. Los identificadores sí incluyen su lexema
//! original. Las constantes literales se resuelven a sus valores.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores comienzan con una letra y continúan con letras
//!   o dígitos. El lenguaje distingue mayúsculas de minúsculas.
//! - Un literal entero seguido inmediatamente de `b` es un literal `byte`.
//!   El rango de bytes no se valida aquí, sino en análisis semántico.
//! - Las cadenas no pueden abarcar más de una línea.
//!
//! # Errores
//! El lexer es capaz de recuperarse parcialmente de condiciones de error,
//! descartando el resto de la línea. Esto permite reportar más de un
//! error por ejecución, pero no permite avanzar a las demás fases.

use crate::source::{Located, Location};
use std::{
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, 2147483647]")]
    IntOverflow,

    /// La línea terminó antes de cerrar una cadena.
    #[error("Unterminated string literal")]
    UnterminatedString,

    /// Secuencia de escape desconocida dentro de una cadena.
    #[error("Unknown escape sequence `\\{0}`")]
    BadEscape(char),
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(i32),

    /// Literal de byte, como en `42b`.
    ByteLiteral(i32),

    /// Literal de cadena, ya sin comillas ni secuencias de escape.
    StringLiteral(Rc<str>),

    /// `=`
    Assign,

    /// `,`
    Comma,

    /// `;`
    Semicolon,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `<`
    Less,

    /// `>`
    Greater,

    /// `<=`
    LessOrEqual,

    /// `>=`
    GreaterOrEqual,

    /// `(`
    OpenParen,

    /// `{`
    OpenCurly,

    /// `)`
    CloseParen,

    /// `}`
    CloseCurly,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            ByteLiteral(byte) => write!(fmt, "literal `{}b`", byte),
            StringLiteral(string) => write!(fmt, "literal {:?}", string),
            Assign => fmt.write_str("`=`"),
            Comma => fmt.write_str("`,`"),
            Semicolon => fmt.write_str("`;`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Slash => fmt.write_str("`/`"),
            Equal => fmt.write_str("`==`"),
            NotEqual => fmt.write_str("`!=`"),
            Less => fmt.write_str("`<`"),
            Greater => fmt.write_str("`>`"),
            LessOrEqual => fmt.write_str("`<=`"),
            GreaterOrEqual => fmt.write_str("`>=`"),
            OpenParen => fmt.write_str("`(`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseParen => fmt.write_str("`)`"),
            CloseCurly => fmt.write_str("`}`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Void,
    Int,
    Byte,
    Bool,
    Override,
    And,
    Or,
    Not,
    True,
    False,
    Return,
    If,
    Else,
    While,
    Break,
    Continue,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("void",     Keyword::Void),
    ("int",      Keyword::Int),
    ("byte",     Keyword::Byte),
    ("bool",     Keyword::Bool),
    ("override", Keyword::Override),
    ("and",      Keyword::And),
    ("or",       Keyword::Or),
    ("not",      Keyword::Not),
    ("true",     Keyword::True),
    ("false",    Keyword::False),
    ("return",   Keyword::Return),
    ("if",       Keyword::If),
    ("else",     Keyword::Else),
    ("while",    Keyword::While),
    ("break",    Keyword::Break),
    ("continue", Keyword::Continue),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, _) = KEYWORDS
            .iter()
            .find(|(_, keyword)| keyword == self)
            .expect("keyword missing from table");

        fmt.write_str(name)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator<Item = (char, Location)>> {
    source: Peekable<S>,
    state: State,
    start: Option<Location>,
    last: Location,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de error.
    Error,

    /// Estado de completitud; siempre emite el token incluido
    /// y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `/`, que puede iniciar un comentario.
    CommentStart,

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    Comment,

    /// Se encontró `=`, `<`, `>` o `!`; un `=` siguiente
    /// forma el segundo token.
    Compound {
        single: Option<Token>,
        double: Token,
    },

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(i32),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),

    /// Interior de una cadena.
    Text(String),

    /// Se encontró `\` dentro de una cadena.
    Escape(String),
}

impl<S: Iterator<Item = (char, Location)>> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start: None,
            last: start,
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, LexerError> {
        use {State::*, Token::*};

        loop {
            let next_char = self.source.peek().map(|(c, _)| *c);

            // Un token comienza en el primer carácter que se consume
            // fuera del estado inicial
            if let (Start, Some((_, location))) = (&self.state, self.source.peek()) {
                self.start = Some(location.clone());
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                // Condiciones de error: se descarta la línea donde
                // ocurrió el error. Al llegar al final de la línea
                // el lexer se recupera y reinicia.
                (Error, None) => return Ok(None),
                (Error, Some('\n')) => self.state = Start,
                (Error, Some(_)) => (),

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some('+')) => self.state = Complete(Plus),
                (Start, Some('-')) => self.state = Complete(Minus),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('/')) => self.state = CommentStart,
                (Start, Some('"')) => self.state = Text(String::new()),

                // Operadores que pueden extenderse con `=`
                (Start, Some('=')) => self.state = compound(Some(Assign), Equal),
                (Start, Some('<')) => self.state = compound(Some(Less), LessOrEqual),
                (Start, Some('>')) => self.state = compound(Some(Greater), GreaterOrEqual),
                (Start, Some('!')) => self.state = compound(None, NotEqual),

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() => self.state = Word(c.to_string()),

                // Inicio de una constante numérica. No se consume
                // el dígito, ya que esta lógica ya está implementada
                // en el caso de constante entera. Por tanto, la
                // constante es inicialmente cero.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_ascii_whitespace() => (),
                (Start, Some(c)) => {
                    self.bump();
                    return Err(LexerError::BadChar(c));
                }

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => return Ok(Some(std::mem::replace(value, Plus))),

                // `//` inicia un comentario, de lo contrario es división
                (CommentStart, Some('/')) => self.state = Comment,
                (CommentStart, _) => return Ok(Some(Slash)),

                // Los comentarios descartan la línea donde ocurren
                (Comment, Some('\n')) => self.state = Start,
                (Comment, Some(_)) => (),
                (Comment, None) => self.state = Start,

                (Compound { double, .. }, Some('=')) => {
                    let double = std::mem::replace(double, Plus);
                    self.state = Complete(double);
                }

                (Compound { single, .. }, _) => {
                    return match single.take() {
                        Some(single) => Ok(Some(single)),
                        None => Err(LexerError::Expected('=')),
                    };
                }

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = digit.to_digit(10).unwrap() as i32;

                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *accumulated = result,
                        None => {
                            self.bump();
                            return Err(LexerError::IntOverflow);
                        }
                    }
                }

                // Sufijo de literal byte
                (Integer(integer), Some('b')) => {
                    let integer = *integer;
                    self.state = Complete(ByteLiteral(integer));
                }

                // Si sigue algo que no es un dígito, la constante ha terminado
                (Integer(integer), _) => return Ok(Some(IntLiteral(*integer))),

                // Extensión de términos
                (Word(word), Some(c)) if c.is_ascii_alphanumeric() => {
                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    let token = match self::Keyword::from_str(word) {
                        Ok(keyword) => Keyword(keyword),
                        Err(()) => Id(Identifier::from(word.as_str())),
                    };

                    return Ok(Some(token));
                }

                (Text(text), Some('"')) => {
                    let text = Rc::from(std::mem::take(text));
                    self.state = Complete(StringLiteral(text));
                }

                (Text(_), Some('\n') | None) => return Err(LexerError::UnterminatedString),
                (Text(text), Some('\\')) => self.state = Escape(std::mem::take(text)),
                (Text(text), Some(c)) => text.push(c),

                (Escape(_), Some('\n') | None) => return Err(LexerError::UnterminatedString),
                (Escape(text), Some(c)) => {
                    let escaped = match c {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '"' => '"',
                        '\\' => '\\',
                        '0' => '\0',
                        _ => {
                            self.bump();
                            return Err(LexerError::BadEscape(c));
                        }
                    };

                    text.push(escaped);
                    self.state = Text(std::mem::take(text));
                }
            }

            // Si no hubo `continue` ni `return`, aquí se consume el
            // carácter que se observó con lookahead anteriormente
            self.bump();
        }
    }

    /// Consume el carácter en lookahead.
    fn bump(&mut self) {
        if let Some((_, location)) = self.source.next() {
            self.last = location;
        }
    }
}

impl<S: Iterator<Item = (char, Location)>> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.lex();
        let start = self.start.take().unwrap_or_else(|| self.last.clone());

        match result {
            Ok(None) => None,
            Ok(Some(token)) => {
                self.state = State::Start;

                let location = Location::span(start, &self.last);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                self.state = State::Error;
                Some(Err(Located::at(error, self.last.clone())))
            }
        }
    }
}

fn compound(single: Option<Token>, double: Token) -> State {
    State::Compound { single, double }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{self, Source};

    fn lex(text: &str) -> Result<Vec<Token>, Vec<Located<LexerError>>> {
        let source = Source::new("<test>", text);
        let start = source::eof(&source);
        let tokens = Lexer::new(start, source::chars(&source)).try_exhaustive()?;

        Ok(tokens.into_iter().map(Located::into_inner).collect())
    }

    #[test]
    fn operators_and_keywords() {
        use Token::*;

        let tokens = lex("if (x <= 3b and not y != 4) return;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Keyword(self::Keyword::If),
                OpenParen,
                Id(Identifier::from("x")),
                LessOrEqual,
                ByteLiteral(3),
                Keyword(self::Keyword::And),
                Keyword(self::Keyword::Not),
                Id(Identifier::from("y")),
                NotEqual,
                IntLiteral(4),
                CloseParen,
                Keyword(self::Keyword::Return),
                Semicolon,
            ]
        );
    }

    #[test]
    fn comments_division_and_strings() {
        use Token::*;

        let tokens = lex("x = a / 2; // a comment\nprint(\"hi\\n\");").unwrap();
        assert_eq!(
            tokens,
            vec![
                Id(Identifier::from("x")),
                Assign,
                Id(Identifier::from("a")),
                Slash,
                IntLiteral(2),
                Semicolon,
                Id(Identifier::from("print")),
                OpenParen,
                StringLiteral(Rc::from("hi\n")),
                CloseParen,
                Semicolon,
            ]
        );
    }

    #[test]
    fn token_locations() {
        let source = Source::new("<test>", "int  count;");
        let tokens = Lexer::new(source::eof(&source), source::chars(&source))
            .try_exhaustive()
            .unwrap();

        let columns: Vec<_> = tokens
            .iter()
            .map(|token| (token.location().start().column(), token.location().end().column()))
            .collect();

        assert_eq!(columns, vec![(1, 4), (6, 11), (11, 12)]);
    }

    #[test]
    fn errors_are_collected_per_line() {
        let errors = lex("int x = 3 $ 4;\nint y = \"open\nbool z = a ! b;").unwrap_err();
        let errors: Vec<_> = errors.iter().map(|error| error.as_ref().to_string()).collect();

        assert_eq!(
            errors,
            vec![
                "Bad character '$' in input stream",
                "Unterminated string literal",
                "Expected '='",
            ]
        );
    }

    #[test]
    fn integer_overflow() {
        let errors = lex("int x = 99999999999;").unwrap_err();
        assert!(matches!(errors[0].as_ref(), LexerError::IntOverflow));
    }
}
