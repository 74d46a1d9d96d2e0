//! Rastreo de ubicaciones originales en código fuente.
//!
//! Tokens, nodos y errores de todas las fases llevan consigo la
//! ubicación del fragmento de código fuente del cual derivan. Esto
//! permite que los diagnósticos señalen la línea exacta en donde
//! ocurre un error, aún cuando el error se detecte durante generación
//! de código.

use std::{
    fmt::{self, Debug, Display, Formatter},
    io::{self, Read},
    ops::Range,
    rc::Rc,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforma el valor con la misma ubicación.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Un archivo de código fuente con nombre.
///
/// Las líneas se retienen completas para que los diagnósticos puedan
/// citar el fragmento original.
pub struct Source {
    name: String,
    lines: Vec<String>,
}

impl Source {
    /// Construye una fuente a partir de texto ya disponible en memoria.
    pub fn new<S: Into<String>>(name: S, text: &str) -> Rc<Self> {
        Rc::new(Source {
            name: name.into(),
            lines: text.lines().map(String::from).collect(),
        })
    }

    /// Lee una fuente completa desde un flujo de E/S.
    pub fn read<R: Read, S: Into<String>>(mut reader: R, name: S) -> io::Result<Rc<Self>> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;

        Ok(Source::new(name, &text))
    }

    /// Nombre del origen, usualmente una ruta.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoca a `callback` con el contenido de una línea.
    ///
    /// Las líneas se numeran a partir de 1. Una línea inexistente se
    /// observa como vacía.
    pub fn with_line<F, R>(&self, line: u32, callback: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let text = (line as usize)
            .checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(String::as_str)
            .unwrap_or("");

        callback(text)
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Ubicación de una sola columna.
    pub fn at(from: &Rc<Source>, position: Position) -> Self {
        Location {
            from: Rc::clone(from),
            position: position..position.advance(),
        }
    }

    /// Obtiene el origen.
    pub fn source(&self) -> &Source {
        &self.from
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin, exclusiva.
    pub fn end(&self) -> Position {
        self.position.end
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end == start.advance() {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.saturating_sub(1).max(1),
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Ajusta la posición a la siguiente columna de tabulador.
    pub fn tab(self) -> Position {
        let column = 1 + ((self.column - 1) / TAB_STOP + 1) * TAB_STOP;
        Position {
            line: self.line,
            column,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Descompone una fuente en caracteres, cada uno con su ubicación.
///
/// Cada línea termina con un `'\n'` sintético, aún si el texto
/// original no terminaba en salto de línea.
pub fn chars(source: &Rc<Source>) -> impl Iterator<Item = (char, Location)> {
    let source = Rc::clone(source);
    let lines: Vec<Vec<char>> = source
        .lines
        .iter()
        .map(|line| line.chars().chain(std::iter::once('\n')).collect())
        .collect();

    let mut here = Position::default();
    lines.into_iter().flatten().map(move |c| {
        let location = Location::at(&source, here);
        here = match c {
            '\n' => here.newline(),
            '\t' => here.tab(),
            _ => here.advance(),
        };

        (c, location)
    })
}

/// Ubicación del final de la entrada.
pub fn eof(source: &Rc<Source>) -> Location {
    let position = match source.lines.last() {
        None => Position::default(),
        Some(last) => Position {
            line: source.lines.len() as u32,
            column: last.chars().count() as u32 + 1,
        },
    };

    Location::at(source, position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characters_carry_their_own_position() {
        let source = Source::new("<test>", "ab\n\tc");
        let positions: Vec<_> = chars(&source)
            .map(|(c, location)| (c, location.start().line(), location.start().column()))
            .collect();

        assert_eq!(
            positions,
            vec![
                ('a', 1, 1),
                ('b', 1, 2),
                ('\n', 1, 3),
                ('\t', 2, 1),
                ('c', 2, 5),
                ('\n', 2, 6),
            ]
        );
    }

    #[test]
    fn spans_and_lines() {
        let source = Source::new("main.fanc", "int x;\nx = 3;");
        let start = Location::at(&source, Position::default());
        let end = eof(&source);

        let span = Location::span(start, &end);
        assert_eq!(span.to_string(), "main.fanc:[1:1-2:7]");
        source.with_line(2, |line| assert_eq!(line, "x = 3;"));
        source.with_line(9, |line| assert!(line.is_empty()));
    }
}
