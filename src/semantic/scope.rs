//! Tabla de símbolos.
//!
//! # Ámbitos
//! La tabla es una pila de [`Scope`]s. El fondo de la pila es el
//! ámbito de programa, que contiene las funciones. El lenguaje no
//! permite ocultar nombres: un nombre visible en cualquier ámbito de
//! la pila no puede declararse de nuevo.
//!
//! # Desplazamientos
//! Cada variable local ocupa un desplazamiento no negativo dentro del
//! marco de su función. Paralela a la pila de ámbitos existe una pila
//! de contadores; abrir un ámbito duplica el contador en el tope en
//! vez de reiniciarlo, por lo que dos variables de una misma función
//! nunca comparten desplazamiento aunque sus bloques ya hayan cerrado.
//! Los parámetros ocupan `-1`, `-2`, ... en orden de declaración.
//!
//! # Versiones
//! Cada declaración de función recibe un número de versión global,
//! estrictamente creciente, que distingue los cuerpos que comparten
//! un mismo nombre.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use super::{check_types, Semantic, SemanticError, Type};
use crate::{
    codegen::{Frame, FRAME_SIZE},
    lex::Identifier,
    source::Located,
};

/// Forma en que se enlaza una función.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Linkage {
    /// Provista por la biblioteca auxiliar, se invoca por su nombre.
    Builtin,

    /// Definida por el programa, se invoca por su nombre versionado.
    Generated,
}

/// Declaración de una función.
#[derive(Debug)]
pub struct Signature {
    pub name: Identifier,
    pub returns: Type,
    pub parameters: Vec<Type>,
    pub overrides: bool,
    pub version: u32,
    pub linkage: Linkage,
}

impl Signature {
    /// Nombre del símbolo LLVM de esta versión, sin `@`.
    pub fn symbol(&self) -> String {
        match self.linkage {
            Linkage::Builtin => self.name.to_string(),
            Linkage::Generated => format!("{}_{}", self.name, self.version),
        }
    }

    /// Determina si los argumentos pueden asignarse a los parámetros.
    pub fn accepts(&self, arguments: &[Type]) -> bool {
        self.parameters.len() == arguments.len()
            && self
                .parameters
                .iter()
                .zip(arguments)
                .all(|(&parameter, &argument)| check_types(parameter, argument))
    }
}

#[derive(Debug, Clone)]
pub enum Symbol {
    Variable { typ: Type, offset: i32 },
    Function(Rc<Signature>),
}

/// Un ámbito léxico.
#[derive(Debug)]
pub struct Scope {
    symbols: Vec<(Identifier, Symbol)>,
    is_loop: bool,
    returns: Option<Type>,
    frame: Option<Frame>,
}

impl Scope {
    fn find(&self, name: &Identifier) -> impl Iterator<Item = &Symbol> {
        let name = name.clone();
        self.symbols
            .iter()
            .filter(move |(symbol, _)| *symbol == name)
            .map(|(_, symbol)| symbol)
    }

    fn functions<'a>(&'a self, name: &Identifier) -> impl Iterator<Item = &'a Rc<Signature>> {
        self.find(name).filter_map(|symbol| match symbol {
            Symbol::Function(signature) => Some(signature),
            Symbol::Variable { .. } => None,
        })
    }
}

/// Listado de cierre de ámbito: una línea por símbolo, en orden de declaración.
impl Display for Scope {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "---end scope---")?;

        for (name, symbol) in &self.symbols {
            match symbol {
                Symbol::Variable { typ, offset } => {
                    writeln!(fmt, "{} {} {}", name, upper(*typ), offset)?
                }

                Symbol::Function(signature) => {
                    let parameters: Vec<_> =
                        signature.parameters.iter().copied().map(upper).collect();

                    writeln!(
                        fmt,
                        "{} ({})->{} 0",
                        name,
                        parameters.join(","),
                        upper(signature.returns)
                    )?
                }
            }
        }

        Ok(())
    }
}

fn upper(typ: Type) -> String {
    typ.to_string().to_uppercase()
}

pub struct SymbolTable {
    scopes: Vec<Scope>,
    offsets: Vec<i32>,
    next_version: u32,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// Construye una tabla con el ámbito de programa y las funciones
    /// `print(string)` y `printi(int)`.
    pub fn new() -> Self {
        let mut table = SymbolTable {
            scopes: Vec::new(),
            offsets: Vec::new(),
            next_version: 0,
        };

        table.push_scope(false, None);

        let builtins = [("print", Type::String), ("printi", Type::Int)];
        for (name, parameter) in builtins {
            table.declare_function(
                Identifier::from(name),
                Type::Void,
                false,
                vec![parameter],
                Linkage::Builtin,
            );
        }

        table
    }

    /// Abre un ámbito. El marco y el contador de desplazamientos se heredan.
    pub fn push_scope(&mut self, is_loop: bool, returns: Option<Type>) {
        let offset = self.offsets.last().copied().unwrap_or(0);
        let frame = self.scopes.last().and_then(|scope| scope.frame);

        self.offsets.push(offset);
        self.scopes.push(Scope {
            symbols: Vec::new(),
            is_loop,
            returns,
            frame,
        });
    }

    /// Cierra el ámbito más interno y lo retorna.
    ///
    /// Al cerrar un bloque dentro de una función, el contador del
    /// ámbito envolvente avanza hasta el del bloque cerrado. Así ningún
    /// desplazamiento se repite dentro de una misma función.
    pub fn pop_scope(&mut self) -> Scope {
        let scope = self.scopes.pop().expect("Popped an empty scope stack");
        let reached = self.offsets.pop().unwrap_or(0);

        if scope.returns.is_none() {
            if let Some(outer) = self.offsets.last_mut() {
                *outer = (*outer).max(reached);
            }
        }

        scope
    }

    /// Declara una variable local y retorna su desplazamiento.
    pub fn declare_variable(&mut self, name: &Located<Identifier>, typ: Type) -> Semantic<i32> {
        self.check_undeclared(name)?;

        let counter = self.offsets.last_mut().expect("No scope is open");
        let offset = *counter;

        if offset >= FRAME_SIZE as i32 {
            let error = SemanticError::FrameExhausted(FRAME_SIZE);
            return Err(Located::at(error, name.location().clone()));
        }

        *counter += 1;
        self.insert(name.as_ref().clone(), Symbol::Variable { typ, offset });

        Ok(offset)
    }

    /// Declara los parámetros de la función actual en `-1`, `-2`, ...
    pub fn declare_parameters(&mut self, parameters: &[(Type, Located<Identifier>)]) -> Semantic<()> {
        for (index, (typ, name)) in parameters.iter().enumerate() {
            self.check_undeclared(name)?;

            let offset = -(index as i32) - 1;
            self.insert(name.as_ref().clone(), Symbol::Variable { typ: *typ, offset });
        }

        Ok(())
    }

    /// Declara una función en el ámbito actual con una versión nueva.
    ///
    /// No se verifican aquí las reglas de `override`.
    pub fn declare_function(
        &mut self,
        name: Identifier,
        returns: Type,
        overrides: bool,
        parameters: Vec<Type>,
        linkage: Linkage,
    ) -> Rc<Signature> {
        let version = self.next_version;
        self.next_version += 1;

        let signature = Rc::new(Signature {
            name: name.clone(),
            returns,
            parameters,
            overrides,
            version,
            linkage,
        });

        self.insert(name, Symbol::Function(Rc::clone(&signature)));
        signature
    }

    /// Versiones de `name` cuyos parámetros son exactamente `parameters`.
    pub fn exact_versions(&self, name: &Identifier, parameters: &[Type]) -> Vec<Rc<Signature>> {
        self.versions(name)
            .filter(|signature| signature.parameters == parameters)
            .cloned()
            .collect()
    }

    /// Versiones de `name` que aceptan argumentos de los tipos dados.
    pub fn resolve_call(&self, name: &Identifier, arguments: &[Type]) -> Vec<Rc<Signature>> {
        self.versions(name)
            .filter(|signature| signature.accepts(arguments))
            .cloned()
            .collect()
    }

    /// Determina si `name` fue declarada por primera vez con `override`.
    pub fn is_overridable(&self, name: &Identifier) -> bool {
        self.versions(name)
            .next()
            .map_or(false, |signature| signature.overrides)
    }

    pub fn is_function(&self, name: &Identifier) -> bool {
        matches!(self.lookup(name), Some(Symbol::Function(_)))
    }

    /// Busca un nombre desde el ámbito más interno hacia afuera.
    pub fn lookup(&self, name: &Identifier) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.find(name).next())
    }

    /// Tipo de retorno de la función que encierra al ámbito actual.
    pub fn closest_return_type(&self) -> Option<Type> {
        self.scopes.iter().rev().find_map(|scope| scope.returns)
    }

    pub fn within_loop(&self) -> bool {
        self.scopes.iter().any(|scope| scope.is_loop)
    }

    pub fn current_frame(&self) -> Option<Frame> {
        self.scopes.last().and_then(|scope| scope.frame)
    }

    pub fn set_current_frame(&mut self, frame: Frame) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.frame = Some(frame);
        }
    }

    fn versions<'a>(&'a self, name: &'a Identifier) -> impl Iterator<Item = &'a Rc<Signature>> {
        self.scopes.iter().flat_map(move |scope| scope.functions(name))
    }

    fn check_undeclared(&self, name: &Located<Identifier>) -> Semantic<()> {
        match self.lookup(name.as_ref()) {
            None => Ok(()),
            Some(_) => {
                let error = SemanticError::Redeclared(name.as_ref().clone());
                Err(Located::at(error, name.location().clone()))
            }
        }
    }

    fn insert(&mut self, name: Identifier, symbol: Symbol) {
        self.scopes
            .last_mut()
            .expect("No scope is open")
            .symbols
            .push((name, symbol));
    }
}
