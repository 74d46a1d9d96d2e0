//! Traducción de sentencias y funciones.
//!
//! Los marcadores del parser se corresponden con dos operaciones:
//! [`Context::marker`] captura la etiqueta de lo que sigue y
//! [`Context::skip`] emite un salto cuyo destino se conocerá después.
//! Los saltos de `break` y `continue` suben dentro de [`Statement`]s
//! hasta el ciclo más cercano, el cual los resuelve.

use crate::{
    codegen::{Frame, PatchList},
    ir::{Instruction, Label, Value},
    lex::Identifier,
    source::{Located, Location},
};

use super::{
    expr::{assignable, Expr, Invocation, Jumps},
    scope::Linkage,
    Context, Semantic, SemanticError, Type,
};

/// Resultado de traducir una sentencia o secuencia de sentencias.
#[must_use]
#[derive(Debug, Default)]
pub struct Statement {
    breaks: PatchList,
    continues: PatchList,
    returns: bool,
}

impl Statement {
    /// Secuencia `self` seguida de `next`.
    pub fn then(self, next: Statement) -> Statement {
        Statement {
            breaks: self.breaks.merge(next.breaks),
            continues: self.continues.merge(next.continues),
            returns: next.returns,
        }
    }

    /// Determina si la última sentencia de la secuencia es un `return`.
    pub fn returns(&self) -> bool {
        self.returns
    }

    /// Propaga los saltos pendientes de una sentencia anidada.
    fn nested(self) -> Statement {
        Statement {
            returns: false,
            ..self
        }
    }
}

impl Context {
    /// `T x;`
    pub fn declare(&mut self, typ: Type, name: &Located<Identifier>) -> Semantic<Statement> {
        self.define(typ, name, Value::Immediate(0))
    }

    /// `T x = e;`
    pub fn declare_init(
        &mut self,
        typ: Type,
        name: &Located<Identifier>,
        value: Located<Expr>,
    ) -> Semantic<Statement> {
        if self.symbols.lookup(name.as_ref()).is_some() {
            let error = SemanticError::Redeclared(name.as_ref().clone());
            return Err(Located::at(error, name.location().clone()));
        }

        assignable(typ, &value)?;

        let value = self.materialize(value.into_inner());
        self.define(typ, name, value)
    }

    /// `x = e;`
    pub fn assign(&mut self, name: &Located<Identifier>, value: Located<Expr>) -> Semantic<Statement> {
        let (typ, offset) = self.variable(name)?;
        assignable(typ, &value)?;

        let value = self.materialize(value.into_inner());
        let frame = self.frame();
        self.code.store(frame, offset, value);

        Ok(Statement::default())
    }

    /// `f(...);`
    ///
    /// El valor de retorno, si lo hay, se descarta.
    pub fn call_statement(&mut self, _invocation: Invocation) -> Statement {
        Statement::default()
    }

    /// `return;`
    pub fn return_void(&mut self, location: Location) -> Semantic<Statement> {
        let returns = self.returns();
        if returns != Type::Void {
            let error = SemanticError::ExpectedType(returns, Type::Void);
            return Err(Located::at(error, location));
        }

        self.code.emit(Instruction::Return(None));
        Ok(Statement {
            returns: true,
            ..Default::default()
        })
    }

    /// `return e;`
    pub fn return_value(&mut self, value: Located<Expr>) -> Semantic<Statement> {
        let returns = self.returns();
        let instruction = match (returns, value.as_ref().typ()) {
            // Retorno del resultado de otra función `void`
            (Type::Void, Type::Void) => Instruction::Return(None),

            (Type::Void, found) => {
                let error = SemanticError::ExpectedType(Type::Void, found);
                return Err(Located::at(error, value.location().clone()));
            }

            _ => {
                assignable(returns, &value)?;

                let value = self.materialize(value.into_inner());
                Instruction::Return(Some((returns.width(), value)))
            }
        };

        self.code.emit(instruction);
        Ok(Statement {
            returns: true,
            ..Default::default()
        })
    }

    /// `break;`
    pub fn break_loop(&mut self, location: Location) -> Semantic<Statement> {
        if !self.symbols.within_loop() {
            return Err(Located::at(SemanticError::UnexpectedBreak, location));
        }

        Ok(Statement {
            breaks: self.code.jump().into(),
            ..Default::default()
        })
    }

    /// `continue;`
    pub fn continue_loop(&mut self, location: Location) -> Semantic<Statement> {
        if !self.symbols.within_loop() {
            return Err(Located::at(SemanticError::UnexpectedContinue, location));
        }

        Ok(Statement {
            continues: self.code.jump().into(),
            ..Default::default()
        })
    }

    /// Marcador M: etiqueta de la siguiente instrucción.
    pub fn marker(&mut self) -> Label {
        self.code.gen_label()
    }

    /// Marcador N: salto con destino pendiente.
    pub fn skip(&mut self) -> PatchList {
        self.code.jump().into()
    }

    /// `if (cond) M body`
    pub fn if_then(&mut self, condition: Jumps, then: Label, body: Statement) -> Statement {
        self.code.backpatch(condition.on_true, then);

        let end = self.code.gen_label();
        self.code.backpatch(condition.on_false, end);

        body.nested()
    }

    /// `if (cond) M1 body N else M2 alternative`
    pub fn if_else(
        &mut self,
        condition: Jumps,
        then: Label,
        body: Statement,
        skip: PatchList,
        otherwise: Label,
        alternative: Statement,
    ) -> Statement {
        self.code.backpatch(condition.on_true, then);
        self.code.backpatch(condition.on_false, otherwise);

        let end = self.code.gen_label();
        self.code.backpatch(skip, end);

        body.then(alternative).nested()
    }

    /// `while (M1 cond) M2 body`
    ///
    /// Los `break` y `continue` del cuerpo se resuelven aquí y no se
    /// propagan más allá del ciclo.
    pub fn while_loop(&mut self, start: Label, condition: Jumps, then: Label, body: Statement) -> Statement {
        self.code.jump_to(start);
        let exit = self.code.gen_label();

        self.code.backpatch(condition.on_true, then);
        self.code.backpatch(condition.on_false, exit);
        self.code.backpatch(body.breaks, exit);
        self.code.backpatch(body.continues, start);

        Statement::default()
    }

    /// Encabezado de una función.
    ///
    /// Verifica las reglas de `override`, declara la función con una
    /// versión nueva, abre su ámbito con los parámetros y emite el
    /// prólogo con el marco.
    pub fn begin_function(
        &mut self,
        overrides: bool,
        returns: Type,
        name: &Located<Identifier>,
        parameters: &[(Type, Located<Identifier>)],
    ) -> Semantic<()> {
        let id = name.as_ref();
        let types: Vec<_> = parameters.iter().map(|(typ, _)| *typ).collect();

        if let Some(error) = self.override_violation(overrides, returns, id, &types) {
            return Err(Located::at(error, name.location().clone()));
        }

        let signature =
            self.symbols
                .declare_function(id.clone(), returns, overrides, types, Linkage::Generated);

        self.symbols.push_scope(false, Some(returns));
        self.symbols.declare_parameters(parameters)?;

        let function = signature.symbol();
        log::debug!("Function prologue for `{}` as @{}", id, function);

        self.code.emit(Instruction::Define {
            function,
            returns: returns.width(),
            parameters: signature.parameters.iter().map(|typ| typ.width()).collect(),
        });

        let frame = self.code.alloc_frame(parameters.len() as u32);
        self.symbols.set_current_frame(frame);

        Ok(())
    }

    /// Cierre de una función.
    ///
    /// Si la última sentencia del cuerpo no es un `return`, se agrega
    /// un retorno del valor por omisión del tipo.
    pub fn end_function(&mut self, body: Statement) {
        debug_assert!(body.breaks.is_empty() && body.continues.is_empty());

        if !body.returns {
            let value = match self.returns() {
                Type::Void => None,
                typ => Some((typ.width(), Value::Immediate(0))),
            };

            self.code.emit(Instruction::Return(value));
        }

        self.code.emit(Instruction::EndDefine);
        self.exit_block();
    }

    fn override_violation(
        &self,
        overrides: bool,
        returns: Type,
        name: &Identifier,
        parameters: &[Type],
    ) -> Option<SemanticError> {
        let name = name.clone();

        if self.symbols.is_function(&name) {
            match (self.symbols.is_overridable(&name), overrides) {
                (false, false) => return Some(SemanticError::Redefined(name)),
                (false, true) => return Some(SemanticError::MissingOverrideKeyword(name)),
                (true, false) => return Some(SemanticError::SpuriousOverrideKeyword(name)),

                (true, true) => {
                    let clash = self
                        .symbols
                        .exact_versions(&name, parameters)
                        .iter()
                        .any(|signature| signature.returns == returns);

                    if clash {
                        return Some(SemanticError::Redefined(name));
                    }
                }
            }
        }

        if overrides && name.as_ref() == "main" {
            return Some(SemanticError::MainOverride);
        }

        None
    }

    fn define(&mut self, typ: Type, name: &Located<Identifier>, value: Value) -> Semantic<Statement> {
        let offset = self.symbols.declare_variable(name, typ)?;

        let frame = self.frame();
        self.code.store(frame, offset, value);

        Ok(Statement::default())
    }

    fn returns(&self) -> Type {
        self.symbols
            .closest_return_type()
            .expect("Return outside of a function")
    }

    fn frame(&self) -> Frame {
        self.symbols
            .current_frame()
            .expect("Variable access outside of a function frame")
    }
}
