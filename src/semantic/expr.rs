//! Traducción de expresiones.
//!
//! Toda expresión booleana nace perezosa: en vez de un valor, lleva
//! dos listas de parches con los saltos que deben tomarse cuando la
//! expresión es verdadera o falsa. Esto aplica también a literales,
//! variables y llamadas de tipo `bool`, que se convierten a saltos
//! de inmediato. Un booleano solo se materializa como valor al
//! almacenarse, retornarse o pasarse como argumento (ver
//! [`Context::realize`]).

use crate::{
    codegen::PatchList,
    ir::{Arithmetic, Instruction, Label, Local, Predicate, Value, Width},
    lex::Identifier,
    source::{Located, Location},
};

use super::{check_types, scope::Symbol, Context, Semantic, SemanticError, Type, TypeList};

/// Resultado de traducir una expresión.
#[must_use]
#[derive(Debug)]
pub struct Expr {
    typ: Type,
    form: Form,
}

/// Representación de un resultado.
#[derive(Debug)]
pub enum Form {
    /// Valor ya disponible.
    Value(Value),

    /// Booleano perezoso.
    Jumps(Jumps),
}

/// Saltos pendientes de un booleano perezoso.
///
/// Las dos listas son disjuntas. Un `Jumps` se descarga exactamente
/// una vez, ya sea resolviendo sus listas en una construcción de
/// control o materializándolo.
#[must_use]
#[derive(Debug, Default)]
pub struct Jumps {
    pub on_true: PatchList,
    pub on_false: PatchList,
}

impl Jumps {
    /// Intercambia los destinos.
    pub fn negate(self) -> Jumps {
        Jumps {
            on_true: self.on_false,
            on_false: self.on_true,
        }
    }
}

impl Expr {
    pub fn typ(&self) -> Type {
        self.typ
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn into_form(self) -> Form {
        self.form
    }

    fn value(typ: Type, value: Value) -> Self {
        Expr {
            typ,
            form: Form::Value(value),
        }
    }

    fn jumps(jumps: Jumps) -> Self {
        Expr {
            typ: Type::Bool,
            form: Form::Jumps(jumps),
        }
    }

    /// Valor de una expresión que no puede ser perezosa.
    fn into_value(self) -> Value {
        match self.form {
            Form::Value(value) => value,
            Form::Jumps(_) => panic!("Lazy `{}` expression in value position", self.typ),
        }
    }
}

/// Una llamada ya emitida.
#[must_use]
#[derive(Debug)]
pub struct Invocation {
    returns: Type,
    output: Option<Local>,
}

impl Invocation {
    pub fn returns(&self) -> Type {
        self.returns
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

const BYTE_MAX: i32 = 255;

impl Context {
    pub fn int_literal(&mut self, value: i32) -> Expr {
        Expr::value(Type::Int, Value::Immediate(value))
    }

    pub fn byte_literal(&mut self, value: Located<i32>) -> Semantic<Expr> {
        let (location, value) = value.split();
        if value > BYTE_MAX {
            return Err(Located::at(SemanticError::OutOfRange(value), location));
        }

        Ok(Expr::value(Type::Byte, Value::Immediate(value)))
    }

    pub fn string_literal(&mut self, text: &str) -> Expr {
        let value = self.code.string(text);
        Expr::value(Type::String, value)
    }

    /// Un literal booleano es un salto incondicional en una de las listas.
    pub fn bool_literal(&mut self, value: bool) -> Expr {
        let patch = self.code.jump();

        let jumps = Jumps::default();
        let jumps = if value {
            Jumps {
                on_true: patch.into(),
                ..jumps
            }
        } else {
            Jumps {
                on_false: patch.into(),
                ..jumps
            }
        };

        Expr::jumps(jumps)
    }

    /// Lee una variable desde el marco de la función actual.
    pub fn identifier(&mut self, name: &Located<Identifier>) -> Semantic<Expr> {
        let (typ, offset) = self.variable(name)?;
        let frame = self
            .symbols
            .current_frame()
            .expect("Variable access outside of a function frame");

        let loaded = Value::Local(self.code.load(frame, offset));
        match typ {
            Type::Bool => Ok(Expr::jumps(self.test(loaded))),
            _ => Ok(Expr::value(typ, loaded)),
        }
    }

    /// Operación aritmética binaria.
    ///
    /// El resultado es `int` si algún operando lo es, de lo contrario
    /// `byte`. La división se protege contra divisores nulos en tiempo
    /// de ejecución y es sin signo entre bytes.
    pub fn arithmetic(&mut self, lhs: Located<Expr>, op: BinOp, rhs: Located<Expr>) -> Semantic<Expr> {
        let lhs = numeric(lhs)?;
        let rhs = numeric(rhs)?;

        let bytes = lhs.typ == Type::Byte && rhs.typ == Type::Byte;
        let typ = if bytes { Type::Byte } else { Type::Int };

        let (lhs, rhs) = (lhs.into_value(), rhs.into_value());
        let op = match op {
            BinOp::Add => Arithmetic::Add,
            BinOp::Sub => Arithmetic::Sub,
            BinOp::Mul => Arithmetic::Mul,
            BinOp::Div => {
                self.code.emit(Instruction::Call {
                    output: None,
                    returns: Width::Void,
                    function: String::from("check_division"),
                    arguments: vec![(Width::Word, rhs.clone())],
                });

                if bytes {
                    Arithmetic::UnsignedDiv
                } else {
                    Arithmetic::SignedDiv
                }
            }
        };

        let mut result = Value::Local(self.code.arithmetic(op, lhs, rhs));
        if typ == Type::Byte {
            result = self.truncate(result);
        }

        Ok(Expr::value(typ, result))
    }

    /// Comparación entre números, siempre perezosa.
    pub fn relational(&mut self, lhs: Located<Expr>, op: RelOp, rhs: Located<Expr>) -> Semantic<Expr> {
        let lhs = numeric(lhs)?;
        let rhs = numeric(rhs)?;

        let unsigned = lhs.typ == Type::Byte && rhs.typ == Type::Byte;
        let predicate = match (op, unsigned) {
            (RelOp::Equal, _) => Predicate::Eq,
            (RelOp::NotEqual, _) => Predicate::Ne,
            (RelOp::Less, false) => Predicate::Slt,
            (RelOp::Greater, false) => Predicate::Sgt,
            (RelOp::LessOrEqual, false) => Predicate::Sle,
            (RelOp::GreaterOrEqual, false) => Predicate::Sge,
            (RelOp::Less, true) => Predicate::Ult,
            (RelOp::Greater, true) => Predicate::Ugt,
            (RelOp::LessOrEqual, true) => Predicate::Ule,
            (RelOp::GreaterOrEqual, true) => Predicate::Uge,
        };

        let output = self.code.gen_local();
        self.code.emit(Instruction::Compare {
            output,
            predicate,
            lhs: lhs.into_value(),
            rhs: rhs.into_value(),
        });

        Ok(Expr::jumps(self.branch(output)))
    }

    /// Conjunción o disyunción con cortocircuito.
    ///
    /// `marker` es la etiqueta que el parser generó entre ambos
    /// operandos, es decir, el inicio del código de `rhs`.
    pub fn logical(
        &mut self,
        lhs: Located<Expr>,
        op: LogicOp,
        marker: Label,
        rhs: Located<Expr>,
    ) -> Semantic<Expr> {
        let lhs = lazy(lhs)?;
        let rhs = lazy(rhs)?;

        let jumps = match op {
            LogicOp::Or => {
                self.code.backpatch(lhs.on_false, marker);
                Jumps {
                    on_true: lhs.on_true.merge(rhs.on_true),
                    on_false: rhs.on_false,
                }
            }

            LogicOp::And => {
                self.code.backpatch(lhs.on_true, marker);
                Jumps {
                    on_true: rhs.on_true,
                    on_false: lhs.on_false.merge(rhs.on_false),
                }
            }
        };

        Ok(Expr::jumps(jumps))
    }

    /// Negación lógica. No emite código para un operando perezoso.
    pub fn not(&mut self, operand: Located<Expr>) -> Semantic<Expr> {
        let jumps = self.condition(operand)?;
        Ok(Expr::jumps(jumps.negate()))
    }

    /// Conversión explícita entre tipos numéricos.
    pub fn cast(&mut self, target: Type, operand: Located<Expr>) -> Semantic<Expr> {
        let (location, operand) = operand.split();
        if !target.is_numeric() || !operand.typ.is_numeric() {
            let error = SemanticError::BadCast(operand.typ, target);
            return Err(Located::at(error, location));
        }

        let narrowing = target == Type::Byte && operand.typ == Type::Int;
        let value = match operand.into_value() {
            Value::Immediate(constant) if target == Type::Byte && constant > BYTE_MAX => {
                return Err(Located::at(SemanticError::OutOfRange(constant), location))
            }

            value @ Value::Immediate(_) => value,
            value if narrowing => self.truncate(value),
            value => value,
        };

        Ok(Expr::value(target, value))
    }

    /// Materializa un argumento de llamada.
    ///
    /// Debe invocarse apenas se traduce cada argumento, antes de
    /// traducir el siguiente.
    pub fn argument(&mut self, argument: Located<Expr>) -> Located<Expr> {
        argument.map(|argument| {
            let typ = argument.typ;
            let value = self.materialize(argument);

            Expr::value(typ, value)
        })
    }

    /// Resuelve y emite una llamada.
    ///
    /// Los argumentos deben haber pasado por [`Context::argument`].
    pub fn invoke(&mut self, name: &Located<Identifier>, arguments: Vec<Located<Expr>>) -> Semantic<Invocation> {
        let fail = |error| Err(Located::at(error, name.location().clone()));
        let id = name.as_ref();

        if !self.symbols.is_function(id) {
            return fail(SemanticError::UndefinedFunction(id.clone()));
        }

        let types: Vec<_> = arguments.iter().map(|argument| argument.as_ref().typ).collect();
        let mut candidates = self.symbols.resolve_call(id, &types);

        let signature = match candidates.len() {
            1 => candidates.remove(0),
            0 => return fail(SemanticError::PrototypeMismatch(id.clone(), TypeList(types))),
            _ => return fail(SemanticError::AmbiguousCall(id.clone(), TypeList(types))),
        };

        let arguments = signature
            .parameters
            .iter()
            .zip(arguments)
            .map(|(parameter, argument)| (parameter.width(), argument.into_inner().into_value()))
            .collect();

        let output = match signature.returns {
            Type::Void => None,
            _ => Some(self.code.gen_local()),
        };

        self.code.emit(Instruction::Call {
            output,
            returns: signature.returns.width(),
            function: signature.symbol(),
            arguments,
        });

        Ok(Invocation {
            returns: signature.returns,
            output,
        })
    }

    /// Uso de una llamada como expresión.
    ///
    /// Una llamada `void` produce un marcador de posición sin valor
    /// útil, que las verificaciones de tipos rechazan donde se
    /// requiere un valor.
    pub fn call(&mut self, invocation: Invocation) -> Expr {
        let Invocation { returns, output } = invocation;

        match (returns, output) {
            (Type::Bool, Some(output)) => Expr::jumps(self.test(Value::Local(output))),
            (typ, Some(output)) => Expr::value(typ, Value::Local(output)),
            (typ, None) => Expr::value(typ, Value::Immediate(0)),
        }
    }

    /// Condición de una construcción de control.
    pub fn condition(&mut self, condition: Located<Expr>) -> Semantic<Jumps> {
        let (location, condition) = condition.split();

        match condition.form {
            _ if condition.typ != Type::Bool => {
                let error = SemanticError::ExpectedType(Type::Bool, condition.typ);
                Err(Located::at(error, location))
            }

            Form::Jumps(jumps) => Ok(jumps),
            Form::Value(value) => Ok(self.test(value)),
        }
    }

    /// Convierte un booleano perezoso en un valor.
    ///
    /// Emite una etiqueta para cada desenlace, ambas seguidas de un
    /// salto a una etiqueta de unión donde un `phi` selecciona 1 o 0.
    /// Esta operación consume sus listas, por lo que no puede
    /// aplicarse dos veces al mismo resultado:
    ///
    /// ```compile_fail
    /// use fanc::semantic::{Context, Form, Options};
    ///
    /// let mut cx = Context::new(Options::empty(), "");
    /// if let Form::Jumps(jumps) = cx.bool_literal(true).into_form() {
    ///     cx.realize(jumps);
    ///     cx.realize(jumps);
    /// }
    /// ```
    pub fn realize(&mut self, jumps: Jumps) -> Value {
        let on_true = self.code.gen_label();
        let from_true = self.code.jump();
        let on_false = self.code.gen_label();
        let from_false = self.code.jump();
        let join = self.code.gen_label();

        self.code.backpatch(jumps.on_true, on_true);
        self.code.backpatch(jumps.on_false, on_false);
        self.code
            .backpatch(PatchList::from(from_true).merge(from_false.into()), join);

        let output = self.code.gen_local();
        self.code.emit(Instruction::Phi {
            output,
            on_true,
            on_false,
        });

        Value::Local(output)
    }

    /// Valor de cualquier expresión, materializándola de ser necesario.
    pub(super) fn materialize(&mut self, expr: Expr) -> Value {
        match expr.form {
            Form::Value(value) => value,
            Form::Jumps(jumps) => self.realize(jumps),
        }
    }

    /// Busca una variable visible.
    pub(super) fn variable(&self, name: &Located<Identifier>) -> Semantic<(Type, i32)> {
        let id = name.as_ref();
        let error = match self.symbols.lookup(id) {
            Some(Symbol::Variable { typ, offset }) => return Ok((*typ, *offset)),
            Some(Symbol::Function(_)) => SemanticError::NotAVariable(id.clone()),
            None => SemanticError::Undefined(id.clone()),
        };

        Err(Located::at(error, name.location().clone()))
    }

    /// Compara un valor contra cero y salta según el resultado.
    fn test(&mut self, value: Value) -> Jumps {
        let output = self.code.gen_local();
        self.code.emit(Instruction::Compare {
            output,
            predicate: Predicate::Ne,
            lhs: value,
            rhs: Value::Immediate(0),
        });

        self.branch(output)
    }

    fn branch(&mut self, condition: Local) -> Jumps {
        let (on_true, on_false) = self.code.branch(condition);
        Jumps {
            on_true: on_true.into(),
            on_false: on_false.into(),
        }
    }

    fn truncate(&mut self, value: Value) -> Value {
        let masked = self
            .code
            .arithmetic(Arithmetic::And, value, Value::Immediate(BYTE_MAX));

        Value::Local(masked)
    }
}

fn numeric(operand: Located<Expr>) -> Semantic<Expr> {
    let (location, operand) = operand.split();
    if operand.typ.is_numeric() {
        Ok(operand)
    } else {
        Err(Located::at(SemanticError::ExpectedNumeric(operand.typ), location))
    }
}

/// Saltos de un operando lógico.
fn lazy(operand: Located<Expr>) -> Semantic<Jumps> {
    let (location, operand) = operand.split();

    match operand.form {
        _ if operand.typ != Type::Bool => {
            let error = SemanticError::ExpectedType(Type::Bool, operand.typ);
            Err(Located::at(error, location))
        }

        Form::Jumps(jumps) => Ok(jumps),
        Form::Value(_) => unreachable!("Boolean operand was materialized before its consumer"),
    }
}

/// Verificación de asignación compartida por declaraciones, asignaciones y retornos.
pub(super) fn assignable(target: Type, source: &Located<Expr>) -> Semantic<()> {
    let typ = source.as_ref().typ;
    if check_types(target, typ) {
        Ok(())
    } else {
        Err(Located::at(
            SemanticError::ExpectedType(target, typ),
            Location::clone(source.location()),
        ))
    }
}
