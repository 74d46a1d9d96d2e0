//! Representación intermedia emitida.
//!
//! Cada [`Instruction`] corresponde exactamente a una línea de texto
//! LLVM en la salida final. Las instrucciones de salto guardan sus
//! destinos como ranuras `Option<Label>`; una ranura vacía es un
//! destino todavía desconocido que se resuelve mediante backpatching
//! (ver [`crate::codegen`]).

use std::fmt::{self, Display};

/// Etiqueta de bloque básico, nombrada por su posición en el buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub usize);

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "label_{}", self.0)
    }
}

/// Registro local a una función.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Local(pub u32);

impl Display for Local {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "%var_{}", self.0)
    }
}

/// Nombre global del módulo.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Global(pub u32);

impl Display for Global {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "@.str_{}", self.0)
    }
}

/// Representación de máquina de un tipo del lenguaje.
///
/// Todos los escalares numéricos y booleanos viajan como `i32`;
/// los bytes se mantienen en rango mediante máscaras explícitas.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Width {
    Void,
    Word,
    Text,
}

impl Display for Width {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Void => fmt.write_str("void"),
            Width::Word => fmt.write_str("i32"),
            Width::Text => fmt.write_str("i8*"),
        }
    }
}

/// Operando de una instrucción.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Constante entera.
    Immediate(i32),

    /// Resultado de una instrucción previa.
    Local(Local),

    /// Argumento posicional de la función actual (`%0`, `%1`, ...).
    Argument(u32),

    /// Puntero al primer carácter de una cadena constante.
    Text { global: Global, length: usize },
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Immediate(value) => write!(fmt, "{}", value),
            Value::Local(local) => write!(fmt, "{}", local),
            Value::Argument(index) => write!(fmt, "%{}", index),
            Value::Text { global, length } => write!(
                fmt,
                "getelementptr ([{0} x i8], [{0} x i8]* {1}, i32 0, i32 0)",
                length, global
            ),
        }
    }
}

/// Operación aritmética entera.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Sub,
    Mul,
    SignedDiv,
    UnsignedDiv,
    And,
}

impl Display for Arithmetic {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = match self {
            Arithmetic::Add => "add",
            Arithmetic::Sub => "sub",
            Arithmetic::Mul => "mul",
            Arithmetic::SignedDiv => "sdiv",
            Arithmetic::UnsignedDiv => "udiv",
            Arithmetic::And => "and",
        };

        fmt.write_str(mnemonic)
    }
}

/// Predicado de comparación entera (`icmp`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Slt,
    Sgt,
    Sle,
    Sge,
    Ult,
    Ugt,
    Ule,
    Uge,
}

impl Display for Predicate {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Predicate::*;

        let mnemonic = match self {
            Eq => "eq",
            Ne => "ne",
            Slt => "slt",
            Sgt => "sgt",
            Sle => "sle",
            Sge => "sge",
            Ult => "ult",
            Ugt => "ugt",
            Ule => "ule",
            Uge => "uge",
        };

        fmt.write_str(mnemonic)
    }
}

/// Selector de ranura de destino dentro de una instrucción de salto.
///
/// Un salto incondicional solo tiene [`Slot::First`]. Un salto
/// condicional tiene ambas, en orden textual: destino verdadero y
/// destino falso.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    SetLabel(Label),
    Jump(Option<Label>),
    Branch {
        condition: Local,
        on_true: Option<Label>,
        on_false: Option<Label>,
    },
    Arithmetic {
        output: Local,
        op: Arithmetic,
        lhs: Value,
        rhs: Value,
    },
    Compare {
        output: Local,
        predicate: Predicate,
        lhs: Value,
        rhs: Value,
    },
    /// Unión de un booleano: 1 si se llega desde `on_true`, 0 desde `on_false`.
    Phi {
        output: Local,
        on_true: Label,
        on_false: Label,
    },
    Alloca {
        output: Local,
        count: u32,
    },
    ElementPtr {
        output: Local,
        base: Local,
        offset: i32,
    },
    Load {
        output: Local,
        address: Local,
    },
    Store {
        value: Value,
        address: Local,
    },
    Call {
        output: Option<Local>,
        returns: Width,
        function: String,
        arguments: Vec<(Width, Value)>,
    },
    Return(Option<(Width, Value)>),
    Define {
        function: String,
        returns: Width,
        parameters: Vec<Width>,
    },
    EndDefine,
}

impl Instruction {
    /// Determina si la instrucción cierra su bloque básico.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_) | Instruction::Branch { .. } | Instruction::Return(_)
        )
    }

    /// Obtiene la ranura de destino seleccionada, si la instrucción la tiene.
    pub fn target_mut(&mut self, slot: Slot) -> Option<&mut Option<Label>> {
        match (self, slot) {
            (Instruction::Jump(target), Slot::First) => Some(target),
            (Instruction::Branch { on_true, .. }, Slot::First) => Some(on_true),
            (Instruction::Branch { on_false, .. }, Slot::Second) => Some(on_false),
            _ => None,
        }
    }

    /// Itera sobre las ranuras de destino que siguen sin resolver.
    pub fn unresolved(&self) -> impl Iterator<Item = Slot> {
        let slots = match self {
            Instruction::Jump(None) => [Some(Slot::First), None],
            Instruction::Branch {
                on_true, on_false, ..
            } => [
                on_true.is_none().then(|| Slot::First),
                on_false.is_none().then(|| Slot::Second),
            ],
            _ => [None, None],
        };

        slots.into_iter().flatten()
    }
}

/// Destino de salto. Un destino sin resolver se imprime con el
/// marcador tradicional `@`.
struct Target(Option<Label>);

impl Display for Target {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(label) => write!(fmt, "label %{}", label),
            None => fmt.write_str("label @"),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            SetLabel(label) => write!(fmt, "{}:", label),
            Jump(target) => write!(fmt, "    br {}", Target(*target)),

            Branch {
                condition,
                on_true,
                on_false,
            } => write!(
                fmt,
                "    br i1 {}, {}, {}",
                condition,
                Target(*on_true),
                Target(*on_false)
            ),

            Arithmetic {
                output,
                op,
                lhs,
                rhs,
            } => write!(fmt, "    {} = {} i32 {}, {}", output, op, lhs, rhs),

            Compare {
                output,
                predicate,
                lhs,
                rhs,
            } => write!(fmt, "    {} = icmp {} i32 {}, {}", output, predicate, lhs, rhs),

            Phi {
                output,
                on_true,
                on_false,
            } => write!(
                fmt,
                "    {} = phi i32 [ 1, %{} ], [ 0, %{} ]",
                output, on_true, on_false
            ),

            Alloca { output, count } => write!(fmt, "    {} = alloca i32, i32 {}", output, count),

            ElementPtr {
                output,
                base,
                offset,
            } => write!(
                fmt,
                "    {} = getelementptr i32, i32* {}, i32 {}",
                output, base, offset
            ),

            Load { output, address } => write!(fmt, "    {} = load i32, i32* {}", output, address),
            Store { value, address } => write!(fmt, "    store i32 {}, i32* {}", value, address),

            Call {
                output,
                returns,
                function,
                arguments,
            } => {
                fmt.write_str("    ")?;
                if let Some(output) = output {
                    write!(fmt, "{} = ", output)?;
                }

                write!(fmt, "call {} @{}(", returns, function)?;
                for (index, (width, value)) in arguments.iter().enumerate() {
                    if index > 0 {
                        fmt.write_str(", ")?;
                    }

                    write!(fmt, "{} {}", width, value)?;
                }

                fmt.write_str(")")
            }

            Return(None) => fmt.write_str("    ret void"),
            Return(Some((width, value))) => write!(fmt, "    ret {} {}", width, value),

            Define {
                function,
                returns,
                parameters,
            } => {
                write!(fmt, "define {} @{}(", returns, function)?;
                for (index, width) in parameters.iter().enumerate() {
                    if index > 0 {
                        fmt.write_str(", ")?;
                    }

                    write!(fmt, "{}", width)?;
                }

                fmt.write_str(") {")
            }

            EndDefine => fmt.write_str("}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering() {
        let branch = Instruction::Branch {
            condition: Local(3),
            on_true: Some(Label(7)),
            on_false: None,
        };

        assert_eq!(branch.to_string(), "    br i1 %var_3, label %label_7, label @");

        let call = Instruction::Call {
            output: Some(Local(9)),
            returns: Width::Word,
            function: String::from("f_4"),
            arguments: vec![
                (Width::Word, Value::Argument(0)),
                (
                    Width::Text,
                    Value::Text {
                        global: Global(2),
                        length: 3,
                    },
                ),
            ],
        };

        assert_eq!(
            call.to_string(),
            "    %var_9 = call i32 @f_4(i32 %0, i8* getelementptr ([3 x i8], [3 x i8]* @.str_2, i32 0, i32 0))"
        );

        let define = Instruction::Define {
            function: String::from("main_2"),
            returns: Width::Void,
            parameters: vec![],
        };

        assert_eq!(define.to_string(), "define void @main_2() {");
    }

    #[test]
    fn slots() {
        let mut jump = Instruction::Jump(None);
        assert!(jump.target_mut(Slot::Second).is_none());
        assert_eq!(jump.unresolved().collect::<Vec<_>>(), vec![Slot::First]);

        *jump.target_mut(Slot::First).unwrap() = Some(Label(1));
        assert_eq!(jump.unresolved().count(), 0);
        assert!(jump.is_terminator());
    }
}
