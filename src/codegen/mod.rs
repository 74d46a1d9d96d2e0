//! Buffer de código.
//!
//! El buffer acumula dos secciones independientes: una sección de
//! datos (declaraciones globales, cadenas constantes y la biblioteca
//! auxiliar) y una sección de código formada por [`Instruction`]s
//! direccionables por posición. Las instrucciones de salto pueden
//! emitirse con destinos desconocidos; estos se resuelven después por
//! backpatching a partir de [`PatchList`]s.
//!
//! Este módulo no conoce la semántica del lenguaje fuente.

use std::io::{self, Write};

use crate::ir::{Arithmetic, Global, Instruction, Label, Local, Slot, Value};

mod patch;

pub use patch::{Patch, PatchList};

/// Cantidad máxima de variables locales por función.
pub const FRAME_SIZE: u32 = 50;

/// Base de marco de una función.
///
/// Toda variable de la función se direcciona como un desplazamiento
/// relativo a este registro. Los parámetros se encuentran en
/// desplazamientos negativos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Frame(Local);

#[derive(Default)]
pub struct CodeBuffer {
    code: Vec<Instruction>,
    data: Vec<String>,
    next_name: u32,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Default::default()
    }

    /// Agrega una instrucción a la sección de código y retorna su posición.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    /// Agrega una línea a la sección de datos.
    pub fn emit_global<S: Into<String>>(&mut self, line: S) {
        self.data.push(line.into());
    }

    /// Copia un texto, línea por línea y sin interpretarlo, a la sección de datos.
    pub fn emit_library(&mut self, text: &str) {
        self.data.extend(text.lines().map(String::from));
    }

    /// Define una etiqueta en la posición actual.
    ///
    /// La etiqueta siempre denota la siguiente instrucción que se emita
    /// después de esta llamada. Si el bloque anterior no terminaba con
    /// un salto o retorno, se le cierra con un salto explícito hacia la
    /// nueva etiqueta, ya que LLVM no admite caídas implícitas entre
    /// bloques.
    pub fn gen_label(&mut self) -> Label {
        let falls_through = match self.code.last() {
            None => false,
            Some(last) => !last.is_terminator() && !matches!(last, Instruction::EndDefine),
        };

        if falls_through {
            let label = Label(self.code.len() + 1);
            self.emit(Instruction::Jump(Some(label)));
        }

        let label = Label(self.code.len());
        self.emit(Instruction::SetLabel(label));

        label
    }

    /// Reserva un nombre local nuevo.
    pub fn gen_local(&mut self) -> Local {
        Local(self.fresh())
    }

    /// Reserva un nombre global nuevo.
    pub fn gen_global(&mut self) -> Global {
        Global(self.fresh())
    }

    /// Emite un salto incondicional con destino pendiente.
    pub fn jump(&mut self) -> Patch {
        let position = self.emit(Instruction::Jump(None));
        Patch {
            position,
            slot: Slot::First,
        }
    }

    /// Emite un salto incondicional a una etiqueta ya conocida.
    pub fn jump_to(&mut self, label: Label) -> usize {
        self.emit(Instruction::Jump(Some(label)))
    }

    /// Emite un salto condicional con ambos destinos pendientes.
    ///
    /// Retorna primero el parche del destino verdadero y luego el del falso.
    pub fn branch(&mut self, condition: Local) -> (Patch, Patch) {
        let position = self.emit(Instruction::Branch {
            condition,
            on_true: None,
            on_false: None,
        });

        let on_true = Patch {
            position,
            slot: Slot::First,
        };

        let on_false = Patch {
            position,
            slot: Slot::Second,
        };

        (on_true, on_false)
    }

    /// Resuelve cada ranura de la lista hacia `label`.
    ///
    /// # Panics
    /// Si alguna ranura no existe o ya fue resuelta. Esto indica una
    /// lista de parches mal construida y nunca un error del programa
    /// fuente.
    pub fn backpatch(&mut self, list: PatchList, label: Label) {
        for Patch { position, slot } in list {
            log::trace!("Backpatching {:?} slot at {} to {}", slot, position, label);

            let target = self
                .code
                .get_mut(position)
                .and_then(|instruction| instruction.target_mut(slot));

            match target {
                Some(target) if target.is_none() => *target = Some(label),
                _ => panic!(
                    "No unresolved {:?} target at position {} to patch",
                    slot, position
                ),
            }
        }
    }

    /// Emite el prólogo de marco de una función con `arity` parámetros.
    ///
    /// El arreglo reservado tiene espacio para [`FRAME_SIZE`] locales
    /// más los parámetros. Los argumentos se copian debajo de la base,
    /// de forma que el parámetro `i` (contando desde cero) queda en el
    /// desplazamiento `-(i + 1)`.
    pub fn alloc_frame(&mut self, arity: u32) -> Frame {
        let raw = self.gen_local();
        self.emit(Instruction::Alloca {
            output: raw,
            count: FRAME_SIZE + arity,
        });

        for index in 0..arity {
            let address = self.gen_local();
            self.emit(Instruction::ElementPtr {
                output: address,
                base: raw,
                offset: (arity - 1 - index) as i32,
            });

            self.emit(Instruction::Store {
                value: Value::Argument(index),
                address,
            });
        }

        if arity == 0 {
            return Frame(raw);
        }

        let base = self.gen_local();
        self.emit(Instruction::ElementPtr {
            output: base,
            base: raw,
            offset: arity as i32,
        });

        Frame(base)
    }

    /// Lee la variable en `offset`.
    pub fn load(&mut self, frame: Frame, offset: i32) -> Local {
        let address = self.address(frame, offset);
        let output = self.gen_local();
        self.emit(Instruction::Load { output, address });

        output
    }

    /// Escribe `value` en la variable en `offset`.
    pub fn store(&mut self, frame: Frame, offset: i32, value: Value) {
        let address = self.address(frame, offset);
        self.emit(Instruction::Store { value, address });
    }

    /// Emite una operación aritmética hacia un registro nuevo.
    pub fn arithmetic(&mut self, op: Arithmetic, lhs: Value, rhs: Value) -> Local {
        let output = self.gen_local();
        self.emit(Instruction::Arithmetic {
            output,
            op,
            lhs,
            rhs,
        });

        output
    }

    /// Define una cadena constante en la sección de datos.
    ///
    /// El resultado es una expresión constante de tipo `i8*`; no se
    /// emite nada en la sección de código.
    pub fn string(&mut self, text: &str) -> Value {
        let global = self.gen_global();
        let length = text.len() + 1;

        let mut escaped = String::with_capacity(length);
        for byte in text.bytes() {
            match byte {
                b'"' | b'\\' => escaped.push_str(&format!("\\{:02X}", byte)),
                b' '..=b'~' => escaped.push(byte as char),
                _ => escaped.push_str(&format!("\\{:02X}", byte)),
            }
        }

        self.emit_global(format!(
            "{} = private constant [{} x i8] c\"{}\\00\"",
            global, length, escaped
        ));

        Value::Text { global, length }
    }

    /// Instrucción en una posición de la sección de código.
    pub fn instruction(&self, position: usize) -> Option<&Instruction> {
        self.code.get(position)
    }

    /// Texto de la línea en una posición de la sección de código.
    pub fn line(&self, position: usize) -> Option<String> {
        self.instruction(position).map(ToString::to_string)
    }

    /// Tamaño actual de la sección de código.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Cantidad de destinos de salto que siguen sin resolver.
    pub fn pending(&self) -> usize {
        self.code
            .iter()
            .map(|instruction| instruction.unresolved().count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Escribe la sección de datos y luego la sección de código.
    pub fn write<W: Write>(&self, output: &mut W) -> io::Result<()> {
        for line in &self.data {
            writeln!(output, "{}", line)?;
        }

        for instruction in &self.code {
            writeln!(output, "{}", instruction)?;
        }

        Ok(())
    }

    fn address(&mut self, Frame(base): Frame, offset: i32) -> Local {
        let output = self.gen_local();
        self.emit(Instruction::ElementPtr {
            output,
            base,
            offset,
        });

        output
    }

    fn fresh(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;

        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpatching_resolves_the_placeholder() {
        let mut buffer = CodeBuffer::new();

        let patch = buffer.jump();
        assert_eq!(buffer.line(patch.position).unwrap(), "    br label @");
        assert_eq!(buffer.pending(), 1);

        let label = buffer.gen_label();
        buffer.backpatch(patch.into(), label);
        assert_eq!(buffer.pending(), 0);

        let line = buffer.line(patch.position).unwrap();
        assert_eq!(line, format!("    br label %{}", label));
        assert!(!line.contains('@'));
    }

    #[test]
    fn branch_slots_are_patched_independently() {
        let mut buffer = CodeBuffer::new();
        let condition = buffer.gen_local();

        let (on_true, on_false) = buffer.branch(condition);
        let first = buffer.gen_label();
        buffer.backpatch(on_false.into(), first);

        assert_eq!(
            buffer.line(on_true.position).unwrap(),
            "    br i1 %var_0, label @, label %label_1"
        );

        let second = buffer.gen_label();
        buffer.backpatch(on_true.into(), second);

        assert_eq!(
            buffer.line(on_true.position).unwrap(),
            "    br i1 %var_0, label %label_3, label %label_1"
        );
    }

    #[test]
    #[should_panic(expected = "No unresolved")]
    fn double_backpatch_is_a_defect() {
        let mut buffer = CodeBuffer::new();

        let patch = buffer.jump();
        let label = buffer.gen_label();

        buffer.backpatch(patch.into(), label);
        buffer.backpatch(patch.into(), label);
    }

    #[test]
    fn labels_close_open_blocks() {
        let mut buffer = CodeBuffer::new();
        let frame = buffer.alloc_frame(0);
        buffer.store(frame, 0, Value::Immediate(7));

        let label = buffer.gen_label();
        assert_eq!(label, Label(4));
        assert_eq!(buffer.line(3).unwrap(), "    br label %label_4");
        assert_eq!(buffer.line(4).unwrap(), "label_4:");

        // Un bloque ya terminado no recibe un segundo salto
        let before = buffer.len();
        buffer.gen_label();
        assert_eq!(buffer.len(), before + 2);

        buffer.jump();
        let before = buffer.len();
        buffer.gen_label();
        assert_eq!(buffer.len(), before + 1);
    }

    #[test]
    fn parameters_sit_below_the_frame_base() {
        let mut buffer = CodeBuffer::new();
        let frame = buffer.alloc_frame(2);
        buffer.load(frame, -2);

        let mut output = Vec::new();
        buffer.write(&mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "    %var_0 = alloca i32, i32 52\n\
             \x20   %var_1 = getelementptr i32, i32* %var_0, i32 1\n\
             \x20   store i32 %0, i32* %var_1\n\
             \x20   %var_2 = getelementptr i32, i32* %var_0, i32 0\n\
             \x20   store i32 %1, i32* %var_2\n\
             \x20   %var_3 = getelementptr i32, i32* %var_0, i32 2\n\
             \x20   %var_4 = getelementptr i32, i32* %var_3, i32 -2\n\
             \x20   %var_5 = load i32, i32* %var_4\n"
        );
    }

    #[test]
    fn strings_live_in_the_data_section() {
        let mut buffer = CodeBuffer::new();
        let value = buffer.string("a \"b\"\n");

        assert!(buffer.is_empty());
        assert_eq!(
            value.to_string(),
            "getelementptr ([7 x i8], [7 x i8]* @.str_0, i32 0, i32 0)"
        );

        let mut output = Vec::new();
        buffer.write(&mut output).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "@.str_0 = private constant [7 x i8] c\"a \\22b\\22\\0A\\00\"\n"
        );
    }
}
