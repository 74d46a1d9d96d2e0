//! Listas de parches.
//!
//! Un [`Patch`] identifica una ranura de destino todavía sin resolver
//! dentro de una instrucción de salto ya emitida. Las listas de
//! parches se combinan por concatenación y nunca eliminan duplicados.

use crate::ir::Slot;

/// Ranura pendiente: posición en el buffer y ranura dentro de la instrucción.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    pub position: usize,
    pub slot: Slot,
}

/// Multiconjunto de parches pendientes.
///
/// `PatchList` no es `Clone`. Cada lista se descarga a lo sumo una
/// vez por medio de [`crate::codegen::CodeBuffer::backpatch`], que la
/// consume.
#[must_use]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PatchList(Vec<Patch>);

impl PatchList {
    /// Lista vacía.
    pub fn new() -> Self {
        PatchList(Vec::new())
    }

    /// Lista de un único elemento.
    pub fn single(position: usize, slot: Slot) -> Self {
        PatchList(vec![Patch { position, slot }])
    }

    /// Concatena dos listas.
    pub fn merge(mut self, mut other: PatchList) -> Self {
        self.0.append(&mut other.0);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patch> {
        self.0.iter()
    }
}

impl From<Patch> for PatchList {
    fn from(patch: Patch) -> Self {
        PatchList(vec![patch])
    }
}

impl IntoIterator for PatchList {
    type Item = Patch;
    type IntoIter = std::vec::IntoIter<Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_without_deduplication() {
        let a = PatchList::single(3, Slot::First);
        let b = PatchList::single(3, Slot::First).merge(PatchList::single(5, Slot::Second));

        let merged = a.merge(b);
        assert_eq!(merged.len(), 3);
        assert_eq!(
            merged.iter().map(|patch| patch.position).collect::<Vec<_>>(),
            vec![3, 3, 5]
        );
    }

    #[test]
    fn merging_with_empty_is_identity() {
        let list = PatchList::single(1, Slot::Second).merge(PatchList::new());
        assert_eq!(list, PatchList::single(1, Slot::Second));
        assert!(PatchList::new().merge(PatchList::new()).is_empty());
    }
}
