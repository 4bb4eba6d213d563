//! Máscara de cambios por campo.
//!
//! Cada palabra cubre 32 campos; el campo 32 cae en la palabra siguiente
//! (la máscara crece sola, no hay overflow observable). Los nombres de
//! campo viven en una tabla estática del tipo de estado, por lo que
//! `changed_field_names` no asigna más que el `Vec` resultado.

use serde::{Deserialize, Serialize};

const BITS_PER_WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMask {
    words: Vec<u32>,
    #[serde(skip, default = "empty_fields")]
    fields: &'static [&'static str],
}

fn empty_fields() -> &'static [&'static str] {
    &[]
}

impl ChangeMask {
    /// Crea una máscara limpia para la tabla de campos dada.
    pub fn new(fields: &'static [&'static str]) -> Self {
        let words = fields.len().div_ceil(BITS_PER_WORD).max(1);
        Self { words: vec![0; words], fields }
    }

    /// Marca el campo `bit` como modificado. Bits fuera de la tabla se
    /// ignoran.
    pub fn mark(&mut self, bit: usize) {
        if bit >= self.fields.len() {
            return;
        }
        self.words[bit / BITS_PER_WORD] |= 1 << (bit % BITS_PER_WORD);
    }

    pub fn is_marked(&self, bit: usize) -> bool {
        match self.words.get(bit / BITS_PER_WORD) {
            Some(word) => word & (1 << (bit % BITS_PER_WORD)) != 0,
            None => false,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    /// Nombres de los campos actualmente marcados, en orden de tabla.
    pub fn changed_field_names(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(i, _)| self.is_marked(*i))
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Cantidad de palabras de 32 bits en uso.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[&str] = &["a", "b", "c"];

    #[test]
    fn mark_and_read_back() {
        let mut mask = ChangeMask::new(FIELDS);
        assert!(!mask.has_changes());
        mask.mark(1);
        assert!(mask.has_changes());
        assert_eq!(mask.changed_field_names(), vec!["b"]);
        mask.clear();
        assert!(!mask.has_changes());
    }

    #[test]
    fn out_of_table_bits_are_ignored() {
        let mut mask = ChangeMask::new(FIELDS);
        mask.mark(40);
        assert!(!mask.has_changes());
    }

    #[test]
    fn thirty_two_fields_mark_independently() {
        static FULL_WORD: [&str; 32] = ["f"; 32];
        for bit in 0..32 {
            let mut mask = ChangeMask::new(&FULL_WORD);
            mask.mark(bit);
            for other in 0..32 {
                assert_eq!(mask.is_marked(other), other == bit);
            }
            assert_eq!(mask.changed_field_names().len(), 1);
        }
    }

    #[test]
    fn thirty_third_field_rolls_into_second_word() {
        static MANY: [&str; 33] = ["f"; 33];
        let mut mask = ChangeMask::new(&MANY);
        assert_eq!(mask.word_count(), 2);
        mask.mark(32);
        assert!(mask.is_marked(32));
        assert!(!mask.is_marked(31));
    }
}
