// mercado_app/src/services/secrets.rs

//! The shared secrets handed to buyers at checkout.

use rand::seq::SliceRandom;
use rand::Rng;

pub const PICKUP_CODE_LEN: usize = 8;
const PICKUP_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const KEYWORD_COUNT: usize = 3;
const WORDS: &[&str] = &[
  "ARBOL", "BARCO", "CAMPO", "DELTA", "FARO", "GATO", "HIELO", "ISLA", "JAGUAR", "LAGO", "LIMON", "LUNA", "MANGO",
  "MAR", "MESA", "MONTE", "NUBE", "OLIVO", "OSO", "PALMA", "PATO", "PERA", "PIANO", "PUENTE", "RIO", "ROBLE", "SAL",
  "SELVA", "SOL", "TIGRE", "TORRE", "TREN", "UVA", "VALLE", "VELA", "VIENTO", "YERBA", "ZORRO",
];

pub fn generate_pickup_code<R: Rng + ?Sized>(rng: &mut R) -> String {
  (0..PICKUP_CODE_LEN)
    .map(|_| PICKUP_ALPHABET[rng.gen_range(0..PICKUP_ALPHABET.len())] as char)
    .collect()
}

/// Three distinct words joined by `-`, e.g. `LUNA-TREN-PATO`.
pub fn generate_security_keywords<R: Rng + ?Sized>(rng: &mut R) -> String {
  WORDS
    .choose_multiple(rng, KEYWORD_COUNT)
    .copied()
    .collect::<Vec<_>>()
    .join("-")
}

/// Uses the thread-local RNG; the generator never outlives the call.
pub fn new_pickup_code() -> String {
  generate_pickup_code(&mut rand::thread_rng())
}

pub fn new_security_keywords() -> String {
  generate_security_keywords(&mut rand::thread_rng())
}

/// What a seller types or scans is matched case-insensitively and without
/// surrounding whitespace.
pub fn normalize_pickup_code(raw: &str) -> String {
  raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn pickup_codes_are_uppercase_alphanumeric() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
      let code = generate_pickup_code(&mut rng);
      assert_eq!(code.len(), PICKUP_CODE_LEN);
      assert!(code.bytes().all(|b| PICKUP_ALPHABET.contains(&b)));
    }
  }

  #[test]
  fn keywords_are_three_distinct_words() {
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
      let phrase = generate_security_keywords(&mut rng);
      let words: HashSet<_> = phrase.split('-').collect();
      assert_eq!(words.len(), KEYWORD_COUNT, "{phrase}");
      assert!(words.iter().all(|w| WORDS.contains(w)));
    }
  }

  #[test]
  fn normalizes_scanned_codes() {
    assert_eq!(normalize_pickup_code("  ab12cd34\n"), "AB12CD34");
  }
}
