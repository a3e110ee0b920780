//! Database credential generation

use rand::seq::SliceRandom;
use rand::Rng;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
// Symbols accepted by Postgres connection strings without escaping
const SYMBOLS: &[u8] = b"!@#$%^*-_+=";

/// Generated password length
pub const DB_PASSWORD_LEN: usize = 32;

/// Generate a fresh high-entropy database password.
///
/// Always contains at least one character from each class. Generated once
/// per step attempt; never reused across resumes unless the step is skipped.
pub fn generate_db_password() -> String {
    let mut rng = rand::thread_rng();

    let mut chars: Vec<u8> = vec![
        LOWER[rng.gen_range(0..LOWER.len())],
        UPPER[rng.gen_range(0..UPPER.len())],
        DIGITS[rng.gen_range(0..DIGITS.len())],
        SYMBOLS[rng.gen_range(0..SYMBOLS.len())],
    ];

    let all: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();
    while chars.len() < DB_PASSWORD_LEN {
        chars.push(all[rng.gen_range(0..all.len())]);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_length_and_classes() {
        let password = generate_db_password();
        assert_eq!(password.len(), DB_PASSWORD_LEN);
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| !c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_passwords_are_unique_per_attempt() {
        assert_ne!(generate_db_password(), generate_db_password());
    }
}
