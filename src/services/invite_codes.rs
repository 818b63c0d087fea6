// src/services/invite_codes.rs

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

// No 0/O or 1/I, codes are read aloud and typed by hand.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

static INVITE_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ADM-[A-HJ-NP-Z2-9]{4}-[A-HJ-NP-Z2-9]{4}$").expect("invite code pattern is valid")
});

/// A fresh admin invite code, e.g. `ADM-7KQX-M3PA`.
pub fn generate_invite_code() -> String {
    format!("ADM-{}-{}", random_block(4), random_block(4))
}

/// Uppercases and trims user input so `adm-7kqx-m3pa ` still matches.
pub fn normalize_invite_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

pub fn is_well_formed(code: &str) -> bool {
    INVITE_CODE_RE.is_match(code)
}

fn random_block(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_well_formed() {
        for _ in 0..50 {
            let code = generate_invite_code();
            assert!(is_well_formed(&code), "bad code {code}");
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_invite_code(" adm-abcd-efgh "), "ADM-ABCD-EFGH");
        assert!(is_well_formed(&normalize_invite_code("adm-abcd-efgh")));
        assert!(!is_well_formed("ADM-ABCD-EFG0"));
        assert!(!is_well_formed("XYZ-ABCD-EFGH"));
    }
}
