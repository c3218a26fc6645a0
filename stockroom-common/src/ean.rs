//! EAN-8 / EAN-13 helpers
//!
//! Packaging codes are derived deterministically from the packaging UUID and
//! its description, so regenerating a label never changes a code that was
//! already printed.

use crate::{Error, Result};
use sha1::{Digest, Sha1};
use uuid::Uuid;

/// Number of payload digits in an EAN-8 (the 8th is the check digit)
const EAN8_PAYLOAD_LEN: usize = 7;

/// EAN-8/EAN-13 check digit for the given payload digits
///
/// Weights alternate 3,1,3,... starting from the leftmost payload digit for
/// EAN-8 (odd payload length) and 1,3,1,... for EAN-13 (even payload length),
/// i.e. the digit adjacent to the check digit always weighs 3.
pub fn check_digit(payload: &[u8]) -> u8 {
    let len = payload.len();
    let sum: u32 = payload
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let weight = if (len - i) % 2 == 1 { 3 } else { 1 };
            weight * u32::from(*d)
        })
        .sum();
    ((10 - (sum % 10)) % 10) as u8
}

/// Generate the EAN-8 for a packaging
///
/// 1. `uuid + "-" + lowercase(description)`
/// 2. SHA-1, hex encoded
/// 3. first seven decimal digits found in the hex string
/// 4. append the check digit
pub fn generate_ean8(uuid: &Uuid, description: &str) -> Result<String> {
    let seed = format!("{}-{}", uuid, description.to_lowercase());
    let digest = Sha1::digest(seed.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

    let payload: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(10).map(|d| d as u8))
        .take(EAN8_PAYLOAD_LEN)
        .collect();

    if payload.len() < EAN8_PAYLOAD_LEN {
        return Err(Error::Ean8GenerationFailed(seed));
    }

    Ok(digits_with_check(&payload))
}

fn digits_with_check(payload: &[u8]) -> String {
    let mut code: String = payload.iter().map(|d| char::from(b'0' + d)).collect();
    code.push(char::from(b'0' + check_digit(payload)));
    code
}

/// True when `code` is 8 decimal digits with a valid check digit
pub fn is_valid_ean8(code: &str) -> bool {
    is_valid_with_check(code, 8)
}

/// True when `code` is exactly 13 decimal digits
///
/// Item EAN-13s come from supplier packaging and are accepted on format only.
pub fn is_valid_ean13_format(code: &str) -> bool {
    code.len() == 13 && code.bytes().all(|b| b.is_ascii_digit())
}

fn is_valid_with_check(code: &str, len: usize) -> bool {
    if code.len() != len || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u8> = code.bytes().map(|b| b - b'0').collect();
    check_digit(&digits[..len - 1]) == digits[len - 1]
}

/// Human-readable form printed under the barcode: `1234 5670`
pub fn format_ean8(code: &str) -> String {
    if code.len() == 8 && code.is_ascii() {
        format!("{} {}", &code[..4], &code[4..])
    } else {
        code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_digit_known_ean8() {
        // 9638507 -> check digit 4 (well-known sample 96385074)
        assert_eq!(check_digit(&[9, 6, 3, 8, 5, 0, 7]), 4);
        assert!(is_valid_ean8("96385074"));
    }

    #[test]
    fn test_check_digit_matches_weighted_formula() {
        // weight 3 on even positions, 1 on odd positions
        let payload = [1, 2, 3, 4, 5, 6, 7];
        let sum: u32 = payload
            .iter()
            .enumerate()
            .map(|(i, d)| if i % 2 == 0 { 3 * d } else { *d })
            .sum();
        let expected = ((10 - sum % 10) % 10) as u8;
        assert_eq!(check_digit(&payload.map(|d| d as u8)), expected);
    }

    #[test]
    fn test_check_digit_known_ean13() {
        // 400638133393 -> 1 (4006381333931)
        assert_eq!(check_digit(&[4, 0, 0, 6, 3, 8, 1, 3, 3, 3, 9, 3]), 1);
    }

    #[test]
    fn test_generate_is_deterministic() {
        let id = Uuid::parse_str("0b7c3e2a-5d1f-4b7e-9a55-3c2f1e0d9a88").unwrap();
        let a = generate_ean8(&id, "Bag").unwrap();
        let b = generate_ean8(&id, "bag").unwrap();
        assert_eq!(a, b, "description is lower-cased before hashing");
        assert_eq!(a.len(), 8);
        assert!(is_valid_ean8(&a));
    }

    #[test]
    fn test_generate_differs_by_description() {
        let id = Uuid::new_v4();
        let mut codes = std::collections::HashSet::new();
        for desc in ["Bag", "Box", "Crate", "Sack", "Pallet"] {
            codes.insert(generate_ean8(&id, desc).unwrap());
        }
        assert!(codes.len() > 1);
    }

    #[test]
    fn test_generate_always_valid() {
        for _ in 0..200 {
            let code = generate_ean8(&Uuid::new_v4(), "Pack of 6").unwrap();
            assert!(is_valid_ean8(&code), "invalid code {}", code);
        }
    }

    #[test]
    fn test_invalid_ean8_rejected() {
        assert!(!is_valid_ean8("96385075"));
        assert!(!is_valid_ean8("9638507"));
        assert!(!is_valid_ean8("9638507a"));
    }

    #[test]
    fn test_ean13_format() {
        assert!(is_valid_ean13_format("4006381333931"));
        assert!(!is_valid_ean13_format("400638133393"));
        assert!(!is_valid_ean13_format("40063813339311"));
        assert!(!is_valid_ean13_format("400638133393X"));
    }

    #[test]
    fn test_format_ean8() {
        assert_eq!(format_ean8("96385074"), "9638 5074");
        assert_eq!(format_ean8("123"), "123");
    }
}
