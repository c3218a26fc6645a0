//! EAN-8 bar pattern
//!
//! 67 modules: start guard, four left-hand digits (set A), centre guard,
//! four right-hand digits (set C), end guard.

use stockroom_common::ean::is_valid_ean8;
use stockroom_common::{Error, Result};

/// Width of an EAN-8 symbol in modules, quiet zones excluded
pub const EAN8_MODULES: usize = 67;

/// Set A patterns, one per digit; set C is the bitwise complement
const SET_A: [&str; 10] = [
    "0001101", "0011001", "0010011", "0111101", "0100011",
    "0110001", "0101111", "0111011", "0110111", "0001011",
];

const EDGE_GUARD: &str = "101";
const CENTRE_GUARD: &str = "01010";

/// Dark/light modules of one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ean8Pattern {
    modules: Vec<bool>,
}

impl Ean8Pattern {
    /// Encode a valid 8-digit code
    pub fn encode(code: &str) -> Result<Self> {
        if !is_valid_ean8(code) {
            return Err(Error::UnprocessableEntity(format!("not a valid EAN-8: {:?}", code)));
        }

        let digits: Vec<usize> = code.bytes().map(|b| usize::from(b - b'0')).collect();
        let mut bits = String::with_capacity(EAN8_MODULES);
        bits.push_str(EDGE_GUARD);
        for &d in &digits[..4] {
            bits.push_str(SET_A[d]);
        }
        bits.push_str(CENTRE_GUARD);
        for &d in &digits[4..] {
            bits.extend(SET_A[d].chars().map(|c| if c == '1' { '0' } else { '1' }));
        }
        bits.push_str(EDGE_GUARD);

        Ok(Self {
            modules: bits.chars().map(|c| c == '1').collect(),
        })
    }

    pub fn modules(&self) -> &[bool] {
        &self.modules
    }

    /// Guard modules are drawn taller than digit modules
    pub fn is_guard(index: usize) -> bool {
        index < 3 || (31..36).contains(&index) || index >= 64
    }

    /// Runs of dark modules as `(first module, width, is_guard)`
    pub fn bars(&self) -> Vec<(usize, usize, bool)> {
        let mut bars = Vec::new();
        let mut i = 0;
        while i < self.modules.len() {
            if self.modules[i] {
                let start = i;
                while i < self.modules.len() && self.modules[i] && Self::is_guard(i) == Self::is_guard(start) {
                    i += 1;
                }
                bars.push((start, i - start, Self::is_guard(start)));
            } else {
                i += 1;
            }
        }
        bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit_string(pattern: &Ean8Pattern) -> String {
        pattern.modules().iter().map(|&b| if b { '1' } else { '0' }).collect()
    }

    #[test]
    fn test_symbol_width() {
        let pattern = Ean8Pattern::encode("96385074").unwrap();
        assert_eq!(pattern.modules().len(), EAN8_MODULES);
    }

    #[test]
    fn test_known_encoding() {
        let bits = bit_string(&Ean8Pattern::encode("96385074").unwrap());
        assert!(bits.starts_with("101"));
        assert!(bits.ends_with("101"));
        // left digit 9 in set A
        assert_eq!(&bits[3..10], "0001011");
        // centre guard
        assert_eq!(&bits[31..36], "01010");
        // right digit 5 in set C
        assert_eq!(&bits[36..43], "1001110");
    }

    #[test]
    fn test_guards_flagged() {
        assert!(Ean8Pattern::is_guard(0));
        assert!(Ean8Pattern::is_guard(33));
        assert!(Ean8Pattern::is_guard(66));
        assert!(!Ean8Pattern::is_guard(3));
        assert!(!Ean8Pattern::is_guard(40));
    }

    #[test]
    fn test_bars_cover_dark_modules() {
        let pattern = Ean8Pattern::encode("96385074").unwrap();
        let dark: usize = pattern.modules().iter().filter(|&&b| b).count();
        let covered: usize = pattern.bars().iter().map(|(_, w, _)| w).sum();
        assert_eq!(dark, covered);
        assert_eq!(pattern.bars()[0], (0, 1, true));
    }

    #[test]
    fn test_invalid_code_rejected() {
        assert!(Ean8Pattern::encode("96385075").is_err());
        assert!(Ean8Pattern::encode("1234").is_err());
    }
}
