//! CPF handling: canonical keys, check digits, and passenger lookup.

use crate::model::Passenger;

/// Strips everything but ASCII digits. The result is the equality key for
/// passengers and the document key in the catalog.
pub fn normalize(tax_id: &str) -> String {
    tax_id.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Checks length and both CPF check digits. Sequences of one repeated digit
/// pass the arithmetic but are not issued, so they are rejected too.
pub fn validate(tax_id: &str) -> bool {
    let digits: Vec<u32> = normalize(tax_id).chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }
    check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
}

// Weights run from len+1 down to 2.
fn check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    let rest = (sum * 10) % 11;
    if rest == 10 { 0 } else { rest }
}

/// Display form `000.000.000-00`. Anything that is not 11 digits comes back as given.
pub fn format(tax_id: &str) -> String {
    let key = normalize(tax_id);
    if key.len() != 11 {
        return tax_id.to_string();
    }
    format!("{}.{}.{}-{}", &key[0..3], &key[3..6], &key[6..9], &key[9..11])
}

/// Log-safe form: only the last four digits survive.
pub fn mask(tax_id: &str) -> String {
    let key = normalize(tax_id);
    if key.len() != 11 {
        return "***".to_string();
    }
    format!("***.***.*{}-{}", &key[7..9], &key[9..11])
}

/// Position of the first passenger sharing the canonical key. Empty keys never match.
pub fn position(passengers: &[Passenger], tax_id: &str) -> Option<usize> {
    let key = normalize(tax_id);
    if key.is_empty() {
        return None;
    }
    passengers.iter().position(|p| normalize(&p.tax_id) == key)
}

pub fn find_existing<'a>(passengers: &'a [Passenger], tax_id: &str) -> Option<&'a Passenger> {
    position(passengers, tax_id).map(|i| &passengers[i])
}
