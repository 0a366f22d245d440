use chrono::{Datelike, NaiveDate};

use crate::error::{Field, FieldErrors};
use crate::identity;
use crate::model::Passenger;

pub const MIN_NAME_LEN: usize = 3;
pub const MIN_AGE: i32 = 16;
pub const MAX_AGE: i32 = 120;

/// Completed years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// Profile checks shared by the manual form and saved passengers.
pub fn validate_profile(
    full_name: &str,
    tax_id: &str,
    birth_date: Option<NaiveDate>,
    today: NaiveDate,
) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if full_name.trim().chars().count() < MIN_NAME_LEN {
        errors.add(Field::FullName, format!("name must have at least {} characters", MIN_NAME_LEN));
    }

    if identity::normalize(tax_id).is_empty() {
        errors.add(Field::TaxId, "CPF is required");
    } else if !identity::validate(tax_id) {
        errors.add(Field::TaxId, "CPF is invalid");
    }

    match birth_date {
        None => errors.add(Field::BirthDate, "birth date is required"),
        Some(birth) if birth > today => errors.add(Field::BirthDate, "birth date is in the future"),
        Some(birth) => {
            let age = age_on(birth, today);
            if !(MIN_AGE..=MAX_AGE).contains(&age) {
                errors.add(
                    Field::BirthDate,
                    format!("age must be between {} and {} years (got {})", MIN_AGE, MAX_AGE, age),
                );
            }
        }
    }

    errors
}

pub fn validate_passenger(passenger: &Passenger, today: NaiveDate) -> FieldErrors {
    let mut errors = validate_profile(&passenger.full_name, &passenger.tax_id, passenger.birth_date, today);
    if passenger.itineraries.is_empty() {
        errors.add(Field::Itineraries, "at least one itinerary is required");
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_age_on_counts_completed_years() {
        assert_eq!(age_on(d(2000, 10, 20), d(2026, 10, 19)), 25);
        assert_eq!(age_on(d(2000, 10, 19), d(2026, 10, 19)), 26);
    }

    #[test]
    fn test_valid_profile() {
        let errors = validate_profile("Ana Souza", "111.444.777-35", Some(d(1990, 5, 1)), d(2026, 10, 19));
        assert!(errors.is_empty(), "{}", errors);
    }

    #[test]
    fn test_collects_every_problem() {
        let errors = validate_profile(" Al ", "111.444.777-36", None, d(2026, 10, 19));
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.get(Field::TaxId), Some("CPF is invalid"));
        assert!(errors.contains(Field::FullName));
        assert!(errors.contains(Field::BirthDate));

        let errors = validate_profile("Ana", "", Some(d(2027, 1, 1)), d(2026, 10, 19));
        assert_eq!(errors.get(Field::TaxId), Some("CPF is required"));
        assert_eq!(errors.get(Field::BirthDate), Some("birth date is in the future"));
    }

    #[test]
    fn test_age_bounds_are_inclusive() {
        let today = d(2026, 10, 19);
        let ok = |birth| validate_profile("Ana Souza", "11144477735", Some(birth), today).is_empty();
        assert!(ok(d(2010, 10, 19)));
        assert!(!ok(d(2010, 10, 20)));
        assert!(ok(d(1906, 10, 20)));
        assert!(ok(d(1906, 10, 19)));
        assert!(!ok(d(1905, 10, 19)));
    }

    #[test]
    fn test_passenger_needs_an_itinerary() {
        let mut p = Passenger::new("Ana Souza", "11144477735");
        p.birth_date = Some(d(1990, 5, 1));
        let errors = validate_passenger(&p, d(2026, 10, 19));
        assert_eq!(errors.len(), 1);
        assert!(errors.contains(Field::Itineraries));
    }
}
