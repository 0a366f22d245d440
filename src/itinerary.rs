use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{Field, FieldErrors};
use crate::model::{Passenger, Segment};

/// A leg as entered in the form or pulled from an extracted document,
/// before it gets ids and validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentDraft {
    pub origin: String,
    pub destination: String,
    pub departure_date: Option<NaiveDate>,
    pub carrier: String,
    pub flight_number: String,
    pub schedule: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
}

/// Whether departure dates are held against the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCheck {
    /// Manual entry: departures before `today` are refused.
    NotBefore(NaiveDate),
    /// Imported segments are taken as the extractor returned them.
    Unchecked,
}

/// Turns one entry into the stored form: the outbound leg and, when
/// `include_return` is set, a return leg with origin and destination swapped.
///
/// All problems are reported together.
pub fn expand(
    draft: &SegmentDraft,
    include_return: bool,
    return_date: Option<NaiveDate>,
    check: DateCheck,
) -> Result<Vec<Segment>, FieldErrors> {
    let mut errors = FieldErrors::new();
    let origin = draft.origin.trim();
    let destination = draft.destination.trim();

    if origin.is_empty() {
        errors.add(Field::Origin, "origin is required");
    }
    if destination.is_empty() {
        errors.add(Field::Destination, "destination is required");
    }
    match (draft.departure_date, check) {
        (None, _) => errors.add(Field::DepartureDate, "departure date is required"),
        (Some(date), DateCheck::NotBefore(today)) if date < today => {
            errors.add(Field::DepartureDate, "departure date is in the past")
        }
        _ => {}
    }
    if include_return {
        match (return_date, draft.departure_date) {
            (None, _) => errors.add(Field::ReturnDate, "return date is required for a round trip"),
            (Some(back), Some(out)) if back < out => {
                errors.add(Field::ReturnDate, "return date is before the departure date")
            }
            _ => {}
        }
    }

    let Some(departure_date) = draft.departure_date.filter(|_| errors.is_empty()) else {
        return Err(errors);
    };

    let outbound = Segment {
        id: Uuid::new_v4().to_string(),
        origin: origin.to_string(),
        destination: destination.to_string(),
        departure_date,
        carrier: draft.carrier.trim().to_string(),
        flight_number: draft.flight_number.trim().to_string(),
        schedule: draft.schedule.trim().to_string(),
        quantity: draft.quantity,
        unit_price: draft.unit_price,
    };

    match return_date.filter(|_| include_return) {
        Some(back) => {
            let inbound = return_leg(&outbound, back);
            Ok(vec![outbound, inbound])
        }
        None => Ok(vec![outbound]),
    }
}

/// Carrier, flight and schedule belong to the outbound leg and are not carried over.
fn return_leg(outbound: &Segment, date: NaiveDate) -> Segment {
    Segment {
        id: Uuid::new_v4().to_string(),
        origin: outbound.destination.clone(),
        destination: outbound.origin.clone(),
        departure_date: date,
        carrier: String::new(),
        flight_number: String::new(),
        schedule: String::new(),
        quantity: outbound.quantity,
        unit_price: outbound.unit_price,
    }
}

// ==========================================
// Totals
// ==========================================

/// `quantity * unit_price`, with quantity 1 and price 0 when missing or not a number.
pub fn segment_cost(segment: &Segment) -> f64 {
    let quantity = segment.quantity.filter(|q| q.is_finite()).unwrap_or(1.0);
    let price = segment.unit_price.filter(|p| p.is_finite()).unwrap_or(0.0);
    quantity * price
}

pub fn passenger_cost(passenger: &Passenger) -> f64 {
    passenger.itineraries.iter().map(segment_cost).sum()
}

pub fn total_cost(passengers: &[Passenger]) -> f64 {
    passengers.iter().map(passenger_cost).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn gru_jfk(date: NaiveDate) -> SegmentDraft {
        SegmentDraft {
            origin: "GRU".into(),
            destination: "JFK".into(),
            departure_date: Some(date),
            carrier: "LATAM".into(),
            flight_number: "LA8180".into(),
            schedule: "23:55".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip_expansion() {
        let today = d(2026, 10, 19);
        let legs = expand(&gru_jfk(d(2026, 11, 1)), true, Some(d(2026, 11, 10)), DateCheck::NotBefore(today)).unwrap();

        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].origin, "GRU");
        assert_eq!(legs[0].carrier, "LATAM");
        assert_eq!(legs[1].origin, "JFK");
        assert_eq!(legs[1].destination, "GRU");
        assert_eq!(legs[1].departure_date, d(2026, 11, 10));
        assert_eq!(legs[1].carrier, "");
        assert_eq!(legs[1].flight_number, "");
        assert_eq!(legs[1].schedule, "");
        assert_ne!(legs[0].id, legs[1].id);
    }

    #[test]
    fn test_one_way_ignores_return_date() {
        let legs = expand(&gru_jfk(d(2026, 11, 1)), false, Some(d(2020, 1, 1)), DateCheck::Unchecked).unwrap();
        assert_eq!(legs.len(), 1);
    }

    #[test]
    fn test_return_on_same_day_is_allowed() {
        let legs = expand(&gru_jfk(d(2026, 11, 1)), true, Some(d(2026, 11, 1)), DateCheck::Unchecked).unwrap();
        assert_eq!(legs.len(), 2);
    }

    #[test]
    fn test_return_before_departure_is_rejected() {
        let err = expand(&gru_jfk(d(2026, 11, 10)), true, Some(d(2026, 11, 1)), DateCheck::Unchecked).unwrap_err();
        assert!(err.contains(Field::ReturnDate));
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn test_missing_return_date_is_rejected() {
        let err = expand(&gru_jfk(d(2026, 11, 10)), true, None, DateCheck::Unchecked).unwrap_err();
        assert!(err.contains(Field::ReturnDate));
    }

    #[test]
    fn test_blank_origin_and_destination_reported_together() {
        let draft = SegmentDraft {
            origin: "  ".into(),
            destination: String::new(),
            departure_date: None,
            ..Default::default()
        };
        let err = expand(&draft, true, None, DateCheck::Unchecked).unwrap_err();
        assert!(err.contains(Field::Origin));
        assert!(err.contains(Field::Destination));
        assert!(err.contains(Field::DepartureDate));
        assert!(err.contains(Field::ReturnDate));
    }

    #[test]
    fn test_past_departure_only_refused_for_manual_entry() {
        let today = d(2026, 10, 19);
        let draft = gru_jfk(d(2026, 10, 18));
        let err = expand(&draft, false, None, DateCheck::NotBefore(today)).unwrap_err();
        assert_eq!(err.get(Field::DepartureDate), Some("departure date is in the past"));

        assert!(expand(&gru_jfk(today), false, None, DateCheck::NotBefore(today)).is_ok());
        assert!(expand(&draft, false, None, DateCheck::Unchecked).is_ok());
    }

    #[test]
    fn test_costs() {
        let mut p = Passenger::new("Ana Souza", "11144477735");
        let mut a = expand(&gru_jfk(d(2026, 11, 1)), false, None, DateCheck::Unchecked).unwrap().remove(0);
        a.quantity = Some(1.0);
        a.unit_price = Some(1000.0);
        let mut b = a.clone();
        b.quantity = Some(2.0);
        b.unit_price = Some(500.0);
        p.itineraries = vec![a.clone(), b];
        assert_eq!(passenger_cost(&p), 2000.0);

        let mut defaults = a;
        defaults.quantity = None;
        defaults.unit_price = Some(300.0);
        assert_eq!(segment_cost(&defaults), 300.0);
        defaults.quantity = Some(f64::NAN);
        assert_eq!(segment_cost(&defaults), 300.0);
        defaults.unit_price = None;
        assert_eq!(segment_cost(&defaults), 0.0);

        let q = p.clone();
        assert_eq!(total_cost(&[p, q]), 4000.0);
    }
}
