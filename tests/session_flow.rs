use chrono::{NaiveDate, TimeZone, Utc};
use travel_request::itinerary::{SegmentDraft, total_cost};
use travel_request::store::{catalog_store, filter_requests, request_store};
use travel_request::{
    AssemblyError, Billing, Field, PassengerForm, RequestFilter, RequestStatus, Session, StatusAction, Store,
    duplicate_request,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn form(name: &str, cpf: &str, price: f64) -> PassengerForm {
    PassengerForm {
        full_name: name.into(),
        tax_id: cpf.into(),
        birth_date: Some(d(1985, 3, 14)),
        email: String::new(),
        phone: "+55 11 99999-0000".into(),
        segment: SegmentDraft {
            origin: "CNF".into(),
            destination: "BSB".into(),
            departure_date: Some(d(2026, 12, 1)),
            quantity: Some(1.0),
            unit_price: Some(price),
            ..Default::default()
        },
        include_return: true,
        return_date: Some(d(2026, 12, 5)),
    }
}

#[test]
fn save_without_web_id_keeps_the_draft() {
    let dir = tempfile::tempdir().unwrap();
    let requests = request_store(dir.path().join("requests.toml"));
    let catalog = catalog_store(dir.path().join("passengers.toml"));
    let mut session = Session::load(dir.path().join("session.toml")).unwrap();
    session.add_passenger(&form("Carla Dias", "529.982.247-25", 300.0), d(2026, 10, 19)).unwrap();
    let before = session.draft.clone();

    let err = session.save(&requests, &catalog, Utc::now()).unwrap_err();
    match err {
        AssemblyError::Incomplete(fields) => assert!(fields.contains(Field::WebId)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.draft, before);
    assert!(requests.load().unwrap().is_empty());
    assert!(catalog.load().unwrap().is_empty());
}

#[test]
fn save_duplicate_and_browse() {
    let dir = tempfile::tempdir().unwrap();
    let requests = request_store(dir.path().join("requests.toml"));
    let catalog = catalog_store(dir.path().join("passengers.toml"));
    let today = d(2026, 10, 19);
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();

    let mut session = Session::load(dir.path().join("session.toml")).unwrap();
    session.set_billing(Billing {
        web_id: "WEB-2026-77".into(),
        description: "Board meeting".into(),
        cost_center: "CC-12".into(),
        ..Default::default()
    });
    session.add_passenger(&form("Carla Dias", "52998224725", 300.0), today).unwrap();
    session.add_passenger(&form("Davi Lima", "111.444.777-35", 450.0), today).unwrap();

    let outcome = session.save(&requests, &catalog, now).unwrap();
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.request.id, "WEB-2026-77");
    assert_eq!(outcome.request.title, "Board meeting");
    assert_eq!(outcome.request.segment_count(), 4);
    assert_eq!(total_cost(&outcome.request.passengers), 1500.0);
    assert!(session.draft.is_empty());
    assert_eq!(catalog.load().unwrap().len(), 2);

    let mut stored = requests.load().unwrap();
    let copy = duplicate_request(&stored[0], now + chrono::Duration::hours(1));
    assert_ne!(copy.id, stored[0].id);
    assert_eq!(copy.passengers, stored[0].passengers);
    stored.push(copy);
    stored[0].apply(StatusAction::Submit).unwrap();
    requests.save_all(&stored).unwrap();

    let all = requests.load().unwrap();
    let by_cpf = filter_requests(&all, &RequestFilter { status: None, text: Some("111.444".into()) });
    assert_eq!(by_cpf.len(), 2);
    assert!(by_cpf[0].title.ends_with("(copy)"));

    let submitted = filter_requests(
        &all,
        &RequestFilter { status: Some(RequestStatus::Submitted), text: None },
    );
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].id, "WEB-2026-77");
}
