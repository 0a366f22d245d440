use std::collections::BTreeMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::identity;
use crate::model::{PassengerProfile, Request, RequestStatus};

/// Whole-collection persistence: read everything, write everything back.
pub trait Store<T> {
    fn load(&self) -> Result<Vec<T>, StoreError>;
    fn save_all(&self, items: &[T]) -> Result<(), StoreError>;
}

/// A collection kept as one array of tables in a TOML file.
#[derive(Debug, Clone)]
pub struct TomlStore<T> {
    path: PathBuf,
    table: &'static str,
    _marker: PhantomData<T>,
}

impl<T> TomlStore<T> {
    pub fn new(path: impl Into<PathBuf>, table: &'static str) -> Self {
        Self { path: path.into(), table, _marker: PhantomData }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn request_store(path: impl Into<PathBuf>) -> TomlStore<Request> {
    TomlStore::new(path, "requests")
}

pub fn catalog_store(path: impl Into<PathBuf>) -> TomlStore<PassengerProfile> {
    TomlStore::new(path, "passengers")
}

impl<T> Store<T> for TomlStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Vec<T>, StoreError> {
        if !self.path.exists() {
            debug!("{} does not exist yet, starting empty", self.path.display());
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|source| StoreError::Io { path: self.path.clone(), source })?;
        let mut tables: BTreeMap<String, Vec<T>> = toml::from_str(&content)
            .map_err(|source| StoreError::Decode { path: self.path.clone(), source })?;
        let items = tables.remove(self.table).unwrap_or_default();
        debug!("loaded {} {} from {}", items.len(), self.table, self.path.display());
        Ok(items)
    }

    fn save_all(&self, items: &[T]) -> Result<(), StoreError> {
        let mut tables = BTreeMap::new();
        tables.insert(self.table, items);
        let toml_str = toml::to_string_pretty(&tables)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        // Write next to the target and rename, so a failed write leaves the old file intact.
        let tmp_path = self.path.with_extension("toml.tmp");
        fs::write(&tmp_path, toml_str).map_err(|source| StoreError::Io { path: tmp_path.clone(), source })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Io { path: self.path.clone(), source })?;
        info!("saved {} {} to {}", items.len(), self.table, self.path.display());
        Ok(())
    }
}

// ==========================================
// Browsing
// ==========================================

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub text: Option<String>,
}

impl RequestFilter {
    pub fn matches(&self, request: &Request) -> bool {
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        let Some(text) = self.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return true;
        };
        let needle = text.to_lowercase();
        let digits = identity::normalize(text);
        let b = &request.billing;
        let fields = [&request.id, &request.title, &b.web_id, &b.project_account, &b.description, &b.cost_center];
        if fields.iter().any(|f| f.to_lowercase().contains(&needle)) {
            return true;
        }
        request.passengers.iter().any(|p| {
            p.full_name.to_lowercase().contains(&needle)
                || (digits.len() >= 3 && p.tax_id.contains(&digits))
        })
    }
}

/// Matching requests, newest first.
pub fn filter_requests<'a>(requests: &'a [Request], filter: &RequestFilter) -> Vec<&'a Request> {
    let mut found: Vec<&Request> = requests.iter().filter(|r| filter.matches(r)).collect();
    found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    found
}

pub fn find_request<'a>(requests: &'a [Request], id: &str) -> Option<&'a Request> {
    requests.iter().find(|r| r.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Billing, Passenger, Segment};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn sample_request(id: &str, hours: i64) -> Request {
        let mut p = Passenger::new("Ana Souza", "111.444.777-35");
        p.id = "p1".into();
        p.birth_date = NaiveDate::from_ymd_opt(1990, 5, 1);
        p.email = Some("ana@example.com".into());
        p.itineraries.push(Segment {
            id: "s1".into(),
            origin: "GRU".into(),
            destination: "JFK".into(),
            departure_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
            carrier: "LATAM".into(),
            flight_number: String::new(),
            schedule: String::new(),
            quantity: Some(2.0),
            unit_price: Some(1500.5),
        });
        Request {
            id: id.into(),
            title: format!("Trip {}", id),
            status: RequestStatus::Draft,
            created_at: Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap() + Duration::hours(hours),
            billing: Billing {
                web_id: id.into(),
                project_account: "PRJ-7".into(),
                description: "Site visit".into(),
                cost_center: "CC-100".into(),
            },
            passengers: vec![p],
        }
    }

    #[test]
    fn test_round_trip_keeps_types() {
        let dir = tempfile::tempdir().unwrap();
        let store = request_store(dir.path().join("data/requests.toml"));
        assert!(store.load().unwrap().is_empty());

        let requests = vec![sample_request("W1", 0), sample_request("W2", 1)];
        store.save_all(&requests).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, requests);
        assert_eq!(
            loaded[0].passengers[0].itineraries[0].departure_date,
            NaiveDate::from_ymd_opt(2026, 11, 1).unwrap()
        );
    }

    #[test]
    fn test_reads_human_dates_from_hand_edited_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passengers.toml");
        fs::write(
            &path,
            "[[passengers]]\ntax_id = \"11144477735\"\nfull_name = \"Ana Souza\"\nbirth_date = \"01/05/1990\"\n",
        )
        .unwrap();
        let loaded = catalog_store(&path).load().unwrap();
        assert_eq!(loaded[0].birth_date, NaiveDate::from_ymd_opt(1990, 5, 1));
        assert_eq!(loaded[0].email, None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requests.toml");
        fs::write(&path, "requests = 3").unwrap();
        assert!(matches!(request_store(&path).load(), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn test_filter_by_status_and_text() {
        let mut a = sample_request("W1", 0);
        let b = sample_request("W2", 5);
        a.status = RequestStatus::Submitted;
        let requests = vec![a, b];

        let all = filter_requests(&requests, &RequestFilter::default());
        assert_eq!(all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["W2", "W1"]);

        let submitted = RequestFilter { status: Some(RequestStatus::Submitted), text: None };
        assert_eq!(filter_requests(&requests, &submitted).len(), 1);

        let by_name = RequestFilter { status: None, text: Some("ana".into()) };
        assert_eq!(filter_requests(&requests, &by_name).len(), 2);

        let by_cpf = RequestFilter { status: None, text: Some("444.777".into()) };
        assert_eq!(filter_requests(&requests, &by_cpf).len(), 2);

        let by_web_id = RequestFilter { status: None, text: Some("w2".into()) };
        assert_eq!(filter_requests(&requests, &by_web_id)[0].id, "W2");

        let none = RequestFilter { status: None, text: Some("nobody".into()) };
        assert!(filter_requests(&requests, &none).is_empty());
    }
}
