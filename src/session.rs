use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::assembler::{self, Merge, SaveOutcome};
use crate::error::{AssemblyError, FieldErrors, StoreError};
use crate::extract::{self, RawExtraction, Rejection};
use crate::identity;
use crate::itinerary::{DateCheck, SegmentDraft, expand};
use crate::model::{Attachment, Billing, EditTarget, Passenger, PassengerProfile, Request, RequestDraft};
use crate::store::Store;
use crate::validation;

/// One passenger as typed into the form, with a single (optionally round-trip) leg.
#[derive(Debug, Clone, Default)]
pub struct PassengerForm {
    pub full_name: String,
    pub tax_id: String,
    pub birth_date: Option<NaiveDate>,
    pub email: String,
    pub phone: String,
    pub segment: SegmentDraft,
    pub include_return: bool,
    pub return_date: Option<NaiveDate>,
}

impl PassengerForm {
    /// Starts a form from a catalog profile.
    pub fn from_profile(profile: &PassengerProfile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            tax_id: identity::format(&profile.tax_id),
            birth_date: profile.birth_date,
            email: profile.email.clone().unwrap_or_default(),
            phone: profile.phone.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Outcome of merging an extracted document into the draft.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub added: usize,
    pub merged: usize,
    pub rejected: Vec<Rejection>,
    pub notes: Vec<String>,
}

/// The working request of one editor, persisted between CLI invocations.
#[derive(Debug, Clone)]
pub struct Session {
    path: PathBuf,
    pub draft: RequestDraft,
}

impl Session {
    /// Loads the draft stored at `path`, or starts an empty one.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let draft = if path.exists() {
            let content =
                fs::read_to_string(&path).map_err(|source| StoreError::Io { path: path.clone(), source })?;
            toml::from_str(&content).map_err(|source| StoreError::Decode { path: path.clone(), source })?
        } else {
            RequestDraft::default()
        };
        debug!("session loaded from {} ({} passengers)", path.display(), draft.passengers.len());
        Ok(Self { path, draft })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        let toml_str = toml::to_string_pretty(&self.draft)?;
        fs::write(&self.path, toml_str).map_err(|source| StoreError::Io { path: self.path.clone(), source })?;
        Ok(())
    }

    pub fn set_billing(&mut self, billing: Billing) {
        self.draft.billing = billing;
    }

    /// Validates the form, expands its leg and merges the passenger into the draft.
    /// On any error the draft is left as it was.
    pub fn add_passenger(&mut self, form: &PassengerForm, today: NaiveDate) -> Result<Merge, FieldErrors> {
        let mut errors = validation::validate_profile(&form.full_name, &form.tax_id, form.birth_date, today);
        let legs = expand(&form.segment, form.include_return, form.return_date, DateCheck::NotBefore(today));
        let legs = match legs {
            Ok(legs) => legs,
            Err(e) => {
                errors.extend(e);
                Vec::new()
            }
        };
        errors.into_result(())?;

        let mut passenger = Passenger::new(form.full_name.as_str(), &form.tax_id);
        passenger.birth_date = form.birth_date;
        passenger.email = Some(form.email.trim().to_string()).filter(|s| !s.is_empty());
        passenger.phone = Some(form.phone.trim().to_string()).filter(|s| !s.is_empty());
        passenger.itineraries = legs;
        Ok(assembler::merge_passenger(&mut self.draft.passengers, passenger))
    }

    /// Coerces an extraction and merges its passengers in order.
    /// Billing fields already filled in are kept. `source` is attached to every
    /// accepted passenger; merging keeps a single copy per passenger.
    pub fn import(&mut self, raw: RawExtraction, source: Option<Attachment>, today: NaiveDate) -> ImportReport {
        let mut coerced = extract::coerce(raw, today);
        if let Some(doc) = source {
            for p in coerced.passengers.iter_mut() {
                p.attach(doc.clone());
            }
        }
        let b = &mut self.draft.billing;
        for (slot, value) in [
            (&mut b.web_id, coerced.billing.web_id),
            (&mut b.project_account, coerced.billing.project_account),
            (&mut b.description, coerced.billing.description),
            (&mut b.cost_center, coerced.billing.cost_center),
        ] {
            if slot.trim().is_empty() {
                *slot = value;
            }
        }

        let mut report = ImportReport { rejected: coerced.rejected, notes: coerced.notes, ..Default::default() };
        for merge in assembler::merge_batch(&mut self.draft.passengers, coerced.passengers) {
            match merge {
                Merge::Added(_) => report.added += 1,
                Merge::Merged(_) => report.merged += 1,
            }
        }
        info!(
            "import: {} added, {} merged, {} rejected",
            report.added,
            report.merged,
            report.rejected.len()
        );
        report
    }

    /// Attaches a document to the passenger with this CPF. `false` when the
    /// passenger is unknown or the document is already attached.
    pub fn attach(&mut self, tax_id: &str, attachment: Attachment) -> bool {
        match identity::position(&self.draft.passengers, tax_id) {
            Some(i) => self.draft.passengers[i].attach(attachment),
            None => false,
        }
    }

    pub fn remove_passenger(&mut self, tax_id: &str) -> Option<Passenger> {
        identity::position(&self.draft.passengers, tax_id).map(|i| self.draft.passengers.remove(i))
    }

    /// Saves the draft and clears it. On failure the draft is untouched.
    pub fn save(
        &mut self,
        requests: &dyn Store<Request>,
        catalog: &dyn Store<PassengerProfile>,
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome, AssemblyError> {
        let outcome = assembler::save_request(&self.draft, requests, catalog, now)?;
        self.draft = RequestDraft::default();
        Ok(outcome)
    }

    /// Loads a saved request for edit-then-resave.
    pub fn edit(&mut self, request: &Request) {
        self.draft = RequestDraft {
            editing: Some(EditTarget {
                id: request.id.clone(),
                created_at: request.created_at,
                status: request.status,
                title: request.title.clone(),
            }),
            billing: request.billing.clone(),
            passengers: request.passengers.clone(),
        };
    }

    pub fn clear(&mut self) {
        self.draft = RequestDraft::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Field;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn form(cpf: &str) -> PassengerForm {
        PassengerForm {
            full_name: "Ana Souza".into(),
            tax_id: cpf.into(),
            birth_date: Some(d(1990, 5, 1)),
            email: "ana@work.com".into(),
            phone: String::new(),
            segment: SegmentDraft {
                origin: "GRU".into(),
                destination: "JFK".into(),
                departure_date: Some(d(2026, 11, 1)),
                ..Default::default()
            },
            include_return: true,
            return_date: Some(d(2026, 11, 8)),
        }
    }

    #[test]
    fn test_add_passenger_expands_and_merges() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::load(dir.path().join("session.toml")).unwrap();
        let today = d(2026, 10, 19);

        assert_eq!(session.add_passenger(&form("111.444.777-35"), today).unwrap(), Merge::Added(0));
        assert_eq!(session.add_passenger(&form("11144477735"), today).unwrap(), Merge::Merged(0));

        let ana = &session.draft.passengers[0];
        assert_eq!(ana.itineraries.len(), 4);
        assert_eq!(ana.phone, None);
        assert_eq!(ana.email.as_deref(), Some("ana@work.com"));
    }

    #[test]
    fn test_invalid_form_reports_everything_and_changes_nothing() {
        let mut session = Session { path: PathBuf::from("unused.toml"), draft: RequestDraft::default() };
        let mut bad = form("111.444.777-36");
        bad.segment.origin.clear();
        bad.return_date = Some(d(2026, 10, 1));

        let errors = session.add_passenger(&bad, d(2026, 10, 19)).unwrap_err();
        assert!(errors.contains(Field::TaxId));
        assert!(errors.contains(Field::Origin));
        assert!(errors.contains(Field::ReturnDate));
        assert!(session.draft.passengers.is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.toml");
        let mut session = Session::load(&path).unwrap();
        session.set_billing(Billing { web_id: "W-9".into(), ..Default::default() });
        session.add_passenger(&form("11144477735"), d(2026, 10, 19)).unwrap();
        session.persist().unwrap();

        let reloaded = Session::load(&path).unwrap();
        assert_eq!(reloaded.draft, session.draft);
    }

    #[test]
    fn test_import_keeps_existing_billing() {
        let mut session = Session { path: PathBuf::from("unused.toml"), draft: RequestDraft::default() };
        session.draft.billing.web_id = "W-1".into();
        let raw = extract::parse_answer(
            r#"{"billing": {"web_id": "W-2", "cost_center": "CC-9"},
                "passengers": [
                  {"name": "Ana Souza", "cpf": "11144477735",
                   "itineraries": [{"origin": "GRU", "destination": "JFK", "departure_date": "01/11/2026"}]},
                  {"name": "Ana Souza", "cpf": "111.444.777-35",
                   "itineraries": [{"origin": "JFK", "destination": "MIA", "departure_date": "03/11/2026"}]}
                ]}"#,
        )
        .unwrap();

        let doc = Attachment { name: "request.pdf".into(), size: 512, media_type: "application/pdf".into() };
        let report = session.import(raw, Some(doc), d(2026, 10, 19));
        assert_eq!((report.added, report.merged), (1, 1));
        assert_eq!(session.draft.passengers[0].attachments.len(), 1);
        assert_eq!(session.draft.billing.web_id, "W-1");
        assert_eq!(session.draft.billing.cost_center, "CC-9");
        assert_eq!(session.draft.passengers[0].itineraries.len(), 2);
    }

    #[test]
    fn test_attach_and_remove() {
        let mut session = Session { path: PathBuf::from("unused.toml"), draft: RequestDraft::default() };
        session.add_passenger(&form("11144477735"), d(2026, 10, 19)).unwrap();
        let doc = Attachment { name: "ticket.pdf".into(), size: 99, media_type: "application/pdf".into() };
        assert!(session.attach("111.444.777-35", doc.clone()));
        assert!(!session.attach("111.444.777-35", doc.clone()));
        assert!(!session.attach("52998224725", doc));
        assert!(session.remove_passenger("11144477735").is_some());
        assert!(session.draft.passengers.is_empty());
    }
}
