use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AssemblyError, Field, FieldErrors};
use crate::identity;
use crate::model::{Passenger, PassengerProfile, Request, RequestDraft, RequestStatus};
use crate::store::Store;

pub const COPY_SUFFIX: &str = " (copy)";

/// What happened to one incoming passenger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Folded into the passenger at this index.
    Merged(usize),
    /// Appended as a new passenger at this index.
    Added(usize),
}

/// Folds `incoming` into the working set.
///
/// A passenger with the same non-empty canonical CPF receives the incoming
/// itineraries appended in order (repeated legs are kept) and has its empty
/// email, phone and birth date filled in. Populated fields are never replaced.
/// Otherwise `incoming` is appended with a fresh id.
pub fn merge_passenger(working: &mut Vec<Passenger>, mut incoming: Passenger) -> Merge {
    incoming.tax_id = identity::normalize(&incoming.tax_id);

    if let Some(index) = identity::position(working.as_slice(), &incoming.tax_id) {
        let existing = &mut working[index];
        existing.itineraries.append(&mut incoming.itineraries);
        fill_blank(&mut existing.email, incoming.email);
        fill_blank(&mut existing.phone, incoming.phone);
        if existing.birth_date.is_none() {
            existing.birth_date = incoming.birth_date;
        }
        for attachment in incoming.attachments {
            existing.attach(attachment);
        }
        debug!("merged passenger {} into #{}", identity::mask(&existing.tax_id), index);
        return Merge::Merged(index);
    }

    incoming.id = Uuid::new_v4().to_string();
    working.push(incoming);
    Merge::Added(working.len() - 1)
}

fn fill_blank(slot: &mut Option<String>, value: Option<String>) {
    let blank = slot.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true);
    let value = value.filter(|v| !v.trim().is_empty());
    if blank && value.is_some() {
        *slot = value;
    }
}

/// Merges a batch strictly in input order, so later entries can fold into earlier ones.
pub fn merge_batch(working: &mut Vec<Passenger>, incoming: Vec<Passenger>) -> Vec<Merge> {
    incoming.into_iter().map(|p| merge_passenger(working, p)).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCount {
    pub created: usize,
    pub updated: usize,
}

/// Creates or refreshes a catalog profile for every passenger with a CPF.
/// Blank values on the passenger do not erase what the catalog already knows.
pub fn upsert_catalog(catalog: &mut Vec<PassengerProfile>, passengers: &[Passenger]) -> UpsertCount {
    let mut count = UpsertCount::default();
    for passenger in passengers {
        let key = identity::normalize(&passenger.tax_id);
        if key.is_empty() {
            continue;
        }
        match catalog.iter_mut().find(|p| identity::normalize(&p.tax_id) == key) {
            Some(profile) => {
                if !passenger.full_name.trim().is_empty() {
                    profile.full_name = passenger.full_name.clone();
                }
                if passenger.birth_date.is_some() {
                    profile.birth_date = passenger.birth_date;
                }
                if let Some(email) = passenger.email.as_ref().filter(|e| !e.trim().is_empty()) {
                    profile.email = Some(email.clone());
                }
                if let Some(phone) = passenger.phone.as_ref().filter(|p| !p.trim().is_empty()) {
                    profile.phone = Some(phone.clone());
                }
                count.updated += 1;
            }
            None => {
                let mut profile = passenger.profile();
                profile.tax_id = key;
                catalog.push(profile);
                count.created += 1;
            }
        }
    }
    count
}

/// Builds the request a save would persist. Nothing is written here.
///
/// The id is kept when re-editing; otherwise the WEB ID is used unless another
/// saved request already has it, in which case a generated id is used.
pub fn assemble_for_save(
    draft: &RequestDraft,
    taken_ids: &[&str],
    now: DateTime<Utc>,
) -> Result<Request, AssemblyError> {
    let mut errors = FieldErrors::new();
    let web_id = draft.billing.web_id.trim();
    if web_id.is_empty() {
        errors.add(Field::WebId, "WEB ID is required");
    }
    if draft.passengers.is_empty() {
        errors.add(Field::Passengers, "at least one passenger is required");
    }
    if !errors.is_empty() {
        return Err(AssemblyError::Incomplete(errors));
    }

    let mut billing = draft.billing.clone();
    billing.web_id = web_id.to_string();

    let (id, created_at, status, title) = match &draft.editing {
        Some(target) => (target.id.clone(), target.created_at, target.status, target.title.clone()),
        None => {
            let id = if taken_ids.contains(&web_id) { Uuid::new_v4().to_string() } else { web_id.to_string() };
            (id, now, RequestStatus::Draft, String::new())
        }
    };
    let title = if !title.is_empty() {
        title
    } else if !billing.description.trim().is_empty() {
        billing.description.trim().to_string()
    } else {
        format!("Request {}", web_id)
    };

    let mut passengers = draft.passengers.clone();
    for p in passengers.iter_mut().filter(|p| p.id.is_empty()) {
        p.id = Uuid::new_v4().to_string();
    }

    Ok(Request { id, title, status, created_at, billing, passengers })
}

/// Result of a save: the stored request plus anything that went wrong on the side.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub request: Request,
    pub warnings: Vec<String>,
}

/// Upserts the catalog, then stores the request (replacing a previous version with the same id).
///
/// A catalog failure does not block the request; it comes back as a warning.
/// A request-store failure aborts with an error.
pub fn save_request(
    draft: &RequestDraft,
    requests: &dyn Store<Request>,
    catalog: &dyn Store<PassengerProfile>,
    now: DateTime<Utc>,
) -> Result<SaveOutcome, AssemblyError> {
    let mut stored = requests.load()?;
    let editing_id = draft.editing.as_ref().map(|t| t.id.as_str());
    let taken: Vec<&str> = stored
        .iter()
        .map(|r| r.id.as_str())
        .filter(|id| Some(*id) != editing_id)
        .collect();
    let request = assemble_for_save(draft, &taken, now)?;

    let mut warnings = Vec::new();
    let upsert = catalog.load().and_then(|mut profiles| {
        let count = upsert_catalog(&mut profiles, &request.passengers);
        catalog.save_all(&profiles).map(|_| count)
    });
    match upsert {
        Ok(count) => info!("catalog updated: {} created, {} updated", count.created, count.updated),
        Err(e) => {
            warn!("passenger catalog update failed, saving request anyway: {}", e);
            warnings.push(format!("passenger catalog was not updated: {}", e));
        }
    }

    match stored.iter_mut().find(|r| r.id == request.id) {
        Some(slot) => *slot = request.clone(),
        None => stored.push(request.clone()),
    }
    requests.save_all(&stored)?;
    info!("request {} saved with {} passenger(s)", request.id, request.passengers.len());

    Ok(SaveOutcome { request, warnings })
}

/// Deep copy with a new id and timestamp. Status is carried over unchanged.
pub fn duplicate_request(request: &Request, now: DateTime<Utc>) -> Request {
    let mut copy = request.clone();
    copy.id = Uuid::new_v4().to_string();
    copy.created_at = now;
    copy.title = format!("{}{}", request.title, COPY_SUFFIX);
    copy
}
