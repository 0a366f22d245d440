use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;
use crate::identity;

/// A document reference attached to a passenger (ticket, ID scan, ...).
/// Two attachments are the same document when name and size match.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub media_type: String,
}

/// One directed leg of travel.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Segment {
    pub id: String,
    pub origin: String,
    pub destination: String,
    #[serde(with = "lenient_date")]
    pub departure_date: NaiveDate,
    #[serde(default)]
    pub carrier: String,
    #[serde(default)]
    pub flight_number: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Passenger {
    #[serde(default)]
    pub id: String,
    pub full_name: String,
    /// Canonical digits-only CPF.
    pub tax_id: String,
    #[serde(default, with = "lenient_date_opt", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub itineraries: Vec<Segment>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Passenger {
    /// A passenger with no id yet; the tax id is stored canonically.
    pub fn new(full_name: impl Into<String>, tax_id: &str) -> Self {
        Self {
            id: String::new(),
            full_name: full_name.into().trim().to_string(),
            tax_id: identity::normalize(tax_id),
            birth_date: None,
            email: None,
            phone: None,
            itineraries: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Adds the attachment unless a document with the same name and size is already there.
    pub fn attach(&mut self, attachment: Attachment) -> bool {
        let exists = self
            .attachments
            .iter()
            .any(|a| a.name == attachment.name && a.size == attachment.size);
        if exists {
            return false;
        }
        self.attachments.push(attachment);
        true
    }

    pub fn profile(&self) -> PassengerProfile {
        PassengerProfile {
            tax_id: self.tax_id.clone(),
            full_name: self.full_name.clone(),
            birth_date: self.birth_date,
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

/// Catalog entry used to auto-fill future forms. Keyed by canonical tax id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PassengerProfile {
    pub tax_id: String,
    pub full_name: String,
    #[serde(default, with = "lenient_date_opt", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Billing {
    /// Externally assigned request identifier, required before saving.
    #[serde(default)]
    pub web_id: String,
    #[serde(default)]
    pub project_account: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cost_center: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Draft => "draft",
            RequestStatus::Submitted => "submitted",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Submit,
    Approve,
    Reject,
}

impl StatusAction {
    fn name(&self) -> &'static str {
        match self {
            StatusAction::Submit => "submit",
            StatusAction::Approve => "approve",
            StatusAction::Reject => "reject",
        }
    }
}

/// The unit of persistence and export. Owns a snapshot of its passengers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Request {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub billing: Billing,
    #[serde(default)]
    pub passengers: Vec<Passenger>,
}

impl Request {
    /// Draft -> Submitted -> Approved | Rejected. Anything else is refused.
    pub fn apply(&mut self, action: StatusAction) -> Result<(), AssemblyError> {
        let next = match (self.status, action) {
            (RequestStatus::Draft, StatusAction::Submit) => RequestStatus::Submitted,
            (RequestStatus::Submitted, StatusAction::Approve) => RequestStatus::Approved,
            (RequestStatus::Submitted, StatusAction::Reject) => RequestStatus::Rejected,
            (from, action) => {
                return Err(AssemblyError::InvalidTransition {
                    action: action.name(),
                    from: from.to_string(),
                });
            }
        };
        self.status = next;
        Ok(())
    }

    pub fn segment_count(&self) -> usize {
        self.passengers.iter().map(|p| p.itineraries.len()).sum()
    }
}

/// Identity of a saved request being re-edited, so a resave keeps it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EditTarget {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: RequestStatus,
    #[serde(default)]
    pub title: String,
}

/// The in-progress request held by a session.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RequestDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editing: Option<EditTarget>,
    #[serde(default)]
    pub billing: Billing,
    #[serde(default)]
    pub passengers: Vec<Passenger>,
}

impl RequestDraft {
    pub fn is_empty(&self) -> bool {
        self.editing.is_none() && self.passengers.is_empty() && self.billing == Billing::default()
    }
}

// ==========================================
// Dates
// ==========================================

static DMY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4}|\d{2})$").unwrap());
static ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ].*)?$").unwrap());

/// Parses the human date formats found in forms and extracted documents:
/// `DD/MM/YYYY` (also with `-` or `.`), `DD/MM/YY` and ISO `YYYY-MM-DD`
/// (an optional time suffix is ignored).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(caps) = ISO_RE.captures(raw) {
        let y: i32 = caps[1].parse().ok()?;
        let m: u32 = caps[2].parse().ok()?;
        let d: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(y, m, d);
    }
    let caps = DMY_RE.captures(raw)?;
    let d: u32 = caps[1].parse().ok()?;
    let m: u32 = caps[2].parse().ok()?;
    let mut y: i32 = caps[3].parse().ok()?;
    if caps[3].len() == 2 {
        // Same pivot as strftime's %y.
        y += if y < 70 { 2000 } else { 1900 };
    }
    NaiveDate::from_ymd_opt(y, m, d)
}

/// Dates are written as ISO strings and read back through [`parse_date`],
/// so hand-edited files in `DD/MM/YYYY` still load.
pub(crate) mod lenient_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}")))
    }
}

pub(crate) mod lenient_date_opt {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_some(&d.format("%Y-%m-%d").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => super::parse_date(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {s}"))),
        }
    }
}
