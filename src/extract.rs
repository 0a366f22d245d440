//! Pre-filling requests from documents through a hosted LLM.
//!
//! The model's answer is treated as untrusted: it is read into loose `Raw*`
//! types and coerced into the canonical model, record by record.

use std::fs;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::identity;
use crate::itinerary::{DateCheck, SegmentDraft, expand};
use crate::model::{Billing, Passenger, parse_date};

/// A document handed to the extractor.
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let bytes = fs::read(path).map_err(|source| ExtractError::Document { path: path.to_path_buf(), source })?;
        let media_type = match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
            Some(ext) if ext == "png" => "image/png",
            Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
            _ => "application/pdf",
        };
        Ok(Self {
            file_name: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            media_type: media_type.to_string(),
            bytes,
        })
    }
}

pub trait Extractor {
    fn extract(&self, document: &Document) -> Result<RawExtraction, ExtractError>;
}

// ==========================================
// Loose payload
// ==========================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawExtraction {
    pub billing: Option<RawBilling>,
    #[serde(alias = "travelers", alias = "passageiros")]
    pub passengers: Vec<RawPassenger>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBilling {
    #[serde(alias = "webId")]
    pub web_id: Option<Value>,
    #[serde(alias = "projectAccount", alias = "project")]
    pub project_account: Option<Value>,
    pub description: Option<Value>,
    #[serde(alias = "costCenter")]
    pub cost_center: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPassenger {
    #[serde(alias = "fullName", alias = "full_name", alias = "nome")]
    pub name: Option<Value>,
    #[serde(alias = "taxId", alias = "tax_id")]
    pub cpf: Option<Value>,
    #[serde(alias = "birthDate", alias = "dataNascimento")]
    pub birth_date: Option<Value>,
    pub email: Option<Value>,
    #[serde(alias = "telefone")]
    pub phone: Option<Value>,
    #[serde(alias = "segments", alias = "trechos")]
    pub itineraries: Vec<RawSegment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSegment {
    #[serde(alias = "origem")]
    pub origin: Option<Value>,
    #[serde(alias = "destino")]
    pub destination: Option<Value>,
    #[serde(alias = "departureDate", alias = "dataIda")]
    pub departure_date: Option<Value>,
    #[serde(alias = "returnDate", alias = "dataVolta")]
    pub return_date: Option<Value>,
    #[serde(alias = "roundTrip")]
    pub round_trip: Option<Value>,
    #[serde(alias = "airline")]
    pub carrier: Option<Value>,
    #[serde(alias = "flightNumber", alias = "flight")]
    pub flight_number: Option<Value>,
    #[serde(alias = "time")]
    pub schedule: Option<Value>,
    #[serde(alias = "qty")]
    pub quantity: Option<Value>,
    #[serde(alias = "unitPrice", alias = "price")]
    pub unit_price: Option<Value>,
}

// ==========================================
// Coercion
// ==========================================

/// A raw passenger that could not be used, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Coerced {
    pub billing: Billing,
    pub passengers: Vec<Passenger>,
    pub rejected: Vec<Rejection>,
    /// Non-fatal remarks: dropped segments, past-dated legs, unreadable optional fields.
    pub notes: Vec<String>,
}

fn text(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

// JSON numbers lose the leading zeros a CPF may have.
fn cpf_text(value: &Option<Value>) -> String {
    match value.as_ref().and_then(Value::as_u64) {
        Some(n) if n < 100_000_000_000 => format!("{:011}", n),
        _ => text(value),
    }
}

fn optional_text(value: &Option<Value>) -> Option<String> {
    Some(text(value)).filter(|s| !s.is_empty())
}

/// Accepts JSON numbers and strings like `"R$ 1.234,50"`, `"1,234.50"` or `"850"`.
/// Without a comma, dots followed by groups of exactly three digits are
/// thousands separators: `"1.500"` is 1500, `"1.5"` is 1.5.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
                .collect();
            let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
                (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
                (Some(_), Some(_)) => cleaned.replace(',', ""),
                (Some(_), None) => cleaned.replace(',', "."),
                (None, Some(_)) if dots_group_thousands(&cleaned) => cleaned.replace('.', ""),
                _ => cleaned,
            };
            normalized.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

fn dots_group_thousands(s: &str) -> bool {
    let mut groups = s.split('.');
    groups.next();
    groups.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

/// Null, missing or blank.
fn absent(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn truthy(value: &Option<Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "sim" | "1"),
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn date(value: &Option<Value>) -> Option<NaiveDate> {
    parse_date(&text(value))
}

/// Turns the loose payload into canonical passengers and billing.
///
/// Passengers without a name or CPF, or without any usable segment, are
/// rejected. Segments missing origin, destination or departure date are
/// dropped with a note. Imported departures are not held against `today`;
/// past ones are only noted.
pub fn coerce(raw: RawExtraction, today: NaiveDate) -> Coerced {
    let mut out = Coerced::default();

    if let Some(b) = &raw.billing {
        out.billing = Billing {
            web_id: text(&b.web_id),
            project_account: text(&b.project_account),
            description: text(&b.description),
            cost_center: text(&b.cost_center),
        };
    }

    for (index, rp) in raw.passengers.iter().enumerate() {
        let name = text(&rp.name);
        let reject = |reason: &str| Rejection { index, name: name.clone(), reason: reason.to_string() };

        if name.is_empty() {
            out.rejected.push(reject("name is missing"));
            continue;
        }
        let cpf = identity::normalize(&cpf_text(&rp.cpf));
        if cpf.is_empty() {
            out.rejected.push(reject("CPF is missing"));
            continue;
        }
        if !identity::validate(&cpf) {
            out.notes.push(format!("{}: CPF {} does not pass the check digits", name, identity::format(&cpf)));
        }

        let mut passenger = Passenger::new(name.clone(), &cpf);
        passenger.email = optional_text(&rp.email);
        passenger.phone = optional_text(&rp.phone);
        passenger.birth_date = date(&rp.birth_date);
        if passenger.birth_date.is_none() && rp.birth_date.is_some() {
            out.notes.push(format!("{}: birth date '{}' could not be read", name, text(&rp.birth_date)));
        }

        for (seg_index, rs) in rp.itineraries.iter().enumerate() {
            let draft = SegmentDraft {
                origin: text(&rs.origin),
                destination: text(&rs.destination),
                departure_date: date(&rs.departure_date),
                carrier: text(&rs.carrier),
                flight_number: text(&rs.flight_number),
                schedule: text(&rs.schedule),
                quantity: rs.quantity.as_ref().and_then(parse_number),
                unit_price: rs.unit_price.as_ref().and_then(parse_number),
            };
            if draft.unit_price.is_none() && !absent(&rs.unit_price) {
                out.notes.push(format!(
                    "{}: segment {} price '{}' could not be read, counted as zero",
                    name,
                    seg_index + 1,
                    text(&rs.unit_price)
                ));
            }
            let return_date = date(&rs.return_date);
            // An explicit round-trip flag wins over a stray return date.
            let include_return =
                if absent(&rs.round_trip) { return_date.is_some() } else { truthy(&rs.round_trip) };

            match expand(&draft, include_return, return_date, DateCheck::Unchecked) {
                Ok(legs) => {
                    for leg in legs.iter().filter(|l| l.departure_date < today) {
                        out.notes.push(format!(
                            "{}: {} -> {} departs in the past ({})",
                            name,
                            leg.origin,
                            leg.destination,
                            leg.departure_date.format("%d/%m/%Y")
                        ));
                    }
                    passenger.itineraries.extend(legs);
                }
                Err(errors) => {
                    out.notes.push(format!("{}: segment {} dropped ({})", name, seg_index + 1, errors));
                }
            }
        }

        if passenger.itineraries.is_empty() {
            out.rejected.push(reject("no usable itinerary"));
            continue;
        }
        out.passengers.push(passenger);
    }

    for r in &out.rejected {
        warn!("imported passenger #{} ({}) rejected: {}", r.index + 1, r.name, r.reason);
    }
    out
}

// ==========================================
// HTTP client
// ==========================================

pub const EXTRACTION_PROMPT: &str = r#"You read travel request documents (forms, e-mails, tickets) and return ONLY a JSON object, no prose, with this shape:
{
  "billing": {"web_id": "", "project_account": "", "description": "", "cost_center": ""},
  "passengers": [
    {
      "name": "", "cpf": "", "birth_date": "DD/MM/YYYY", "email": "", "phone": "",
      "itineraries": [
        {"origin": "", "destination": "", "departure_date": "DD/MM/YYYY",
         "round_trip": false, "return_date": "DD/MM/YYYY",
         "carrier": "", "flight_number": "", "schedule": "", "quantity": 1, "unit_price": 0}
      ]
    }
  ]
}
Use airport codes or city names as written. Leave a field empty when the document does not state it. Never invent values."#;

#[derive(Debug, Clone)]
pub struct HttpExtractor {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpExtractor {
    pub fn new(endpoint: &str, model: &str, api_key: String, timeout: Duration) -> Result<Self, ExtractError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    fn request_body(&self, document: &Document) -> Value {
        json!({
            "contents": [{
                "parts": [
                    {"text": EXTRACTION_PROMPT},
                    {"inline_data": {"mime_type": document.media_type, "data": BASE64.encode(&document.bytes)}}
                ]
            }],
            "generationConfig": {"temperature": 0.1, "responseMimeType": "application/json"}
        })
    }
}

impl Extractor for HttpExtractor {
    fn extract(&self, document: &Document) -> Result<RawExtraction, ExtractError> {
        let url = format!("{}/{}:generateContent", self.endpoint, self.model);
        info!(
            "sending {} ({} bytes) to {} for extraction",
            document.file_name,
            document.bytes.len(),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(document))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExtractError::Service { status: status.as_u16(), body });
        }
        let body: Value = response.json()?;
        let text = response_text(&body).ok_or(ExtractError::EmptyResponse)?;
        debug!("extraction answer: {} chars", text.len());
        parse_answer(&text)
    }
}

/// Concatenated text parts of the first candidate.
pub fn response_text(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect();
    Some(text).filter(|t| !t.trim().is_empty())
}

/// Parses the model's answer, tolerating a surrounding ```json fence.
pub fn parse_answer(answer: &str) -> Result<RawExtraction, ExtractError> {
    let trimmed = answer.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);
    Ok(serde_json::from_str(body.trim())?)
}
