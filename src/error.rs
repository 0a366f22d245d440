use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Form fields a validation message can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    FullName,
    TaxId,
    BirthDate,
    Itineraries,
    Origin,
    Destination,
    DepartureDate,
    ReturnDate,
    WebId,
    Passengers,
}

impl Field {
    pub fn key(&self) -> &'static str {
        match self {
            Field::FullName => "full_name",
            Field::TaxId => "tax_id",
            Field::BirthDate => "birth_date",
            Field::Itineraries => "itineraries",
            Field::Origin => "origin",
            Field::Destination => "destination",
            Field::DepartureDate => "departure_date",
            Field::ReturnDate => "return_date",
            Field::WebId => "web_id",
            Field::Passengers => "passengers",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Collected field-level validation messages.
///
/// Checks never stop at the first problem: every violated field gets an entry,
/// and the map is rendered as-is by the caller. Only the first message per
/// field is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: BTreeMap<Field, String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.errors.entry(field).or_insert_with(|| message.into());
    }

    pub fn extend(&mut self, other: FieldErrors) {
        for (field, message) in other.errors {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.errors.contains_key(&field)
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.errors.iter().map(|(f, m)| (*f, m.as_str()))
    }

    /// `Ok(value)` when nothing was collected, otherwise the collected errors.
    pub fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(field, msg)| format!("{}: {}", field, msg)).collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for FieldErrors {}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("request is incomplete ({0})")]
    Incomplete(FieldErrors),
    #[error("cannot {action} a request that is {from}")]
    InvalidTransition { action: &'static str, from: String },
    #[error("request {0} not found")]
    NotFound(String),
    #[error("failed to persist request: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode records: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("AI API key is not set (expected in ${0})")]
    MissingApiKey(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("AI service returned {status}: {body}")]
    Service { status: u16, body: String },
    #[error("AI response had no text content")]
    EmptyResponse,
    #[error("AI response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read document {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("'typst' is not installed")]
    TypstMissing,
    #[error("typst failed to compile {0}")]
    Compile(PathBuf),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
