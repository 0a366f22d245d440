pub mod assembler;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod identity;
pub mod itinerary;
pub mod model;
pub mod session;
pub mod store;
pub mod validation;

pub use assembler::{Merge, SaveOutcome, duplicate_request, merge_batch, merge_passenger, save_request};
pub use error::{AssemblyError, ExportError, ExtractError, Field, FieldErrors, StoreError};
pub use model::{
    Attachment, Billing, Passenger, PassengerProfile, Request, RequestDraft, RequestStatus, Segment, StatusAction,
};
pub use session::{ImportReport, PassengerForm, Session};
pub use store::{RequestFilter, Store, TomlStore};
