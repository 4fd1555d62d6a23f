//! CRM-side models and session capabilities.

pub mod records;
pub mod rest;
pub mod session;

pub use records::{CrmRecord, FieldKey, FieldValue, OrderStatus};
pub use rest::RestCrmSession;
pub use session::{CrmSession, RecordTypePicklist, UpdateAck};
