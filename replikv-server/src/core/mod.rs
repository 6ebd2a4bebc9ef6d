pub mod error;
pub mod types;

pub use error::{Result, ServerError};
pub use types::{MutationKind, MutationRecord};
