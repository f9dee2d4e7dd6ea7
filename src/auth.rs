//! Identifiers, redacted secrets, delegated grants, and access-token models.

pub mod id;
pub mod token;

pub use id::*;
pub use token::{grant::*, record::*, secret::*};
