//! Token material: redacted secrets, stored grants, and issued access tokens.

pub mod grant;
pub mod record;
pub mod secret;
