//! Dataset gateway: typed access to the Power BI dataset, table, and row endpoints.
//!
//! Every operation asks a [`TokenSource`](crate::flows::TokenSource) for a fresh delegated
//! token and then issues exactly one HTTP call. When no token can be obtained the API is
//! never contacted.

pub mod model;
pub mod rows;

#[cfg(feature = "reqwest")] mod client;

#[cfg(feature = "reqwest")] pub use client::*;
pub use model::*;
pub use rows::*;
