//! Optional observability helpers for broker flows and gateway operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `powerbi_gateway.flow` with the `flow`
//!   (operation) and `stage` (call site) fields, plus warnings for tolerated failures.
//! - Enable `metrics` to increment the `powerbi_gateway_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the broker and the dataset gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Interactive sign-in (authorize redirect + code redemption).
	SignIn,
	/// Delegated access-token acquisition.
	Delegation,
	/// Dataset listing.
	ListDatasets,
	/// Single dataset lookup.
	GetDataset,
	/// Dataset creation.
	CreateDataset,
	/// Table row deletion.
	ClearTable,
	/// Table row append.
	AddTableRows,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::SignIn => "sign_in",
			FlowKind::Delegation => "delegation",
			FlowKind::ListDatasets => "list_datasets",
			FlowKind::GetDataset => "get_dataset",
			FlowKind::CreateDataset => "create_dataset",
			FlowKind::ClearTable => "clear_table",
			FlowKind::AddTableRows => "add_table_rows",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Runs `fut` inside a [`FlowSpan`] and records attempt/success/failure outcomes.
pub(crate) async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_err) => {
			#[cfg(feature = "tracing")]
			::tracing::debug!(flow = kind.as_str(), stage, error = %_err, "flow failed");

			record_flow_outcome(kind, FlowOutcome::Failure);
		},
	}

	result
}
