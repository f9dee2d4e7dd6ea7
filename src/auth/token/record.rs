//! Delegated access tokens issued for a principal and resource, plus their builder.

// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, ResourceId, token::secret::TokenSecret},
};

/// Lifecycle status for an access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is not yet valid because the issued-at instant is in the future.
	Pending,
	/// Token is currently valid.
	Active,
	/// Token reached its expiry instant.
	Expired,
}

/// Errors produced by [`AccessTokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AccessTokenBuilderError {
	/// Issued when no bearer value was provided.
	#[error("Bearer value is required.")]
	MissingSecret,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry is not after the issued-at instant.
	#[error("Token lifetime must be positive.")]
	NonPositiveLifetime,
}

/// Bearer token scoped to one resource on behalf of one principal.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
	/// Principal the token acts for.
	pub principal: PrincipalId,
	/// Resource the token is valid against.
	pub resource: ResourceId,
	/// Bearer value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Issued-at instant recorded before the exchange was sent.
	pub issued_at: OffsetDateTime,
	/// Expiry instant reported by the provider.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Returns a builder for a token issued to `principal` for `resource`.
	pub fn builder(principal: PrincipalId, resource: ResourceId) -> AccessTokenBuilder {
		AccessTokenBuilder::new(principal, resource)
	}

	/// Bearer value for the `Authorization` header.
	pub fn bearer(&self) -> &str {
		self.secret.expose()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> TokenStatus {
		if instant < self.issued_at {
			return TokenStatus::Pending;
		}
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}

		TokenStatus::Active
	}

	/// Returns `true` if the token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), TokenStatus::Expired)
	}

	/// Remaining lifetime at `instant`, clamped at zero.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		let remaining = self.expires_at - instant;

		if remaining.is_negative() { Duration::ZERO } else { remaining }
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("principal", &self.principal)
			.field("resource", &self.resource)
			.field("secret", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`AccessToken`].
#[derive(Clone, Debug)]
pub struct AccessTokenBuilder {
	principal: PrincipalId,
	resource: ResourceId,
	secret: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl AccessTokenBuilder {
	fn new(principal: PrincipalId, resource: ResourceId) -> Self {
		Self { principal, resource, secret: None, issued_at: None, expires_at: None, expires_in: None }
	}

	/// Provides the bearer value.
	pub fn secret(mut self, secret: impl Into<TokenSecret>) -> Self {
		self.secret = Some(secret.into());

		self
	}

	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces an [`AccessToken`].
	pub fn build(self) -> Result<AccessToken, AccessTokenBuilderError> {
		let secret = self
			.secret
			.filter(|secret| !secret.is_empty())
			.ok_or(AccessTokenBuilderError::MissingSecret)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(AccessTokenBuilderError::MissingExpiry),
		};

		if expires_at <= issued_at {
			return Err(AccessTokenBuilderError::NonPositiveLifetime);
		}

		Ok(AccessToken {
			principal: self.principal,
			resource: self.resource,
			secret,
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn fixture_ids() -> (PrincipalId, ResourceId) {
		(
			PrincipalId::new("user-1").expect("Principal fixture should be valid."),
			ResourceId::new("https://analysis.windows.net/powerbi/api")
				.expect("Resource fixture should be valid."),
		)
	}

	#[test]
	fn status_transitions_cover_all_states() {
		let (principal, resource) = fixture_ids();
		let token = AccessToken::builder(principal, resource)
			.secret("bearer")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-01-01 01:00 UTC))
			.build()
			.expect("Token builder should succeed for status transitions.");

		assert_eq!(token.status_at(macros::datetime!(2024-12-31 23:59 UTC)), TokenStatus::Pending);
		assert_eq!(token.status_at(macros::datetime!(2025-01-01 00:30 UTC)), TokenStatus::Active);
		assert_eq!(token.status_at(macros::datetime!(2025-01-01 01:00 UTC)), TokenStatus::Expired);
		assert_eq!(
			token.remaining_at(macros::datetime!(2025-01-01 00:45 UTC)),
			Duration::minutes(15)
		);
		assert_eq!(token.remaining_at(macros::datetime!(2025-01-01 02:00 UTC)), Duration::ZERO);
	}

	#[test]
	fn builder_rejects_missing_or_empty_material() {
		let (principal, resource) = fixture_ids();
		let missing_expiry =
			AccessToken::builder(principal.clone(), resource.clone()).secret("bearer").build();

		assert_eq!(missing_expiry.unwrap_err(), AccessTokenBuilderError::MissingExpiry);

		let empty = AccessToken::builder(principal.clone(), resource.clone())
			.secret("")
			.expires_in(Duration::minutes(5))
			.build();

		assert_eq!(empty.unwrap_err(), AccessTokenBuilderError::MissingSecret);

		let non_positive = AccessToken::builder(principal, resource)
			.secret("bearer")
			.expires_in(Duration::ZERO)
			.build();

		assert_eq!(non_positive.unwrap_err(), AccessTokenBuilderError::NonPositiveLifetime);
	}

	#[test]
	fn debug_output_redacts_bearer() {
		let (principal, resource) = fixture_ids();
		let token = AccessToken::builder(principal, resource)
			.secret("very-secret-bearer")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token builder should succeed.");

		assert!(!format!("{token:?}").contains("very-secret-bearer"));
		assert_eq!(token.bearer(), "very-secret-bearer");
	}
}
