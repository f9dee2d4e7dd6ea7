//! Long-lived delegated grants stored per principal.

// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, token::secret::TokenSecret},
};

/// Kind of credential a principal's grant holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
	/// Refresh token obtained by redeeming the sign-in authorization code.
	RefreshToken,
	/// User assertion (JWT) redeemed through the on-behalf-of exchange.
	Assertion,
}
impl GrantKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantKind::RefreshToken => "refresh_token",
			GrantKind::Assertion => "assertion",
		}
	}
}

/// Credential that lets the broker mint access tokens for a principal without user interaction.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedGrant {
	/// Principal that owns the grant.
	pub principal: PrincipalId,
	/// Credential kind.
	pub kind: GrantKind,
	/// Credential value; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Instant the grant was obtained or last rotated.
	pub obtained_at: OffsetDateTime,
}
impl DelegatedGrant {
	/// Creates a refresh-token grant obtained now.
	pub fn refresh_token(principal: PrincipalId, secret: impl Into<TokenSecret>) -> Self {
		Self {
			principal,
			kind: GrantKind::RefreshToken,
			secret: secret.into(),
			obtained_at: OffsetDateTime::now_utc(),
		}
	}

	/// Creates an on-behalf-of assertion grant obtained now.
	pub fn assertion(principal: PrincipalId, secret: impl Into<TokenSecret>) -> Self {
		Self {
			principal,
			kind: GrantKind::Assertion,
			secret: secret.into(),
			obtained_at: OffsetDateTime::now_utc(),
		}
	}

	/// Returns the grant with its secret replaced by a rotated value.
	pub fn rotated(self, secret: impl Into<TokenSecret>) -> Self {
		Self { secret: secret.into(), obtained_at: OffsetDateTime::now_utc(), ..self }
	}
}
impl Debug for DelegatedGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DelegatedGrant")
			.field("principal", &self.principal)
			.field("kind", &self.kind)
			.field("secret", &"<redacted>")
			.field("obtained_at", &self.obtained_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rotation_keeps_principal_and_kind() {
		let principal = PrincipalId::new("user-9").expect("Principal fixture should be valid.");
		let grant = DelegatedGrant::refresh_token(principal.clone(), "refresh-1");
		let rotated = grant.clone().rotated("refresh-2");

		assert_eq!(rotated.principal, principal);
		assert_eq!(rotated.kind, GrantKind::RefreshToken);
		assert_eq!(rotated.secret.expose(), "refresh-2");
		assert!(rotated.obtained_at >= grant.obtained_at);
		assert!(!format!("{rotated:?}").contains("refresh-2"));
	}
}
