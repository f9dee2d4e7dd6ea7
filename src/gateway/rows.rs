//! Request body encodings for `AddTableRows`.

// self
use crate::{_prelude::*, error::ConfigError, gateway::model::Row};

/// How row values are rendered in the `{"rows": [...]}` body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowEncoding {
	/// Values keep their JSON type.
	#[default]
	Typed,
	/// Every value is sent as a string; `null` becomes `""`.
	Stringified,
}
impl RowEncoding {
	/// Returns the configuration label.
	pub const fn as_str(self) -> &'static str {
		match self {
			RowEncoding::Typed => "typed",
			RowEncoding::Stringified => "stringified",
		}
	}

	/// Serializes `rows` into the request body.
	///
	/// Each element carries exactly the keys present in its source row, in the same order.
	pub fn encode(self, rows: &[Row]) -> Result<Vec<u8>, ConfigError> {
		let body = match self {
			RowEncoding::Typed => serde_json::to_vec(&RowsBody { rows }),
			RowEncoding::Stringified => {
				let rows = rows
					.iter()
					.map(|row| {
						row.iter()
							.map(|(column, value)| (column, value.to_legacy_string()))
							.collect::<Row>()
					})
					.collect::<Vec<_>>();

				serde_json::to_vec(&RowsBody { rows: &rows })
			},
		};

		body.map_err(|source| ConfigError::RequestBody { source })
	}
}
impl Display for RowEncoding {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for RowEncoding {
	type Err = UnknownRowEncoding;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"typed" => Ok(RowEncoding::Typed),
			"stringified" | "string" | "legacy" => Ok(RowEncoding::Stringified),
			_ => Err(UnknownRowEncoding(s.to_owned())),
		}
	}
}

/// Error returned when a row encoding label is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("`{0}` is not a row encoding; expected `typed` or `stringified`")]
pub struct UnknownRowEncoding(pub String);

#[derive(Serialize)]
struct RowsBody<'a> {
	rows: &'a [Row],
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn rows(json: &str) -> Vec<Row> {
		serde_json::from_str(json).expect("Row fixture should parse.")
	}

	#[test]
	fn typed_encoding_preserves_json_types() {
		let body = RowEncoding::Typed
			.encode(&rows(r#"[{"id":1,"amount":100.5,"paid":true,"note":null,"sku":"A"}]"#))
			.expect("Rows should encode.");
		let value: serde_json::Value = serde_json::from_slice(&body).expect("Body should be JSON.");

		assert_eq!(
			value,
			serde_json::json!({ "rows": [{ "id": 1, "amount": 100.5, "paid": true, "note": null, "sku": "A" }] })
		);
	}

	#[test]
	fn stringified_encoding_matches_the_legacy_contract() {
		let body = RowEncoding::Stringified
			.encode(&rows(r#"[{"id":1,"amount":100},{"id":2,"paid":false,"note":null}]"#))
			.expect("Rows should encode.");
		let value: serde_json::Value = serde_json::from_slice(&body).expect("Body should be JSON.");

		assert_eq!(
			value,
			serde_json::json!({
				"rows": [
					{ "id": "1", "amount": "100" },
					{ "id": "2", "paid": "false", "note": "" },
				],
			})
		);
	}

	#[test]
	fn bodies_keep_submission_column_order() {
		let source = rows(r#"[{"id":1,"amount":100,"customer":"Contoso"}]"#);

		assert_eq!(
			RowEncoding::Stringified.encode(&source).expect("Rows should encode."),
			br#"{"rows":[{"id":"1","amount":"100","customer":"Contoso"}]}"#
		);
		assert_eq!(
			RowEncoding::Typed.encode(&source).expect("Rows should encode."),
			br#"{"rows":[{"id":1,"amount":100,"customer":"Contoso"}]}"#
		);
	}

	#[test]
	fn empty_batches_encode_an_empty_array() {
		for encoding in [RowEncoding::Typed, RowEncoding::Stringified] {
			assert_eq!(encoding.encode(&[]).expect("Rows should encode."), br#"{"rows":[]}"#);
		}
	}

	#[test]
	fn labels_parse_case_insensitively() {
		assert_eq!("Stringified".parse::<RowEncoding>(), Ok(RowEncoding::Stringified));
		assert_eq!("TYPED".parse::<RowEncoding>(), Ok(RowEncoding::Typed));
		assert!("csv".parse::<RowEncoding>().is_err());
	}
}
