//! Dataset, table, and row shapes exchanged with the analytics API.

// self
use crate::{_prelude::*, auth::DatasetId};

/// Column values for a single row, kept in submission order.
///
/// Setting an existing column replaces its value in place, so the wire body lists columns
/// exactly as the caller first supplied them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Map<String, serde_json::Value>")]
pub struct Row(Vec<(String, ScalarValue)>);
impl Row {
	/// Creates an empty row.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets `column`, returning the value it replaced.
	pub fn insert(
		&mut self,
		column: impl Into<String>,
		value: impl Into<ScalarValue>,
	) -> Option<ScalarValue> {
		let column = column.into();
		let value = value.into();

		match self.0.iter_mut().find(|(name, _)| *name == column) {
			Some((_, slot)) => Some(std::mem::replace(slot, value)),
			None => {
				self.0.push((column, value));

				None
			},
		}
	}

	/// Returns the value stored for `column`.
	pub fn get(&self, column: &str) -> Option<&ScalarValue> {
		self.0.iter().find(|(name, _)| name == column).map(|(_, value)| value)
	}

	/// Iterates columns in submission order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &ScalarValue)> {
		self.0.iter().map(|(name, value)| (name.as_str(), value))
	}

	/// Number of columns.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the row has no columns.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Serialize for Row {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.collect_map(self.iter())
	}
}
impl TryFrom<serde_json::Map<String, serde_json::Value>> for Row {
	type Error = NonScalarValue;

	fn try_from(map: serde_json::Map<String, serde_json::Value>) -> Result<Self, Self::Error> {
		map.into_iter()
			.map(|(column, value)| Ok((column, ScalarValue::try_from(value)?)))
			.collect::<Result<Vec<_>, _>>()
			.map(Self)
	}
}
impl<K, V> FromIterator<(K, V)> for Row
where
	K: Into<String>,
	V: Into<ScalarValue>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
	{
		let mut row = Row::new();

		for (column, value) in iter {
			row.insert(column, value);
		}

		row
	}
}

/// A Power BI push dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
	/// Server-assigned identifier; `None` until the dataset has been created.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<DatasetId>,
	/// Display name.
	pub name: String,
	/// Tables in declaration order.
	#[serde(default)]
	pub tables: Vec<Table>,
}
impl Dataset {
	/// Creates an unsaved dataset.
	pub fn new(name: impl Into<String>, tables: Vec<Table>) -> Self {
		Self { id: None, name: name.into(), tables }
	}
}

/// Table definition inside a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
	/// Table name, unique within its dataset.
	pub name: String,
	/// Columns in declaration order.
	#[serde(default)]
	pub columns: Vec<Column>,
}
impl Table {
	/// Creates a table definition.
	pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
		Self { name: name.into(), columns }
	}
}

/// Column definition; `data_type` is passed through without local validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
	/// Column name.
	pub name: String,
	/// Downstream type tag such as `Int64`, `Double`, `String`, `DateTime`, or `Boolean`.
	pub data_type: String,
}
impl Column {
	/// Creates a column definition.
	pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
		Self { name: name.into(), data_type: data_type.into() }
	}
}

/// Address of a table without its content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
	/// Dataset containing the table.
	pub dataset_id: DatasetId,
	/// Table name.
	pub table_name: String,
}
impl TableReference {
	/// Creates a table reference.
	pub fn new(dataset_id: DatasetId, table_name: impl Into<String>) -> Self {
		Self { dataset_id, table_name: table_name.into() }
	}
}

/// Rows destined for one table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
	/// Target table.
	#[serde(flatten)]
	pub table: TableReference,
	/// Rows in submission order.
	pub rows: Vec<Row>,
}
impl RowBatch {
	/// Creates a batch for `table`.
	pub fn new(table: TableReference, rows: Vec<Row>) -> Self {
		Self { table, rows }
	}
}

/// Rejection raised when a row value is an array or an object.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Row values must be null, boolean, number, or string; found {found}.")]
pub struct NonScalarValue {
	/// JSON kind that was rejected.
	pub found: &'static str,
}

// Whole floats below this magnitude are rendered without a fraction.
const WHOLE_FLOAT_LIMIT: f64 = 1e15;

/// JSON scalar stored in a row cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum ScalarValue {
	/// JSON `null`.
	Null,
	/// JSON boolean.
	Bool(bool),
	/// JSON number, kept in its original representation.
	Number(serde_json::Number),
	/// JSON string.
	Text(String),
}
impl ScalarValue {
	/// Renders the value the way the legacy string-only row contract expects.
	///
	/// `null` becomes the empty string and whole floats drop their fraction (`100.0` → `"100"`).
	pub fn to_legacy_string(&self) -> String {
		match self {
			ScalarValue::Null => String::new(),
			ScalarValue::Bool(value) => value.to_string(),
			ScalarValue::Number(value) => match value.as_f64() {
				Some(float)
					if value.is_f64() && float.fract() == 0.0 && float.abs() < WHOLE_FLOAT_LIMIT =>
					format!("{float:.0}"),
				_ => value.to_string(),
			},
			ScalarValue::Text(value) => value.clone(),
		}
	}
}
impl TryFrom<serde_json::Value> for ScalarValue {
	type Error = NonScalarValue;

	fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
		match value {
			serde_json::Value::Null => Ok(ScalarValue::Null),
			serde_json::Value::Bool(value) => Ok(ScalarValue::Bool(value)),
			serde_json::Value::Number(value) => Ok(ScalarValue::Number(value)),
			serde_json::Value::String(value) => Ok(ScalarValue::Text(value)),
			serde_json::Value::Array(_) => Err(NonScalarValue { found: "array" }),
			serde_json::Value::Object(_) => Err(NonScalarValue { found: "object" }),
		}
	}
}
impl From<ScalarValue> for serde_json::Value {
	fn from(value: ScalarValue) -> Self {
		match value {
			ScalarValue::Null => serde_json::Value::Null,
			ScalarValue::Bool(value) => serde_json::Value::Bool(value),
			ScalarValue::Number(value) => serde_json::Value::Number(value),
			ScalarValue::Text(value) => serde_json::Value::String(value),
		}
	}
}
impl From<bool> for ScalarValue {
	fn from(value: bool) -> Self {
		ScalarValue::Bool(value)
	}
}
impl From<i64> for ScalarValue {
	fn from(value: i64) -> Self {
		ScalarValue::Number(value.into())
	}
}
impl From<f64> for ScalarValue {
	fn from(value: f64) -> Self {
		serde_json::Number::from_f64(value).map_or(ScalarValue::Null, ScalarValue::Number)
	}
}
impl From<&str> for ScalarValue {
	fn from(value: &str) -> Self {
		ScalarValue::Text(value.to_owned())
	}
}
impl From<String> for ScalarValue {
	fn from(value: String) -> Self {
		ScalarValue::Text(value)
	}
}
