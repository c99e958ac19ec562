//! Normalization of the raw Onshape BOM payload.
//!
//! The assembly BOM endpoint returns `{"bomTable": {"items": [...]}}`. Each
//! entry carries its own `itemSource` block, which is mapped field by field:
//!
//! | Payload field       | [`ItemSource`] field |
//! |---------------------|----------------------|
//! | `fullConfiguration` | `configuration`      |
//! | `documentId`        | `document_id`        |
//! | `elementId`         | `element_id`         |
//! | `wvmType`           | `revision_type`      |
//! | `wvmId`             | `revision_id`        |
//! | `partId`            | `part_id`            |
//!
//! `material` appears either as a plain code or as an object with an `id`.

use crate::model::{BomItem, BomTable, ItemSource, RevisionType};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Both historical shapes of the `material` field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMaterial {
    Code(String),
    Object { id: String },
}

impl RawMaterial {
    fn into_code(self) -> String {
        match self {
            Self::Code(code) | Self::Object { id: code } => code,
        }
    }
}

/// Parse a raw BOM payload into a [`BomTable`].
///
/// # Errors
///
/// Returns the first structural problem found. No partial table is ever
/// returned.
///
/// # Examples
///
/// ```
/// use onshape_exporter_bom::parse_bom;
/// use serde_json::json;
///
/// let raw = json!({"bomTable": {"items": [{
///     "name": "Bracket",
///     "description": "",
///     "material": {"id": "PETG"},
///     "quantity": 2,
///     "itemSource": {
///         "fullConfiguration": "default",
///         "documentId": "d1",
///         "elementId": "e1",
///         "wvmType": "w",
///         "wvmId": "w1",
///         "partId": "JHD"
///     }
/// }]}});
///
/// let table = parse_bom(&raw).unwrap();
/// assert!(table.items()[0].is_printable());
/// ```
pub fn parse_bom(raw: &Value) -> Result<BomTable, BomParseError> {
    let bom_table = raw
        .get("bomTable")
        .ok_or_else(|| BomParseError::table("bomTable", ParseErrorKind::Missing))?;
    let items = bom_table
        .get("items")
        .ok_or_else(|| BomParseError::table("bomTable.items", ParseErrorKind::Missing))?
        .as_array()
        .ok_or_else(|| {
            BomParseError::table(
                "bomTable.items",
                ParseErrorKind::WrongType { expected: "array" },
            )
        })?;

    let items = items
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_item(index, entry))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(items = items.len(), "Parsed BOM table");

    Ok(BomTable::new(items))
}

fn parse_item(index: usize, entry: &Value) -> Result<BomItem, BomParseError> {
    let entry = entry.as_object().ok_or_else(|| {
        BomParseError::item(index, "item", ParseErrorKind::WrongType { expected: "object" })
    })?;

    let name = string_field(index, entry, "", "name")?;
    let description = string_field(index, entry, "", "description")?;
    let material = material_field(index, entry)?;
    let quantity = number_field(index, entry, "quantity")?;

    let source = entry
        .get("itemSource")
        .ok_or_else(|| BomParseError::item(index, "itemSource", ParseErrorKind::Missing))?
        .as_object()
        .ok_or_else(|| {
            BomParseError::item(
                index,
                "itemSource",
                ParseErrorKind::WrongType { expected: "object" },
            )
        })?;

    let wvm_type = string_field(index, source, "itemSource.", "wvmType")?;
    let revision_type = wvm_type.parse::<RevisionType>().map_err(|_| {
        BomParseError::item(
            index,
            "itemSource.wvmType",
            ParseErrorKind::InvalidValue { value: wvm_type },
        )
    })?;

    Ok(BomItem {
        name,
        description,
        material,
        quantity,
        source: ItemSource {
            configuration: string_field(index, source, "itemSource.", "fullConfiguration")?,
            document_id: string_field(index, source, "itemSource.", "documentId")?,
            element_id: string_field(index, source, "itemSource.", "elementId")?,
            revision_type,
            revision_id: string_field(index, source, "itemSource.", "wvmId")?,
            part_id: string_field(index, source, "itemSource.", "partId")?,
        },
    })
}

fn string_field(
    index: usize,
    object: &Map<String, Value>,
    prefix: &str,
    key: &str,
) -> Result<String, BomParseError> {
    let field = || format!("{prefix}{key}");
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(BomParseError::item(
            index,
            field(),
            ParseErrorKind::WrongType { expected: "string" },
        )),
        None => Err(BomParseError::item(index, field(), ParseErrorKind::Missing)),
    }
}

fn number_field(
    index: usize,
    object: &Map<String, Value>,
    key: &str,
) -> Result<f64, BomParseError> {
    let value = object
        .get(key)
        .ok_or_else(|| BomParseError::item(index, key, ParseErrorKind::Missing))?;
    value.as_f64().ok_or_else(|| {
        BomParseError::item(index, key, ParseErrorKind::WrongType { expected: "number" })
    })
}

fn material_field(index: usize, object: &Map<String, Value>) -> Result<String, BomParseError> {
    let value = object
        .get("material")
        .ok_or_else(|| BomParseError::item(index, "material", ParseErrorKind::Missing))?;

    match RawMaterial::deserialize(value) {
        Ok(material) => Ok(material.into_code()),
        Err(_) => Err(match value {
            Value::Object(map) if !map.contains_key("id") => {
                BomParseError::item(index, "material.id", ParseErrorKind::Missing)
            }
            Value::Object(_) => BomParseError::item(
                index,
                "material.id",
                ParseErrorKind::WrongType { expected: "string" },
            ),
            _ => BomParseError::item(
                index,
                "material",
                ParseErrorKind::WrongType {
                    expected: "string or object",
                },
            ),
        }),
    }
}

/// A malformed or incomplete BOM payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}: field `{field}` {kind}", describe_location(.index))]
pub struct BomParseError {
    /// Index of the failing line item, `None` for table-level failures
    pub index: Option<usize>,
    /// Dotted path of the failing field (e.g. `itemSource.documentId`)
    pub field: String,
    /// What went wrong with the field
    pub kind: ParseErrorKind,
}

impl BomParseError {
    fn table(field: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            index: None,
            field: field.into(),
            kind,
        }
    }

    fn item(index: usize, field: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self {
            index: Some(index),
            field: field.into(),
            kind,
        }
    }
}

fn describe_location(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("BOM item {i}"),
        None => "BOM table".to_string(),
    }
}

/// Failure classes for a single BOM field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    /// Required key absent
    #[error("is missing")]
    Missing,
    /// Key present with an unexpected JSON type
    #[error("has wrong type (expected {expected})")]
    WrongType {
        /// Expected JSON type
        expected: &'static str,
    },
    /// Key present but its value is not recognized
    #[error("has invalid value {value:?}")]
    InvalidValue {
        /// The rejected value
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(material: Value) -> Value {
        json!({
            "name": "Bracket",
            "description": "Motor bracket",
            "material": material,
            "quantity": 4,
            "itemSource": {
                "fullConfiguration": "default",
                "documentId": "d0c0ffee",
                "elementId": "e1e1e1",
                "wvmType": "w",
                "wvmId": "w0rk",
                "partId": "JHD"
            }
        })
    }

    fn payload(items: Vec<Value>) -> Value {
        json!({ "bomTable": { "items": items } })
    }

    #[test]
    fn string_material_is_printable() {
        let table = parse_bom(&payload(vec![entry(json!("PETG"))])).unwrap();

        assert_eq!(table.len(), 1);
        let item = &table.items()[0];
        assert!(item.is_printable());
        assert_eq!(item.name, "Bracket");
        assert_eq!(item.description, "Motor bracket");
        assert!((item.quantity - 4.0).abs() < f64::EPSILON);
        assert_eq!(
            item.source,
            ItemSource {
                configuration: "default".to_string(),
                document_id: "d0c0ffee".to_string(),
                element_id: "e1e1e1".to_string(),
                revision_type: RevisionType::Workspace,
                revision_id: "w0rk".to_string(),
                part_id: "JHD".to_string(),
            }
        );
    }

    #[test]
    fn object_material_equals_string_material() {
        let from_string = parse_bom(&payload(vec![entry(json!("PETG"))])).unwrap();
        let from_object =
            parse_bom(&payload(vec![entry(json!({"id": "PETG", "displayName": "PETG"}))]))
                .unwrap();

        assert_eq!(from_string, from_object);
    }

    #[test]
    fn item_order_is_preserved() {
        let mut second = entry(json!("Steel"));
        second["name"] = json!("Bolt");
        let mut third = entry(json!("petg"));
        third["name"] = json!("Cover");

        let table = parse_bom(&payload(vec![entry(json!("PETG")), second, third])).unwrap();

        let names: Vec<_> = table.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Bracket", "Bolt", "Cover"]);
        assert_eq!(table.printable().count(), 2);
    }

    #[test]
    fn fractional_quantity() {
        let mut item = entry(json!("PLA"));
        item["quantity"] = json!(0.5);

        let table = parse_bom(&payload(vec![item])).unwrap();
        assert!((table.items()[0].quantity - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_items_gives_empty_table() {
        let table = parse_bom(&payload(Vec::new())).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn missing_document_id_fails() {
        let good = entry(json!("PETG"));
        let mut bad = entry(json!("PETG"));
        bad["itemSource"]
            .as_object_mut()
            .unwrap()
            .remove("documentId");

        let err = parse_bom(&payload(vec![good, bad])).unwrap_err();

        assert_eq!(err.index, Some(1));
        assert_eq!(err.field, "itemSource.documentId");
        assert_eq!(err.kind, ParseErrorKind::Missing);
        assert_eq!(
            err.to_string(),
            "BOM item 1: field `itemSource.documentId` is missing"
        );
    }

    #[test]
    fn missing_bom_table_fails() {
        let err = parse_bom(&json!({"items": []})).unwrap_err();
        assert_eq!(err.index, None);
        assert_eq!(err.field, "bomTable");
    }

    #[test]
    fn items_must_be_array() {
        let err = parse_bom(&json!({"bomTable": {"items": {}}})).unwrap_err();
        assert_eq!(err.field, "bomTable.items");
        assert_eq!(err.kind, ParseErrorKind::WrongType { expected: "array" });

        let err = parse_bom(&json!({"bomTable": {}})).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Missing);
    }

    #[test]
    fn wrong_types_are_rejected() {
        let mut item = entry(json!("PETG"));
        item["quantity"] = json!("4");
        let err = parse_bom(&payload(vec![item])).unwrap_err();
        assert_eq!(err.field, "quantity");
        assert_eq!(err.kind, ParseErrorKind::WrongType { expected: "number" });

        let mut item = entry(json!("PETG"));
        item["name"] = Value::Null;
        let err = parse_bom(&payload(vec![item])).unwrap_err();
        assert_eq!(err.field, "name");

        let err = parse_bom(&payload(vec![json!("not an object")])).unwrap_err();
        assert_eq!(err.index, Some(0));
        assert_eq!(err.field, "item");
    }

    #[test]
    fn material_variants_are_validated() {
        let err = parse_bom(&payload(vec![entry(json!({"name": "PETG"}))])).unwrap_err();
        assert_eq!(err.field, "material.id");
        assert_eq!(err.kind, ParseErrorKind::Missing);

        let err = parse_bom(&payload(vec![entry(json!({"id": 7}))])).unwrap_err();
        assert_eq!(err.field, "material.id");

        let err = parse_bom(&payload(vec![entry(Value::Null)])).unwrap_err();
        assert_eq!(err.field, "material");
        assert_eq!(
            err.kind,
            ParseErrorKind::WrongType {
                expected: "string or object"
            }
        );
    }

    #[test]
    fn unknown_wvm_type_fails() {
        let mut item = entry(json!("PETG"));
        item["itemSource"]["wvmType"] = json!("x");

        let err = parse_bom(&payload(vec![item])).unwrap_err();
        assert_eq!(err.field, "itemSource.wvmType");
        assert_eq!(
            err.kind,
            ParseErrorKind::InvalidValue {
                value: "x".to_string()
            }
        );
    }
}
