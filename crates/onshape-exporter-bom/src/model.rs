//! Bill-of-materials value types.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Material code of parts that are sent to the printer.
const PRINTABLE_MATERIAL: &str = "PETG";

/// Revision addressing discriminator (`wvmType` in the Onshape API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionType {
    /// Mutable workspace (`w`)
    Workspace,
    /// Immutable named version (`v`)
    Version,
    /// Microversion (`m`)
    Microversion,
}

impl RevisionType {
    /// Path segment used by the API when addressing this revision kind.
    #[must_use]
    pub fn as_path_segment(self) -> &'static str {
        match self {
            Self::Workspace => "w",
            Self::Version => "v",
            Self::Microversion => "m",
        }
    }
}

impl fmt::Display for RevisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path_segment())
    }
}

impl FromStr for RevisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "w" | "workspace" => Ok(Self::Workspace),
            "v" | "version" => Ok(Self::Version),
            "m" | "microversion" => Ok(Self::Microversion),
            other => Err(format!("unknown revision type: {other}")),
        }
    }
}

/// The CAD element a BOM line item originates from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ItemSource {
    /// Full configuration string of the part
    pub configuration: String,
    /// Document identifier (`did`)
    pub document_id: String,
    /// Element identifier (`eid`)
    pub element_id: String,
    /// Revision kind of `revision_id`
    pub revision_type: RevisionType,
    /// Workspace, version or microversion identifier
    pub revision_id: String,
    /// Part identifier within the part studio
    pub part_id: String,
}

/// A single bill-of-materials line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BomItem {
    /// Part name
    pub name: String,
    /// Part description
    pub description: String,
    /// Material identifier code
    pub material: String,
    /// Quantity in the assembly
    pub quantity: f64,
    /// Originating element
    pub source: ItemSource,
}

impl BomItem {
    /// Whether this part is 3D printed (material is PETG, any case).
    #[must_use]
    pub fn is_printable(&self) -> bool {
        self.material.eq_ignore_ascii_case(PRINTABLE_MATERIAL)
    }
}

/// Ordered bill-of-materials table.
///
/// Line item order is preserved from the source payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BomTable {
    items: Vec<BomItem>,
}

impl BomTable {
    /// Create a table from already normalized items.
    #[must_use]
    pub fn new(items: Vec<BomItem>) -> Self {
        Self { items }
    }

    /// All line items in source order.
    #[must_use]
    pub fn items(&self) -> &[BomItem] {
        &self.items
    }

    /// Number of line items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the table has no line items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over line items in source order.
    pub fn iter(&self) -> std::slice::Iter<'_, BomItem> {
        self.items.iter()
    }

    /// Iterate over printable line items in source order.
    pub fn printable(&self) -> impl Iterator<Item = &BomItem> {
        self.items.iter().filter(|item| item.is_printable())
    }
}

impl<'a> IntoIterator for &'a BomTable {
    type Item = &'a BomItem;
    type IntoIter = std::slice::Iter<'a, BomItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
