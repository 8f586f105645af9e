use serde::Serialize;

/// Column metadata of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    /// Zero-based position in the select list
    pub ordinal: usize,
    /// Declared or native type name, when the backend reports one
    pub type_name: Option<String>,
}

impl FieldInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, ordinal: usize, type_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            type_name,
        }
    }
}
