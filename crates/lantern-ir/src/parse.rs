use crate::types::{TypeError, TypeTable};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Type table error: {0}")]
    Type(#[from] TypeError),
}

/// Parse and validate a type table produced by static analysis.
pub fn parse_type_table(json: &str) -> Result<TypeTable, ParseError> {
    let table: TypeTable = serde_json::from_str(json)?;
    table.validate()?;
    Ok(table)
}
