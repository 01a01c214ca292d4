// Query text assembly
// MySQL-dialect identifier/literal escaping and where-clause substitution

use crate::traits::{CellValue, DatabaseError};

/// Quote an identifier for MySQL.
///
/// Dotted names are quoted per segment, so `db.table` becomes
/// `` `db`.`table` ``. Embedded backticks are doubled.
pub fn escape_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("`{}`", part.replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Render a value as a self-contained MySQL literal
pub fn escape_literal(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Bool(true) => "TRUE".to_string(),
        CellValue::Bool(false) => "FALSE".to_string(),
        CellValue::Int(v) => v.to_string(),
        // NaN and infinity have no SQL literal form
        CellValue::Float(v) if v.is_finite() => v.to_string(),
        CellValue::Float(_) => "NULL".to_string(),
        CellValue::String(s) | CellValue::DateTime(s) => escape_string(s),
        CellValue::Binary(bytes) => {
            let mut literal = String::with_capacity(bytes.len() * 2 + 3);
            literal.push_str("X'");
            for byte in bytes {
                literal.push_str(&format!("{:02X}", byte));
            }
            literal.push('\'');
            literal
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// SQL conditional fragment plus its positionally bound values.
///
/// Immutable once constructed; the placeholder count is checked against the
/// value count up front so rendering can never run out of values.
#[derive(Debug, Clone)]
pub struct WhereClause {
    clause: String,
    values: Vec<CellValue>,
}

impl WhereClause {
    pub fn new(
        clause: impl Into<String>,
        values: Vec<CellValue>,
    ) -> Result<Self, DatabaseError> {
        let clause = clause.into();
        let placeholders = clause.matches('?').count();
        if placeholders != values.len() {
            return Err(DatabaseError::PlaceholderMismatch {
                placeholders,
                values: values.len(),
            });
        }
        Ok(Self { clause, values })
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    /// Substitute every positional placeholder with its escaped literal
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.clause.len());
        let mut values = self.values.iter();
        for c in self.clause.chars() {
            if c == '?' {
                // new() guarantees one value per placeholder
                if let Some(value) = values.next() {
                    out.push_str(&escape_literal(value));
                }
            } else {
                out.push(c);
            }
        }
        out
    }
}
