use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Int,
    Float,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Int => f.write_str("int"),
            BaseType::Float => f.write_str("float"),
        }
    }
}

/// Declaration-time record for one name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo {
    pub base_type: BaseType,
    pub is_array: bool,
    pub line: usize,
    pub column: usize,
}

/// Carries the first declaration site of the clashing name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("'{name}' is already declared at line {line}, column {column}")]
pub struct RedeclarationError {
    pub name: String,
    pub line: usize,
    pub column: usize,
}

/// Names declared by the parser, in declaration order. Names are unique
/// across scalars and arrays; the single program is the only scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    entries: HashMap<String, SymbolInfo>,
    order: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(
        &mut self,
        name: &str,
        base_type: BaseType,
        is_array: bool,
        line: usize,
        column: usize,
    ) -> Result<(), RedeclarationError> {
        if let Some(existing) = self.entries.get(name) {
            return Err(RedeclarationError {
                name: name.to_string(),
                line: existing.line,
                column: existing.column,
            });
        }
        self.entries.insert(
            name.to_string(),
            SymbolInfo {
                base_type,
                is_array,
                line,
                column,
            },
        );
        self.order.push(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SymbolInfo> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_array(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|info| info.is_array)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SymbolInfo)> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|info| (name.as_str(), info)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_and_looks_up() {
        let mut table = SymbolTable::new();
        table
            .declare("x", BaseType::Int, false, 1, 5)
            .expect("declare should succeed");
        table
            .declare("v", BaseType::Float, true, 2, 9)
            .expect("declare should succeed");

        assert_eq!(
            table.get("x"),
            Some(&SymbolInfo {
                base_type: BaseType::Int,
                is_array: false,
                line: 1,
                column: 5
            })
        );
        assert!(table.is_array("v"));
        assert!(!table.is_array("x"));
        assert!(!table.contains("y"));
    }

    #[test]
    fn rejects_redeclaration_with_first_site() {
        let mut table = SymbolTable::new();
        table
            .declare("x", BaseType::Int, false, 1, 5)
            .expect("declare should succeed");
        let err = table
            .declare("x", BaseType::Float, true, 3, 1)
            .expect_err("expected redeclaration failure");
        assert_eq!(
            err,
            RedeclarationError {
                name: "x".to_string(),
                line: 1,
                column: 5
            }
        );
    }

    #[test]
    fn iterates_in_declaration_order() {
        let mut table = SymbolTable::new();
        for (index, name) in ["c", "a", "b"].into_iter().enumerate() {
            table
                .declare(name, BaseType::Int, false, 1, index + 1)
                .expect("declare should succeed");
        }
        let names: Vec<&str> = table.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
