// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Variable scopes and record slot assignment

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Node,
    Edge,
    Path,
    Value,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    /// Anonymous pattern entities and planner temporaries
    pub hidden: bool,
}

/// Variables bound at one point of a query. A variable's slot is its
/// position, so the scope width is the record width.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: Vec<Variable>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> usize {
        self.vars.len()
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.vars
            .iter()
            .rposition(|v| !v.hidden && v.name == name)
    }

    pub fn kind(&self, slot: usize) -> Option<VarKind> {
        self.vars.get(slot).map(|v| v.kind)
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.vars.get(slot).map(|v| v.name.as_str())
    }

    pub fn is_hidden(&self, slot: usize) -> bool {
        self.vars.get(slot).map(|v| v.hidden).unwrap_or(true)
    }

    /// Bind a new named variable.
    pub fn declare(&mut self, name: &str, kind: VarKind) -> usize {
        self.vars.push(Variable {
            name: name.to_string(),
            kind,
            hidden: false,
        });
        self.vars.len() - 1
    }

    /// Reserve an anonymous slot.
    pub fn hidden(&mut self, kind: VarKind) -> usize {
        let slot = self.vars.len();
        self.vars.push(Variable {
            name: format!("@anon_{}", slot),
            kind,
            hidden: true,
        });
        slot
    }

    /// Visible variable names, sorted; the expansion of `*`
    pub fn visible_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars
            .iter()
            .filter(|v| !v.hidden)
            .map(|v| v.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_and_lookup() {
        let mut scope = Scope::new();
        let a = scope.declare("a", VarKind::Node);
        let anon = scope.hidden(VarKind::Edge);
        let b = scope.declare("b", VarKind::Value);
        assert_eq!((a, anon, b), (0, 1, 2));
        assert_eq!(scope.lookup("b"), Some(2));
        assert_eq!(scope.lookup("@anon_1"), None);
        assert_eq!(scope.kind(0), Some(VarKind::Node));
        assert_eq!(scope.width(), 3);
    }

    #[test]
    fn test_visible_names_sorted() {
        let mut scope = Scope::new();
        scope.declare("z", VarKind::Value);
        scope.hidden(VarKind::Node);
        scope.declare("a", VarKind::Node);
        assert_eq!(scope.visible_names(), vec!["a", "z"]);
        assert!(Scope::new().visible_names().is_empty());
    }
}
