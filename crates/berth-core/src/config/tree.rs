//! Untyped view of the project configuration for dotted-path lookups.

use toml::{Table, Value};

/// Result of walking a dotted path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a Value),
    NotFound,
}

impl<'a> Lookup<'a> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    /// Render scalar values as strings; tables and arrays yield `None`
    pub fn as_scalar_string(&self) -> Option<String> {
        match self {
            Lookup::Found(Value::String(s)) => Some(s.clone()),
            Lookup::Found(Value::Integer(i)) => Some(i.to_string()),
            Lookup::Found(Value::Float(f)) => Some(f.to_string()),
            Lookup::Found(Value::Boolean(b)) => Some(b.to_string()),
            Lookup::Found(Value::Datetime(d)) => Some(d.to_string()),
            _ => None,
        }
    }
}

/// Project configuration as a hierarchical document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: Table,
}

impl ConfigTree {
    pub fn new(root: Table) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Table {
        &self.root
    }

    /// Walk `a.b.c` into the document. Missing segments are `NotFound`,
    /// never an error.
    pub fn lookup(&self, path: &str) -> Lookup<'_> {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let Some(first) = segments.next() else {
            return Lookup::NotFound;
        };
        let Some(mut current) = self.root.get(first) else {
            return Lookup::NotFound;
        };
        for segment in segments {
            current = match current {
                Value::Table(table) => match table.get(segment) {
                    Some(v) => v,
                    None => return Lookup::NotFound,
                },
                Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
                    Some(v) => v,
                    None => return Lookup::NotFound,
                },
                _ => return Lookup::NotFound,
            };
        }
        Lookup::Found(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(src: &str) -> ConfigTree {
        ConfigTree::new(toml::from_str::<Table>(src).unwrap())
    }

    #[test]
    fn lookup_nested_scalar() {
        let t = tree(
            r#"
[addons.databases.primary.options]
max_connections = 200
"#,
        );
        let found = t.lookup("addons.databases.primary.options.max_connections");
        assert_eq!(found.as_scalar_string(), Some("200".to_string()));
    }

    #[test]
    fn lookup_missing_is_not_found() {
        let t = tree("[project]\nname = \"shop\"\n");
        assert_eq!(t.lookup("project.domain"), Lookup::NotFound);
        assert_eq!(t.lookup("nothing.here.at.all"), Lookup::NotFound);
        assert_eq!(t.lookup(""), Lookup::NotFound);
    }

    #[test]
    fn lookup_through_scalar_is_not_found() {
        let t = tree("[project]\nname = \"shop\"\n");
        assert_eq!(t.lookup("project.name.first"), Lookup::NotFound);
    }

    #[test]
    fn lookup_array_index() {
        let t = tree("[runner]\nlabels = [\"linux\", \"x64\"]\n");
        assert_eq!(
            t.lookup("runner.labels.1").as_scalar_string(),
            Some("x64".to_string())
        );
    }

    #[test]
    fn tables_are_not_scalars() {
        let t = tree("[project]\nname = \"shop\"\n");
        let found = t.lookup("project");
        assert!(found.is_found());
        assert_eq!(found.as_scalar_string(), None);
    }
}
