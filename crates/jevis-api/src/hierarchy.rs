//! Class inheritance walks shared by the data source implementations.

use std::collections::HashSet;

use crate::model::JevisClass;

/// Names of `root` and every class that transitively inherits from it.
///
/// `root` comes first; the rest follow in breadth-first order.
pub fn with_subclasses(root: &str, classes: &[JevisClass]) -> Vec<String> {
    let mut found = vec![root.to_string()];
    let mut seen: HashSet<&str> = HashSet::from([root]);
    let mut cursor = 0;

    while cursor < found.len() {
        let current = found[cursor].clone();
        cursor += 1;
        for class in classes {
            if class.inherits.as_deref() == Some(current.as_str()) && seen.insert(&class.name) {
                found.push(class.name.clone());
            }
        }
    }

    found
}

/// Names of `class` and all of its ancestors, nearest first.
///
/// Stops on unknown parents and on inheritance cycles.
pub fn with_ancestors(class: &str, classes: &[JevisClass]) -> Vec<String> {
    let mut chain = vec![class.to_string()];
    let mut current = class;

    while let Some(parent) = classes
        .iter()
        .find(|c| c.name == current)
        .and_then(|c| c.inherits.as_deref())
    {
        if chain.iter().any(|name| name == parent) {
            break;
        }
        chain.push(parent.to_string());
        current = parent;
    }

    chain
}
