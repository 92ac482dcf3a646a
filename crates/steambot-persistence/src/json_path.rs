//! Path helpers over a `serde_json::Value` tree: `get_item`, `create_item`,
//! `erase_item`, grounded on `original_source/Headers/JSON.hpp`'s
//! key-sequence traversal (`JSON::getItem`, `createItem`, `eraseItem`).

use serde_json::Value;

/// Traverses `path` from `root`, returning `None` if any segment is absent
/// or not an object.
pub fn get_item<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// Traverses `path` from `root`, creating empty objects for any missing
/// intermediate segment, and returns a mutable reference to the leaf.
pub fn create_item<'a>(root: &'a mut Value, path: &[&str]) -> &'a mut Value {
    let mut current = root;
    for segment in path {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        current = current
            .as_object_mut()
            .expect("just normalized to an object")
            .entry(*segment)
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    current
}

/// Removes the leaf named by `path`, then prunes any now-empty parent
/// object all the way back up to (but not including) `root`. Returns
/// whether anything was removed.
pub fn erase_item(root: &mut Value, path: &[&str]) -> bool {
    fn recurse(node: &mut Value, path: &[&str]) -> bool {
        let [head, rest @ ..] = path else {
            return false;
        };
        let Some(object) = node.as_object_mut() else {
            return false;
        };
        if rest.is_empty() {
            return object.remove(*head).is_some();
        }
        let Some(child) = object.get_mut(*head) else {
            return false;
        };
        let removed = recurse(child, rest);
        if removed && child.as_object().is_some_and(serde_json::Map::is_empty) {
            object.remove(*head);
        }
        removed
    }
    recurse(root, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_item_traverses_nested_objects() {
        let root = json!({"a": {"b": {"c": 7}}});
        assert_eq!(get_item(&root, &["a", "b", "c"]), Some(&json!(7)));
        assert_eq!(get_item(&root, &["a", "x"]), None);
    }

    #[test]
    fn create_item_builds_missing_intermediates() {
        let mut root = json!({});
        *create_item(&mut root, &["a", "b", "c"]) = json!(42);
        assert_eq!(root, json!({"a": {"b": {"c": 42}}}));
    }

    #[test]
    fn erase_item_prunes_empty_parents() {
        let mut root = json!({"a": {"b": {"c": 1}}, "d": 2});
        assert!(erase_item(&mut root, &["a", "b", "c"]));
        assert_eq!(root, json!({"d": 2}));
    }

    #[test]
    fn erase_item_keeps_nonempty_parents() {
        let mut root = json!({"a": {"b": 1, "c": 2}});
        assert!(erase_item(&mut root, &["a", "b"]));
        assert_eq!(root, json!({"a": {"c": 2}}));
    }

    #[test]
    fn erase_item_missing_path_returns_false() {
        let mut root = json!({"a": 1});
        assert!(!erase_item(&mut root, &["z", "y"]));
    }
}
