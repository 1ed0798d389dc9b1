//! Recursive dotted-path flattening of a JSON object.

use serde_json::{Map, Value};

/// Replaces nested objects in `value` with dotted-key paths rooted at `prefix`.
///
/// Arrays are left intact — only object values are recursed into. A non-object
/// leaf value (including arrays) is assigned directly under its full path.
pub fn flatten(value: &Map<String, Value>, prefix: &str) -> Map<String, Value> {
    let mut flat = Map::new();

    for (key, val) in value {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match val.as_object() {
            Some(nested) => {
                let nested_flat = flatten(nested, &full_key);
                flat.extend(nested_flat);
            }
            None => {
                flat.insert(full_key, val.clone());
            }
        }
    }

    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_objects() {
        let input = json!({
            "hello": "world",
            "foo": {
                "bar": {
                    "fizz": "buzz"
                }
            }
        });

        let flat = flatten(input.as_object().unwrap(), "");
        assert_eq!(flat.get("hello"), Some(&json!("world")));
        assert_eq!(flat.get("foo.bar.fizz"), Some(&json!("buzz")));
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn leaves_arrays_intact() {
        let input = json!({"tags": ["a", "b"]});
        let flat = flatten(input.as_object().unwrap(), "");
        assert_eq!(flat.get("tags"), Some(&json!(["a", "b"])));
    }
}
