//! Edge payloads.
//!
//! Values moving along edges are plain JSON values. Concrete node libraries
//! are free to encode richer payloads (tensors, handles) on top of that.

pub use serde_json::Value;

/// Describe the shape of a value for display on an edge label.
///
/// Scalars report their type name. Rectangular nested arrays report their
/// dimensions (`[2, 3]`); ragged or mixed arrays report only their length.
pub fn shape_label(value: &Value) -> String {
    match value {
        Value::Null => "none".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "float".to_string(),
        Value::Number(_) => "int".to_string(),
        Value::String(_) => "str".to_string(),
        Value::Array(items) => match dimensions(value) {
            Some(dims) => format!(
                "[{}]",
                dims.iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            None => format!("list[{}]", items.len()),
        },
        Value::Object(map) => format!("dict{{{}}}", map.len()),
    }
}

fn dimensions(value: &Value) -> Option<Vec<usize>> {
    let Value::Array(items) = value else {
        return Some(Vec::new());
    };
    let mut inner: Option<Vec<usize>> = None;
    for item in items {
        if item.is_object() {
            return None;
        }
        let dims = dimensions(item)?;
        match &inner {
            Some(expected) if *expected != dims => return None,
            Some(_) => {}
            None => inner = Some(dims),
        }
    }
    let mut dims = vec![items.len()];
    dims.extend(inner.unwrap_or_default());
    Some(dims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_labels() {
        assert_eq!(shape_label(&json!(null)), "none");
        assert_eq!(shape_label(&json!(true)), "bool");
        assert_eq!(shape_label(&json!(42)), "int");
        assert_eq!(shape_label(&json!(4.5)), "float");
        assert_eq!(shape_label(&json!("hi")), "str");
        assert_eq!(shape_label(&json!({"a": 1, "b": 2})), "dict{2}");
    }

    #[test]
    fn rectangular_arrays_report_dimensions() {
        assert_eq!(shape_label(&json!([1, 2, 3])), "[3]");
        assert_eq!(shape_label(&json!([[1, 2, 3], [4, 5, 6]])), "[2, 3]");
        assert_eq!(shape_label(&json!([])), "[0]");
    }

    #[test]
    fn ragged_arrays_report_length() {
        assert_eq!(shape_label(&json!([[1], [2, 3]])), "list[2]");
        assert_eq!(shape_label(&json!([1, {"a": 1}])), "list[2]");
    }
}
