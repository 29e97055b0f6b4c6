use serde_json::Value;

/// Print the headline figure of a command's output.
///
/// Single-fund commands print their statistic; record sets print one line
/// per record (`id weight` for portfolios); anything else falls back to
/// the first field.
pub fn print_minimal(value: &Value) {
    let body = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = ["correlation", "period_return", "macro_score"];

    match body {
        Value::Object(map) => {
            for key in &priority_keys {
                if let Some(val) = map.get(*key) {
                    if !val.is_null() {
                        println!("{}", format_minimal(val));
                        return;
                    }
                }
            }
            if let Some(Value::Array(rows)) = map.get("portfolios") {
                print_rows(rows);
                return;
            }
            if let Some((key, val)) = map.iter().next() {
                println!("{}: {}", key, format_minimal(val));
            }
        }
        Value::Array(rows) => print_rows(rows),
        other => println!("{}", format_minimal(other)),
    }
}

fn print_rows(rows: &[Value]) {
    for row in rows {
        let id = row
            .get("asset_id")
            .or_else(|| row.get("asset_class"))
            .map(format_minimal)
            .unwrap_or_default();
        match row.get("weight") {
            Some(w) => println!("{} {}", id, format_minimal(w)),
            None => println!("{}", id),
        }
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
