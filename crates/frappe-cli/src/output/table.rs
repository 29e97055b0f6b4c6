use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as tables. Arrays of records become one table each;
/// nested objects are walked with dotted section titles.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            let body = match map.get("result") {
                Some(Value::Object(result)) => result,
                _ => map,
            };
            print_sections("", body);
            print_envelope(map);
        }
        Value::Array(arr) => print_records(arr),
        _ => println!("{}", value),
    }
}

fn print_sections(prefix: &str, map: &Map<String, Value>) {
    let mut builder = Builder::default();
    let mut scalars = 0;
    let mut nested: Vec<(String, &Value)> = Vec::new();

    for (key, val) in map {
        let title = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match val {
            Value::Object(_) => nested.push((title, val)),
            Value::Array(arr) if arr.iter().any(Value::is_object) => nested.push((title, val)),
            _ => {
                if scalars == 0 {
                    builder.push_record(["Field", "Value"]);
                }
                builder.push_record([key.as_str(), &format_value(val)]);
                scalars += 1;
            }
        }
    }

    if scalars > 0 {
        if !prefix.is_empty() {
            println!("\n{prefix}:");
        }
        println!("{}", Table::from(builder));
    }

    for (title, val) in nested {
        match val {
            Value::Object(inner) => print_sections(&title, inner),
            Value::Array(arr) => {
                println!("\n{title}:");
                print_records(arr);
            }
            _ => {}
        }
    }
}

fn print_envelope(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_records(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
