//! Text rendering of command responses.

use serde_json::Value;
use sudo_rules::dispatch::CommandResponse;
use sudo_rules::schema::RuleSchema;

/// Record keys in display order, with the schema field supplying the label.
const RECORD_FIELDS: [(&str, &str); 6] = [
    ("name", "cn"),
    ("description", "description"),
    ("enabled", "ipaEnabledFlag"),
    ("user_category", "userCategory"),
    ("host_category", "hostCategory"),
    ("cmd_category", "cmdCategory"),
];

/// Render a response the way the command line shows it.
pub fn render(schema: &RuleSchema, response: &CommandResponse) -> String {
    let mut out = String::new();

    match &response.result {
        Value::Array(records) => {
            if let Some(summary) = &response.summary {
                push_dashed(&mut out, summary);
            }
            for (index, record) in records.iter().enumerate() {
                if index > 0 {
                    out.push('\n');
                }
                render_record(schema, record, &mut out);
            }
            if response.truncated == Some(true) {
                out.push_str("Search result has been truncated\n");
            }
            if let Some(count) = response.count {
                out.push_str(&"-".repeat(30));
                out.push('\n');
                out.push_str(&format!("Number of entries returned {count}\n"));
                out.push_str(&"-".repeat(30));
                out.push('\n');
            }
        }
        Value::Object(_) => {
            if let Some(summary) = &response.summary {
                push_dashed(&mut out, summary);
            }
            render_record(schema, &response.result, &mut out);
            if !response.failed.is_empty() {
                out.push_str("  Failed members:\n");
                for failure in &response.failed {
                    out.push_str(&format!(
                        "    {} {}: {}\n",
                        failure.kind, failure.identifier, failure.reason
                    ));
                }
            }
        }
        _ => {
            if let Some(summary) = &response.summary {
                push_dashed(&mut out, summary);
            }
        }
    }

    out
}

fn push_dashed(out: &mut String, line: &str) {
    let rule = "-".repeat(line.chars().count());
    out.push_str(&rule);
    out.push('\n');
    out.push_str(line);
    out.push('\n');
    out.push_str(&rule);
    out.push('\n');
}

fn render_record(schema: &RuleSchema, record: &Value, out: &mut String) {
    for (key, field) in RECORD_FIELDS {
        if let Some(value) = record.get(key) {
            out.push_str(&format!("  {}: {}\n", schema.label(field), scalar(value)));
        }
    }

    if let Some(Value::Object(members)) = record.get("members") {
        // Follow the schema's field order rather than the map's.
        for field in &schema.fields {
            if let Some(Value::Array(values)) = members.get(&field.name) {
                let joined: Vec<String> = values.iter().map(scalar).collect();
                out.push_str(&format!("  {}: {}\n", field.label, joined.join(", ")));
            }
        }
    }

    if let Some(Value::Array(unresolved)) = record.get("unresolved_members") {
        let joined: Vec<String> = unresolved.iter().map(scalar).collect();
        out.push_str(&format!("  Unresolved members: {}\n", joined.join(", ")));
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}
