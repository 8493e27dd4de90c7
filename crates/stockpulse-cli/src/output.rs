use serde_json::{json, Map, Value};

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let document = json!({ "data": result.data, "warnings": result.warnings });
            let payload = if pretty {
                serde_json::to_string_pretty(&document)?
            } else {
                serde_json::to_string(&document)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => {
            print!("{}", render_table(&result.data));
            for warning in &result.warnings {
                println!("warning: {warning}");
            }
        }
    }

    Ok(())
}

fn render_table(data: &Value) -> String {
    match data {
        Value::Array(rows) => rows_table(rows),
        Value::Object(fields) => fields_table(fields),
        other => format!("{}\n", cell(other)),
    }
}

/// Key/value lines; nested row lists are printed as tables below their key.
fn fields_table(fields: &Map<String, Value>) -> String {
    let mut scalars = Vec::new();
    let mut nested = Vec::new();
    for (key, value) in fields {
        match value {
            Value::Array(rows) if rows.iter().any(Value::is_object) => nested.push((key, rows)),
            _ => scalars.push((key, value)),
        }
    }

    let width = scalars.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (key, value) in scalars {
        out.push_str(&format!("{key:<width$} : {}\n", cell(value)));
    }
    for (key, rows) in nested {
        out.push_str(&format!("\n{key}:\n{}", rows_table(rows)));
    }
    out
}

fn rows_table(rows: &[Value]) -> String {
    if rows.is_empty() {
        return String::from("(no rows)\n");
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(fields) = row {
            for key in fields.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }
    }
    if columns.is_empty() {
        return rows.iter().map(|row| format!("{}\n", cell(row))).collect();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(column).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .map(|line| line[index].len())
                .chain([column.len()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    push_line(&mut out, columns.iter().map(|column| column.to_string()), &widths);
    push_line(&mut out, widths.iter().map(|width| "-".repeat(*width)), &widths);
    for line in cells {
        push_line(&mut out, line.into_iter(), &widths);
    }
    out
}

fn push_line(out: &mut String, values: impl Iterator<Item = String>, widths: &[usize]) {
    let line: Vec<String> = values
        .zip(widths)
        .map(|(value, width)| format!("{value:<width$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::from("-"),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
