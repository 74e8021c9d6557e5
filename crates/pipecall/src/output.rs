use std::io::{IsTerminal, Write};
use std::time::Duration;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pipecall::peer::RawValue;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    method: &'a str,
    elapsed_ms: u128,
    payload: &'a RawValue,
}

pub fn print_response(method: &str, payload: &RawValue, elapsed: Duration, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                method,
                elapsed_ms: elapsed.as_millis(),
                payload,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in table_rows(payload) {
                table.add_row(vec![field, value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let pretty = serde_json::from_str::<Value>(payload.get())
                .and_then(|value| serde_json::to_string_pretty(&value))
                .unwrap_or_else(|_| payload.get().to_string());
            println!("{method} ({} ms):\n{pretty}", elapsed.as_millis());
        }
        OutputFormat::Raw => {
            print_raw(payload.get().as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

/// Object payloads become one row per field; anything else is a single row.
fn table_rows(payload: &RawValue) -> Vec<(String, String)> {
    match serde_json::from_str::<Value>(payload.get()) {
        Ok(Value::Object(fields)) => fields
            .into_iter()
            .map(|(key, value)| (key, cell(&value)))
            .collect(),
        Ok(other) => vec![("value".to_string(), cell(&other))],
        Err(_) => vec![("value".to_string(), payload.get().to_string())],
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
