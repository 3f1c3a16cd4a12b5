use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use scservo_frame::{FrameError, Packet};
use scservo_transport::PortInfo;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

/// Print one flat record: a JSON object, a two-column table or `key=value` pairs.
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) {
    let value = serde_json::to_value(record).unwrap_or(Value::Null);
    match format {
        OutputFormat::Json => println!("{value}"),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (key, field) in fields(&value) {
                table.add_row(vec![key, field]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = fields(&value)
                .into_iter()
                .map(|(key, field)| format!("{key}={field}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
    }
}

fn fields(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), scalar(v)))
            .collect(),
        other => vec![("value".to_string(), scalar(other))],
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    #[derive(Serialize)]
    struct PortOutput<'a> {
        name: &'a str,
        kind: &'a str,
        product: Option<&'a str>,
    }

    let rows: Vec<PortOutput<'_>> = ports
        .iter()
        .map(|p| PortOutput {
            name: &p.name,
            kind: p.kind,
            product: p.product.as_deref(),
        })
        .collect();

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
        ),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "KIND", "PRODUCT"]);
            for row in &rows {
                table.add_row(vec![row.name, row.kind, row.product.unwrap_or("-")]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if rows.is_empty() {
                println!("no serial ports found");
            }
            for row in &rows {
                match row.product {
                    Some(product) => println!("{} ({}, {product})", row.name, row.kind),
                    None => println!("{} ({})", row.name, row.kind),
                }
            }
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct PacketOutput {
    pub kind: &'static str,
    pub id: Option<u8>,
    pub command: Option<&'static str>,
    pub params: Option<String>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl PacketOutput {
    pub fn new(outcome: &Result<Packet, FrameError>) -> Self {
        let timestamp = now_unix_millis();
        match outcome {
            Ok(Packet::Echo { id, command }) => Self {
                kind: "command",
                id: Some(*id),
                command: Some(command.name()),
                params: None,
                error: None,
                timestamp,
            },
            Ok(Packet::Response {
                id,
                command,
                params,
            }) => Self {
                kind: "response",
                id: Some(*id),
                command: Some(command.name()),
                params: Some(hex(params)),
                error: None,
                timestamp,
            },
            Err(err) => Self {
                kind: "error",
                id: None,
                command: None,
                params: None,
                error: Some(err.to_string()),
                timestamp,
            },
        }
    }
}

pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use scservo_frame::Command;

    use super::*;

    #[test]
    fn hex_is_spaced_uppercase() {
        assert_eq!(hex(&[0x02, 0x00, 0xAB]), "02 00 AB");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn record_fields_skip_nulls() {
        let value = serde_json::json!({"id": 1, "time_ms": null, "state": "on"});
        let got = fields(&value);
        assert_eq!(
            got,
            vec![
                ("id".to_string(), "1".to_string()),
                ("state".to_string(), "on".to_string()),
            ]
        );
    }

    #[test]
    fn packet_output_describes_each_outcome() {
        let response = PacketOutput::new(&Ok(Packet::Response {
            id: 3,
            command: Command::Response,
            params: Bytes::from_static(&[0x01, 0xF4]),
        }));
        assert_eq!(response.kind, "response");
        assert_eq!(response.params.as_deref(), Some("01 F4"));

        let echo = PacketOutput::new(&Ok(Packet::Echo {
            id: 3,
            command: Command::Read,
        }));
        assert_eq!(echo.kind, "command");
        assert_eq!(echo.command, Some("READ"));

        let err = PacketOutput::new(&Err(FrameError::InvalidLength(1)));
        assert_eq!(err.kind, "error");
        assert!(err.error.is_some());
    }
}
