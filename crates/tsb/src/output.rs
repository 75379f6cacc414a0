use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tsb_frame::{hex, Frame, TypeRegistry};
use tsb_line::Notification;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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
struct FrameOutput<'a> {
    source: &'a str,
    channel: String,
    channel_hex: String,
    frame_type: String,
    type_code: u8,
    type_label: Option<&'a str>,
    payload_size: usize,
    payload_hex: String,
    payload_text: Option<&'a str>,
    timestamp_ms: u128,
}

impl<'a> FrameOutput<'a> {
    fn new(frame: &'a Frame, source: &'a str, types: &'a TypeRegistry) -> Self {
        Self {
            source,
            channel: frame.channel.to_string(),
            channel_hex: hex::encode(&frame.channel.to_bytes(), ""),
            frame_type: frame.frame_type.to_string(),
            type_code: frame.type_code(),
            type_label: types.label(frame.type_code()),
            payload_size: frame.payload.len(),
            payload_hex: hex::encode(&frame.payload, " "),
            payload_text: printable(&frame.payload),
            timestamp_ms: now_unix_millis(),
        }
    }
}

/// Print one frame; `source` names where it came from (peer, anchor).
pub fn print_frame(frame: &Frame, source: &str, types: &TypeRegistry, format: OutputFormat) {
    let out = FrameOutput::new(frame, source, types);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SOURCE", "CHANNEL", "TYPE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    out.source.to_string(),
                    out.channel.clone(),
                    types.describe(out.type_code),
                    out.payload_size.to_string(),
                    payload_preview(&frame.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "source={} channel={} type={} size={} payload={}",
                out.source,
                out.channel,
                types.describe(out.type_code),
                out.payload_size,
                payload_preview(&frame.payload)
            );
        }
        OutputFormat::Raw => print_raw(&frame.payload),
    }
}

#[derive(Serialize)]
struct NotificationOutput<'a> {
    kind: &'static str,
    anchor: Option<u8>,
    message: String,
    timestamp_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame: Option<FrameOutput<'a>>,
}

pub fn print_notification(note: &Notification, types: &TypeRegistry, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = match note {
                Notification::AnchorLog {
                    anchor,
                    text,
                    at_ms,
                } => NotificationOutput {
                    kind: "anchor_log",
                    anchor: Some(*anchor),
                    message: text.clone(),
                    timestamp_ms: *at_ms,
                    frame: None,
                },
                Notification::Unexpected { frame, at_ms, .. } => NotificationOutput {
                    kind: "unexpected",
                    anchor: None,
                    message: note.to_string(),
                    timestamp_ms: *at_ms,
                    frame: Some(FrameOutput::new(frame, "line", types)),
                },
            };
            print_json(&out);
        }
        OutputFormat::Table | OutputFormat::Pretty | OutputFormat::Raw => println!("{note}"),
    }
}

#[derive(Serialize)]
struct TypeOutput<'a> {
    code: u8,
    hex: String,
    label: &'a str,
}

pub fn print_types(types: &TypeRegistry, format: OutputFormat) {
    let rows: Vec<TypeOutput<'_>> = types
        .iter()
        .map(|(code, label)| TypeOutput {
            code,
            hex: format!("0x{code:02X}"),
            label,
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CODE", "LABEL"]);
            for row in &rows {
                table.add_row(vec![row.hex.clone(), row.label.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for row in &rows {
                println!("{} {}", row.hex, row.label);
            }
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn printable(payload: &[u8]) -> Option<&str> {
    std::str::from_utf8(payload)
        .ok()
        .filter(|text| !text.chars().any(|c| c.is_control() && c != '\n' && c != '\t'))
}

fn payload_preview(payload: &[u8]) -> String {
    match printable(payload) {
        Some(text) => text.to_string(),
        None => hex::encode(payload, " "),
    }
}

fn now_unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_payloads_preview_as_hex() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0x04, 0x0e, 0xff]), "04 0e ff");
    }

    #[test]
    fn frame_output_carries_registry_label() {
        let frame = Frame::hci("3.4".parse().unwrap(), &b"\x01\x09\x10\x00"[..]);
        let types = TypeRegistry::default();
        let out = FrameOutput::new(&frame, "peer", &types);
        assert_eq!(out.channel, "3.4");
        assert_eq!(out.channel_hex, "8304");
        assert_eq!(out.type_label, Some("hci"));
        assert_eq!(out.payload_hex, "01 09 10 00");
        assert_eq!(out.payload_text, None);
    }
}
