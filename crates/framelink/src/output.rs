use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use framelink_frame::command_name;
use serde::Serialize;

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
struct MessageOutput<'a> {
    command: u8,
    command_name: &'a str,
    payload_size: usize,
    payload: String,
    peer: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct SendOutput<'a> {
    command: u8,
    command_name: &'a str,
    acknowledged: bool,
    peer: &'a str,
}

pub fn print_message(command: u8, payload: &[u8], peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                command,
                command_name: command_name(command),
                payload_size: payload.len(),
                payload: payload_preview(payload),
                peer,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    format_command(command),
                    payload.len().to_string(),
                    peer.to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} size={} peer={} payload={}",
                format_command(command),
                payload.len(),
                peer,
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

pub fn print_send_result(command: u8, acknowledged: bool, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SendOutput {
            command,
            command_name: command_name(command),
            acknowledged,
            peer,
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["COMMAND", "PEER", "RESULT"])
                .add_row(vec![
                    format_command(command),
                    peer.to_string(),
                    result_label(acknowledged).to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} peer={} result={}",
                format_command(command),
                peer,
                result_label(acknowledged)
            );
        }
        // Raw output is reserved for payload bytes.
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn result_label(acknowledged: bool) -> &'static str {
    if acknowledged {
        "delivered"
    } else {
        "sent"
    }
}

fn format_command(command: u8) -> String {
    format!("{command:#04x} ({})", command_name(command))
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
