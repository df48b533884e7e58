use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use streamfeed_session::ExchangeReport;

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
struct RecordOutput {
    index: u64,
    size: usize,
    record: serde_json::Value,
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    requests_sent: u64,
    bytes_sent: u64,
    responses_received: u64,
    responses_persisted: u64,
    status_code: Option<i32>,
    status_message: Option<&'a str>,
}

/// Prints replayed records one at a time; table output is emitted on `finish`.
pub struct RecordPrinter {
    format: OutputFormat,
    table: Option<Table>,
}

impl RecordPrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = matches!(format, OutputFormat::Table).then(|| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "SIZE", "RECORD"]);
            table
        });
        Self { format, table }
    }

    pub fn print(&mut self, index: u64, payload: &[u8]) {
        match self.format {
            OutputFormat::Json => {
                let out = RecordOutput {
                    index,
                    size: payload.len(),
                    record: record_value(payload),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(vec![
                        index.to_string(),
                        payload.len().to_string(),
                        payload_preview(payload),
                    ]);
                }
            }
            OutputFormat::Pretty => {
                println!(
                    "record={} size={} payload={}",
                    index,
                    payload.len(),
                    payload_preview(payload)
                );
            }
            OutputFormat::Raw => {
                let mut out = std::io::stdout();
                let _ = out.write_all(payload);
                let _ = out.write_all(b"\n");
                let _ = out.flush();
            }
        }
    }

    pub fn finish(self) {
        if let Some(table) = self.table {
            println!("{table}");
        }
    }
}

pub fn print_report(report: &ExchangeReport, format: OutputFormat) {
    let status = report.final_status.as_ref();
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            let out = ReportOutput {
                requests_sent: report.requests_sent,
                bytes_sent: report.bytes_sent,
                responses_received: report.responses_received,
                responses_persisted: report.responses_persisted,
                status_code: status.map(|s| s.code),
                status_message: status.map(|s| s.message.as_str()),
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
                .set_header(vec!["SENT", "BYTES", "RECEIVED", "PERSISTED", "STATUS"])
                .add_row(vec![
                    report.requests_sent.to_string(),
                    report.bytes_sent.to_string(),
                    report.responses_received.to_string(),
                    report.responses_persisted.to_string(),
                    status.map_or_else(|| "-".to_string(), |s| s.code.to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent={} bytes={} received={} persisted={} status={}",
                report.requests_sent,
                report.bytes_sent,
                report.responses_received,
                report.responses_persisted,
                status.map_or_else(|| "-".to_string(), |s| s.code.to_string()),
            );
        }
    }
}

fn record_value(payload: &[u8]) -> serde_json::Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| serde_json::Value::String(payload_preview(payload)))
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
