//! Marlin protocol dialect
//!
//! Covers stock Marlin and its derivatives (Prusa firmware, Klipper's
//! compatible console): `ok` acknowledgements, `Resend:` recovery,
//! `Error:`/`busy:` reports, `T:cur /tgt B:cur /tgt` temperature
//! blocks, and XOR-checksum line framing.

use super::{FirmwareDialect, FirmwareResponse, TemperatureReport};

/// Marlin-family firmware dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct MarlinDialect;

impl MarlinDialect {
    pub fn new() -> Self {
        Self
    }
}

impl FirmwareDialect for MarlinDialect {
    fn name(&self) -> &str {
        "marlin"
    }

    fn parse_response(&self, line: &str) -> FirmwareResponse {
        let line = line.trim();

        if line == "start" {
            return FirmwareResponse::Start;
        }

        if line == "ok" {
            return FirmwareResponse::Ok { temperatures: None };
        }
        if let Some(rest) = line.strip_prefix("ok ") {
            // "ok T:201.3 /210.0 B:58.1 /60.0" or advanced-ok "ok N12 P15 B3"
            return FirmwareResponse::Ok {
                temperatures: parse_temperature_report(rest),
            };
        }

        if let Some(rest) = line.strip_prefix("Resend:").or_else(|| line.strip_prefix("rs ")) {
            return match rest.trim().parse::<u32>() {
                Ok(line_number) => FirmwareResponse::Resend { line_number },
                Err(_) => FirmwareResponse::Unrecognized {
                    line: line.to_string(),
                },
            };
        }

        if let Some(message) = line.strip_prefix("Error:").or_else(|| line.strip_prefix("error:")) {
            return FirmwareResponse::Error {
                message: message.trim().to_string(),
            };
        }

        if let Some(detail) = line.strip_prefix("busy:") {
            return FirmwareResponse::Busy {
                detail: detail.trim().to_string(),
            };
        }

        // Idle keepalive from firmwares built with NO_TIMEOUTS
        if line == "wait" {
            return FirmwareResponse::Info {
                message: line.to_string(),
            };
        }

        if line.starts_with("echo:") || line.starts_with("Cap:") || line.starts_with("FIRMWARE_NAME")
        {
            return FirmwareResponse::Info {
                message: line.to_string(),
            };
        }

        // Autoreport temperature lines arrive without an ok prefix
        if line.starts_with("T:") {
            if let Some(report) = parse_temperature_report(line) {
                return FirmwareResponse::Temperature(report);
            }
        }

        FirmwareResponse::Unrecognized {
            line: line.to_string(),
        }
    }

    fn frame_line(&self, line_number: u32, command: &str) -> String {
        let numbered = format!("N{} {}", line_number, command);
        format!("{}*{}", numbered, checksum(&numbered))
    }

    fn line_number_reset(&self) -> &str {
        "M110 N0"
    }

    fn temperature_query(&self) -> &str {
        "M105"
    }
}

/// RepRap line checksum: XOR of every byte before the `*`
pub fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0, |acc, byte| acc ^ byte)
}

/// Parse a Marlin temperature block.
///
/// Returns `None` when the text carries no hotend reading, which is how
/// advanced-ok suffixes (`N12 P15 B3`) fall through.
fn parse_temperature_report(text: &str) -> Option<TemperatureReport> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let (hotend_current, hotend_target) = parse_reading(&tokens, &["T:", "T0:"])?;
    let (bed_current, bed_target) = match parse_reading(&tokens, &["B:"]) {
        Some((current, target)) => (Some(current), target),
        None => (None, None),
    };
    Some(TemperatureReport {
        hotend_current,
        hotend_target,
        bed_current,
        bed_target,
    })
}

/// Find `P:cur`, `P:cur/tgt`, or `P:cur /tgt` among the tokens
fn parse_reading(tokens: &[&str], prefixes: &[&str]) -> Option<(f64, Option<f64>)> {
    for (i, token) in tokens.iter().enumerate() {
        for prefix in prefixes {
            let Some(rest) = token.strip_prefix(prefix) else {
                continue;
            };
            if let Some((current, target)) = rest.split_once('/') {
                return Some((current.parse().ok()?, target.parse().ok()));
            }
            let current = rest.parse().ok()?;
            let target = tokens
                .get(i + 1)
                .and_then(|next| next.strip_prefix('/'))
                .and_then(|t| t.parse().ok());
            return Some((current, target));
        }
    }
    None
}
