//! Movement parsing and position tracking
//!
//! Extracts machine position and extruder state from G-code movement
//! lines and folds them into a running [`PrinterMove`]. Parsing is
//! fail-soft: a line that is not a recognized movement, or that carries a
//! malformed parameter, leaves the position untouched.

use printkit_core::{PartialMove, PositioningMode, PrinterMove};
use regex::Regex;

/// Remove a `;` comment from a G-code line
pub fn strip_comment(line: &str) -> &str {
    static COMMENT_REGEX: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let regex = COMMENT_REGEX.get_or_init(|| Regex::new(r";.*").expect("invalid regex pattern"));
    match regex.find(line) {
        Some(m) => &line[..m.start()],
        None => line,
    }
}

/// Check whether a line is a recognized movement command (G0/G1)
pub fn is_movement_line(line: &str) -> bool {
    movement_code(strip_comment(line).trim()).is_some()
}

/// Extract the G-number if the line starts with a movement command.
///
/// Accepts zero-padded forms (`G01`) and compact lines without spaces
/// between words (`G1X10`).
fn movement_code(cleaned: &str) -> Option<u32> {
    let rest = cleaned
        .strip_prefix('G')
        .or_else(|| cleaned.strip_prefix('g'))?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    match digits.parse::<u32>() {
        Ok(code @ (0 | 1)) => Some(code),
        _ => None,
    }
}

/// Split a cleaned line into G-code words.
///
/// Words may be separated by whitespace or packed together; a new word
/// starts at every letter. `"G1 X10Y5"` yields `G1`, `X10`, `Y5`.
fn words(cleaned: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for token in cleaned.split_whitespace() {
        let mut start = 0;
        for (i, c) in token.char_indices() {
            if c.is_ascii_alphabetic() && i > start {
                out.push(&token[start..i]);
                start = i;
            }
        }
        out.push(&token[start..]);
    }
    out
}

/// Parse the axis words of a movement line.
///
/// Returns `None` for non-movement lines and for movement lines with a
/// malformed numeric parameter (fail-soft: the whole line is treated as
/// non-movement rather than applying a partial update).
pub fn parse_partial(line: &str) -> Option<PartialMove> {
    let cleaned = strip_comment(line);
    let trimmed = cleaned.trim();
    movement_code(trimmed)?;

    let mut partial = PartialMove::new();
    for word in words(trimmed).iter().skip(1) {
        let mut chars = word.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let value = chars.as_str();
        let slot = match letter {
            'X' => &mut partial.x,
            'Y' => &mut partial.y,
            'Z' => &mut partial.z,
            'E' => &mut partial.e,
            'F' => &mut partial.f,
            _ => continue,
        };
        match value.parse::<f64>() {
            Ok(v) => *slot = Some(v),
            Err(_) => return None,
        }
    }
    Some(partial)
}

/// Fold one G-code line into the previous machine state.
///
/// Recognizes G0/G1 movement commands, extracts any of X/Y/Z/E/F present,
/// and returns a new [`PrinterMove`] where unspecified axes copy
/// `previous`. Non-movement lines (and malformed movement lines) return
/// `previous` unchanged.
pub fn parse_move(line: &str, previous: &PrinterMove, mode: PositioningMode) -> PrinterMove {
    match parse_partial(line) {
        Some(partial) => partial.apply_to(previous, mode),
        None => *previous,
    }
}
