//! Lenient decoding of model-written dimension plans.
//!
//! Model replies are untrusted text. Decoding runs a fixed repair pipeline
//! before parsing:
//!
//! 1. strip markdown code fences
//! 2. cut the outermost `{ ... }` block out of surrounding prose
//! 3. outside of double-quoted strings: rewrite single-quoted strings,
//!    quote bare keys, drop trailing commas, lowercase `True`/`False` and
//!    map `None` to `null`
//! 4. parse, then validate against the plan schema

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use qa_core::{Dimension, DimensionPlan, PlanOrigin};

/// Why a model reply could not be decoded into a plan.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    /// The reply contains no `{ ... }` block.
    #[error("no structured block in model reply")]
    NoStructuredBlock,

    /// The repaired block is still not valid JSON.
    #[error("malformed structured block: {0}")]
    Syntax(String),

    /// Missing fields, wrong types or an unknown dimension.
    #[error("plan schema violation: {0}")]
    Schema(String),

    /// Confidence outside `[0, 1]`.
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    needs_additional_search: bool,
    missing_dimensions: Vec<Dimension>,
    confidence: f64,
    reasoning: String,
}

/// Decode a model reply into a validated plan.
pub fn decode_plan(reply: &str) -> Result<DimensionPlan, DecodeError> {
    let repaired = repair_json(reply)?;

    let value: Value =
        serde_json::from_str(&repaired).map_err(|e| DecodeError::Syntax(e.to_string()))?;
    let raw: RawPlan =
        serde_json::from_value(value).map_err(|e| DecodeError::Schema(e.to_string()))?;

    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(DecodeError::ConfidenceOutOfRange(raw.confidence));
    }

    let mut missing_dimensions: Vec<Dimension> = Vec::with_capacity(raw.missing_dimensions.len());
    for dimension in raw.missing_dimensions {
        if !missing_dimensions.contains(&dimension) {
            missing_dimensions.push(dimension);
        }
    }

    Ok(DimensionPlan {
        needs_additional_search: raw.needs_additional_search,
        missing_dimensions,
        confidence: raw.confidence as f32,
        reasoning: raw.reasoning,
        origin: PlanOrigin::Model,
    })
}

/// Run the repair steps, returning text that should parse as JSON.
pub fn repair_json(reply: &str) -> Result<String, DecodeError> {
    let unfenced = strip_fences(reply);
    let block = outer_block(unfenced).ok_or(DecodeError::NoStructuredBlock)?;
    Ok(normalize(block))
}

fn strip_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    // Skip a language tag such as ```json
    let body = match after.find('\n') {
        Some(nl) if !after[..nl].contains('{') => &after[nl + 1..],
        _ => after,
    };
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

fn outer_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn normalize(block: &str) -> String {
    let chars: Vec<char> = block.chars().collect();
    let mut out = String::with_capacity(block.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let end = string_end(&chars, i, '"');
                out.extend(&chars[i..end]);
                i = end;
            }
            '\'' => {
                let end = string_end(&chars, i, '\'');
                let inner_end = if end > i + 1 && chars[end - 1] == '\'' {
                    end - 1
                } else {
                    end
                };
                out.push('"');
                let mut j = i + 1;
                while j < inner_end {
                    match chars[j] {
                        '\\' if j + 1 < inner_end && chars[j + 1] == '\'' => {
                            out.push('\'');
                            j += 1;
                        }
                        '\\' if j + 1 < inner_end => {
                            out.push('\\');
                            out.push(chars[j + 1]);
                            j += 1;
                        }
                        '"' => out.push_str("\\\""),
                        other => out.push(other),
                    }
                    j += 1;
                }
                out.push('"');
                i = end;
            }
            ',' => {
                if !matches!(next_significant(&chars, i + 1), Some('}') | Some(']')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = i;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let word: String = chars[i..end].iter().collect();
                if next_significant(&chars, end) == Some(':') {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(match word.as_str() {
                        "True" | "TRUE" => "true",
                        "False" | "FALSE" => "false",
                        "None" | "Null" | "NULL" => "null",
                        other => other,
                    });
                }
                i = end;
            }
            c if c.is_ascii_digit() || c == '-' => {
                // Keep numbers like 1e-3 intact
                let mut end = i + 1;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric() || matches!(chars[end], '.' | '+' | '-'))
                {
                    end += 1;
                }
                out.extend(&chars[i..end]);
                i = end;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    out
}

/// Index just past the string opened at `start`, honoring backslash escapes.
fn string_end(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}
