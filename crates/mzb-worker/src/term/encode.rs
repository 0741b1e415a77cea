//! Canonical wire text for terms.
//!
//! Text is written without any escaping. Only metric name components are
//! escaped (see [`escape_metric_component`]); the node accepts the payloads
//! produced this way and widening the escaping would change what it receives.

use std::fmt::{self, Display, Write};

use super::Value;

/// Render a value as wire text.
pub fn encode(value: &Value) -> String {
    value.to_string()
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("undefined"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write_float(f, *x),
            Value::Text(s) => write!(f, "\"{s}\""),
            Value::Symbol(s) => write!(f, "'{s}'"),
            Value::Sequence(items) => {
                f.write_char('[')?;
                write_separated(f, items)?;
                f.write_char(']')
            }
            Value::Pair(items) => {
                f.write_char('{')?;
                write_separated(f, items)?;
                f.write_char('}')
            }
            Value::Mapping(mapping) => {
                f.write_str("#{")?;
                for (i, (k, v)) in mapping.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}=>{v}")?;
                }
                f.write_char('}')
            }
        }
    }
}

fn write_separated(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        Display::fmt(item, f)?;
    }
    Ok(())
}

/// Shortest round-trip digits; the mantissa always carries a `.` so the
/// node parses it as a float (`1.0e-7`, never `1e-7`).
fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    // No float literal exists for these; the node reads `inf` and `nan` as
    // atoms, and `-inf` does not parse there at all.
    if x.is_nan() {
        return f.write_str("nan");
    }
    if x.is_infinite() {
        return f.write_str(if x > 0.0 { "inf" } else { "-inf" });
    }

    let repr = format!("{x:?}");
    match repr.split_once('e') {
        Some((mantissa, exp)) if !mantissa.contains('.') => write!(f, "{mantissa}.0e{exp}"),
        _ => f.write_str(&repr),
    }
}

/// Escape one component of a metric name: `\` → `\\`, `"` → `\"`.
pub fn escape_metric_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}
