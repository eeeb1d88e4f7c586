//! Validation of values the agent wants to write into data cells.
//!
//! Every stored number must be a fully written absolute integer
//! (394328000000, never 394.3 or "394.3B"). Vision models occasionally
//! echo abbreviated site formatting; those writes are refused before they
//! reach the workbook.

/// Parse a proposed cell value into a number, refusing anything that is
/// not a fully written integer.
///
/// Accepted: integer JSON numbers, and strings of digits with optional
/// sign, thousands separators, or accounting parentheses ("(1,234)").
pub fn parse_fully_written(value: &serde_json::Value) -> Result<f64, String> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i as f64);
            }
            if let Some(u) = n.as_u64() {
                return Ok(u as f64);
            }
            Err(format!(
                "value {} is not an integer; write fully written absolute integers (e.g. 394328000000)",
                n
            ))
        }
        serde_json::Value::String(s) => parse_integer_string(s),
        other => Err(format!(
            "value {} is not a number; write fully written absolute integers",
            other
        )),
    }
}

fn parse_integer_string(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty value; leave the cell blank instead of writing an empty string".to_string());
    }

    // Accounting-style negatives: (1,234) means -1234.
    let (body, negative_parens) =
        if trimmed.starts_with('(') && trimmed.ends_with(')') && trimmed.len() > 2 {
            (&trimmed[1..trimmed.len() - 1], true)
        } else {
            (trimmed, false)
        };

    let (body, negative_sign) = match body.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (body, false),
    };

    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return Err(format!(
            "'{}' is not a fully written integer; no decimals or abbreviations like B/M/K are allowed",
            raw
        ));
    }

    let digits: String = body.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(format!("'{}' contains no digits", raw));
    }

    let magnitude: f64 = digits
        .parse()
        .map_err(|_| format!("'{}' could not be parsed as an integer", raw))?;

    Ok(if negative_parens || negative_sign {
        -magnitude
    } else {
        magnitude
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_plain_integers() {
        assert_eq!(parse_fully_written(&json!(394328000000u64)).unwrap(), 394328000000.0);
        assert_eq!(parse_fully_written(&json!(-5000)).unwrap(), -5000.0);
        assert_eq!(parse_fully_written(&json!("394328000000")).unwrap(), 394328000000.0);
    }

    #[test]
    fn test_accepts_separators_and_parentheses() {
        assert_eq!(parse_fully_written(&json!("394,328,000,000")).unwrap(), 394328000000.0);
        assert_eq!(parse_fully_written(&json!("(1,234)")).unwrap(), -1234.0);
        assert_eq!(parse_fully_written(&json!("-12,500")).unwrap(), -12500.0);
    }

    #[test]
    fn test_rejects_abbreviations() {
        assert!(parse_fully_written(&json!("394.3B")).is_err());
        assert!(parse_fully_written(&json!("1.2M")).is_err());
        assert!(parse_fully_written(&json!("500K")).is_err());
        assert!(parse_fully_written(&json!("2.5bn")).is_err());
    }

    #[test]
    fn test_rejects_decimals() {
        assert!(parse_fully_written(&json!(394.3)).is_err());
        assert!(parse_fully_written(&json!("394.3")).is_err());
    }

    #[test]
    fn test_rejects_non_numeric() {
        assert!(parse_fully_written(&json!("n/a")).is_err());
        assert!(parse_fully_written(&json!("")).is_err());
        assert!(parse_fully_written(&json!(null)).is_err());
        assert!(parse_fully_written(&json!(true)).is_err());
    }
}
