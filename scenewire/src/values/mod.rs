use std::fmt::{Display, Write};

use itertools::Itertools;

use crate::schema::{FieldType, Storage};

/// A raw field value failed to parse as its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueError {
    pub field_type: FieldType,
    pub message: String,
}

impl ValueError {
    fn new(field_type: FieldType, message: impl Into<String>) -> ValueError {
        ValueError {
            field_type,
            message: message.into(),
        }
    }
}

impl Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}: {}", self.field_type, self.message))
    }
}

pub type ValueResult<T> = Result<T, ValueError>;

/// A parsed field value, held in the storage class its compressors dispatch
/// on. The field type supplies vector grouping and fixed lengths; the value
/// itself is flat.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Bools(Vec<bool>),
    Int(i32),
    Ints(Vec<i32>),
    Long(i64),
    Longs(Vec<i64>),
    Float(f32),
    Floats(Vec<f32>),
    Double(f64),
    Doubles(Vec<f64>),
    Str(String),
    Strs(Vec<String>),
}

impl FieldValue {
    /// Parse the entire raw text of a field value into the representation
    /// for `field_type`. Surrounding brackets and separating commas are
    /// insignificant, per the classic-encoding value grammar.
    pub fn parse(field_type: FieldType, raw: &str) -> ValueResult<FieldValue> {
        let body = strip_brackets(raw);

        Ok(match field_type.storage() {
            Storage::Bool => FieldValue::Bool(parse_bool(field_type, single(field_type, body)?)?),
            Storage::BoolArray => FieldValue::Bools(
                split_values(body)
                    .map(|tok| parse_bool(field_type, tok))
                    .collect::<ValueResult<_>>()?,
            ),
            Storage::Int => FieldValue::Int(parse_int(field_type, single(field_type, body)?)?),
            Storage::IntArray => {
                let vals = split_values(body)
                    .map(|tok| parse_int(field_type, tok))
                    .collect::<ValueResult<Vec<i32>>>()?;
                check_len(field_type, vals.len())?;
                FieldValue::Ints(vals)
            }
            Storage::Long => FieldValue::Long(parse_long(field_type, single(field_type, body)?)?),
            Storage::LongArray => FieldValue::Longs(
                split_values(body)
                    .map(|tok| parse_long(field_type, tok))
                    .collect::<ValueResult<_>>()?,
            ),
            Storage::Float => {
                FieldValue::Float(parse_float(field_type, single(field_type, body)?)?)
            }
            Storage::FloatArray => {
                let vals = split_values(body)
                    .map(|tok| parse_float(field_type, tok))
                    .collect::<ValueResult<Vec<f32>>>()?;
                check_len(field_type, vals.len())?;
                FieldValue::Floats(vals)
            }
            Storage::Double => {
                FieldValue::Double(parse_double(field_type, single(field_type, body)?)?)
            }
            Storage::DoubleArray => {
                let vals = split_values(body)
                    .map(|tok| parse_double(field_type, tok))
                    .collect::<ValueResult<Vec<f64>>>()?;
                check_len(field_type, vals.len())?;
                FieldValue::Doubles(vals)
            }
            Storage::Str => FieldValue::Str(parse_quoted(field_type, body.trim())?),
            Storage::StrArray => FieldValue::Strs(split_quoted(field_type, body)?),
            Storage::Node | Storage::NodeArray => {
                return Err(ValueError::new(
                    field_type,
                    "node-valued fields carry nodes, not text values",
                ))
            }
        })
    }

    /// Parse a value the front end already split along SF boundaries.
    pub fn parse_list(field_type: FieldType, parts: &[String]) -> ValueResult<FieldValue> {
        match field_type.storage() {
            // pre-split strings arrive without surrounding quotes
            Storage::StrArray => Ok(FieldValue::Strs(parts.to_vec())),
            Storage::Str => Ok(FieldValue::Str(parts.join(" "))),
            _ => Self::parse(field_type, &parts.join(" ")),
        }
    }

    /// An empty value of the storage class for `field_type` (an `[]` in
    /// document text). Scalar types have no empty form.
    pub fn empty(field_type: FieldType) -> Option<FieldValue> {
        Some(match field_type.storage() {
            Storage::BoolArray => FieldValue::Bools(Vec::new()),
            Storage::IntArray => FieldValue::Ints(Vec::new()),
            Storage::LongArray => FieldValue::Longs(Vec::new()),
            Storage::FloatArray if field_type.fixed_len().is_none() => {
                FieldValue::Floats(Vec::new())
            }
            Storage::DoubleArray if field_type.fixed_len().is_none() => {
                FieldValue::Doubles(Vec::new())
            }
            Storage::StrArray => FieldValue::Strs(Vec::new()),
            _ => return None,
        })
    }

    /// Whether two values are equal for the purposes of default elision:
    /// floats within `eps` elementwise, everything else exact.
    pub fn matches_within(&self, other: &FieldValue, eps: f32) -> bool {
        match (self, other) {
            (FieldValue::Float(a), FieldValue::Float(b)) => (a - b).abs() <= eps,
            (FieldValue::Floats(a), FieldValue::Floats(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= eps)
            }
            (FieldValue::Double(a), FieldValue::Double(b)) => (a - b).abs() <= eps as f64,
            (FieldValue::Doubles(a), FieldValue::Doubles(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= eps as f64)
            }
            _ => self == other,
        }
    }

    /// The classic-encoding text form of this value. Multi-valued types are
    /// bracketed; single-valued vector forms are not.
    pub fn to_classic(&self, field_type: FieldType) -> String {
        let body = match self {
            FieldValue::Bool(b) => bool_text(*b).to_string(),
            FieldValue::Bools(vals) => vals.iter().map(|b| bool_text(*b)).join(" "),
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Ints(vals) => vals.iter().join(" "),
            FieldValue::Long(v) => v.to_string(),
            FieldValue::Longs(vals) => vals.iter().join(" "),
            FieldValue::Float(v) => v.to_string(),
            FieldValue::Floats(vals) => vals.iter().join(" "),
            FieldValue::Double(v) => v.to_string(),
            FieldValue::Doubles(vals) => vals.iter().join(" "),
            FieldValue::Str(s) => quote(s),
            FieldValue::Strs(vals) => vals.iter().map(|s| quote(s)).join(" "),
        };

        if field_type.is_multi() {
            let mut out = String::with_capacity(body.len() + 4);
            out.push('[');
            if !body.is_empty() {
                out.push(' ');
                out.push_str(&body);
                out.push(' ');
            }
            out.push(']');
            out
        } else {
            body
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldValue::Bool(_)
            | FieldValue::Int(_)
            | FieldValue::Long(_)
            | FieldValue::Float(_)
            | FieldValue::Double(_)
            | FieldValue::Str(_) => 1,
            FieldValue::Bools(vals) => vals.len(),
            FieldValue::Ints(vals) => vals.len(),
            FieldValue::Longs(vals) => vals.len(),
            FieldValue::Floats(vals) => vals.len(),
            FieldValue::Doubles(vals) => vals.len(),
            FieldValue::Strs(vals) => vals.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn bool_text(b: bool) -> &'static str {
    if b {
        "TRUE"
    } else {
        "FALSE"
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn strip_brackets(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.strip_prefix('['), trimmed.strip_suffix(']')) {
        (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
        _ => trimmed,
    }
}

/// Numeric value tokens are separated by whitespace or commas.
fn split_values(body: &str) -> impl Iterator<Item = &str> {
    body.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|tok| !tok.is_empty())
}

fn single(field_type: FieldType, body: &str) -> ValueResult<&str> {
    let mut toks = split_values(body);
    let tok = toks
        .next()
        .ok_or_else(|| ValueError::new(field_type, "empty value"))?;
    match toks.next() {
        Some(extra) => Err(ValueError::new(
            field_type,
            format!("expected a single value, found trailing '{}'", extra),
        )),
        None => Ok(tok),
    }
}

fn check_len(field_type: FieldType, len: usize) -> ValueResult<()> {
    if let Some(fixed) = field_type.fixed_len() {
        if len != fixed {
            return Err(ValueError::new(
                field_type,
                format!("expected {} components, found {}", fixed, len),
            ));
        }
    } else {
        let span = field_type.span();
        if span > 1 && len % span != 0 {
            return Err(ValueError::new(
                field_type,
                format!("{} values do not group into spans of {}", len, span),
            ));
        }
    }

    Ok(())
}

fn parse_bool(field_type: FieldType, tok: &str) -> ValueResult<bool> {
    match tok {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        other => Err(ValueError::new(
            field_type,
            format!("expected TRUE or FALSE, found '{}'", other),
        )),
    }
}

fn parse_int(field_type: FieldType, tok: &str) -> ValueResult<i32> {
    let result = if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map(|v| v as i32)
    } else {
        tok.parse()
    };
    result.map_err(|_| ValueError::new(field_type, format!("invalid integer '{}'", tok)))
}

fn parse_long(field_type: FieldType, tok: &str) -> ValueResult<i64> {
    let result = if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map(|v| v as i64)
    } else {
        tok.parse()
    };
    result.map_err(|_| ValueError::new(field_type, format!("invalid integer '{}'", tok)))
}

fn parse_float(field_type: FieldType, tok: &str) -> ValueResult<f32> {
    tok.parse()
        .map_err(|_| ValueError::new(field_type, format!("invalid float '{}'", tok)))
}

fn parse_double(field_type: FieldType, tok: &str) -> ValueResult<f64> {
    tok.parse()
        .map_err(|_| ValueError::new(field_type, format!("invalid double '{}'", tok)))
}

/// Parse one quoted string, unescaping `\"` and `\\`. Unquoted text is
/// taken verbatim, which tolerates front ends that strip quotes themselves.
fn parse_quoted(field_type: FieldType, body: &str) -> ValueResult<String> {
    let body = body.trim();
    if !body.starts_with('"') {
        return Ok(body.to_string());
    }

    let (value, rest) = read_quoted(field_type, body)?;
    if !rest.trim().is_empty() {
        return Err(ValueError::new(
            field_type,
            format!("trailing content after string: '{}'", rest.trim()),
        ));
    }
    Ok(value)
}

fn split_quoted(field_type: FieldType, body: &str) -> ValueResult<Vec<String>> {
    let mut values = Vec::new();
    let mut rest = body.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    while !rest.is_empty() {
        let (value, remainder) = read_quoted(field_type, rest)?;
        values.push(value);
        rest = remainder.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    }
    Ok(values)
}

fn read_quoted<'a>(field_type: FieldType, input: &'a str) -> ValueResult<(String, &'a str)> {
    let mut chars = input.char_indices();
    match chars.next() {
        Some((_, '"')) => (),
        _ => {
            return Err(ValueError::new(
                field_type,
                format!("expected quoted string at '{}'", input),
            ))
        }
    }

    let mut value = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            value.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Ok((value, &input[i + c.len_utf8()..]));
        } else {
            value.push(c);
        }
    }

    Err(ValueError::new(field_type, "unterminated string"))
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Bool(b) => f.write_str(bool_text(*b)),
            FieldValue::Bools(vals) => {
                write_joined(f, vals.iter().map(|b| bool_text(*b).to_string()))
            }
            FieldValue::Int(v) => v.fmt(f),
            FieldValue::Ints(vals) => write_joined(f, vals.iter().map(i32::to_string)),
            FieldValue::Long(v) => v.fmt(f),
            FieldValue::Longs(vals) => write_joined(f, vals.iter().map(i64::to_string)),
            FieldValue::Float(v) => v.fmt(f),
            FieldValue::Floats(vals) => write_joined(f, vals.iter().map(f32::to_string)),
            FieldValue::Double(v) => v.fmt(f),
            FieldValue::Doubles(vals) => write_joined(f, vals.iter().map(f64::to_string)),
            FieldValue::Str(s) => f.write_str(&quote(s)),
            FieldValue::Strs(vals) => write_joined(f, vals.iter().map(|s| quote(s))),
        }
    }
}

fn write_joined(
    f: &mut std::fmt::Formatter<'_>,
    mut parts: impl Iterator<Item = String>,
) -> std::fmt::Result {
    if let Some(first) = parts.next() {
        f.write_str(&first)?;
        for part in parts {
            f.write_char(' ')?;
            f.write_str(&part)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(
            FieldValue::parse(FieldType::SFBool, "TRUE").unwrap(),
            FieldValue::Bool(true)
        );
        assert_eq!(
            FieldValue::parse(FieldType::SFInt32, "-17").unwrap(),
            FieldValue::Int(-17)
        );
        assert_eq!(
            FieldValue::parse(FieldType::SFInt32, "0xFF").unwrap(),
            FieldValue::Int(255)
        );
        assert_eq!(
            FieldValue::parse(FieldType::SFFloat, "1.5").unwrap(),
            FieldValue::Float(1.5)
        );
        assert_eq!(
            FieldValue::parse(FieldType::SFTime, "0.25").unwrap(),
            FieldValue::Double(0.25)
        );
    }

    #[test]
    fn test_parse_vectors() {
        assert_eq!(
            FieldValue::parse(FieldType::SFVec3f, "1 2 3").unwrap(),
            FieldValue::Floats(vec![1.0, 2.0, 3.0])
        );
        assert!(FieldValue::parse(FieldType::SFVec3f, "1 2").is_err());
        assert_eq!(
            FieldValue::parse(FieldType::MFVec2f, "[ 0 0, 1 0 ]").unwrap(),
            FieldValue::Floats(vec![0.0, 0.0, 1.0, 0.0])
        );
        assert!(FieldValue::parse(FieldType::MFVec3f, "1 2 3 4").is_err());
    }

    #[test]
    fn test_parse_strings() {
        assert_eq!(
            FieldValue::parse(FieldType::SFString, "\"hello world\"").unwrap(),
            FieldValue::Str("hello world".to_string())
        );
        assert_eq!(
            FieldValue::parse(FieldType::SFString, "\"say \\\"hi\\\"\"").unwrap(),
            FieldValue::Str("say \"hi\"".to_string())
        );
        assert_eq!(
            FieldValue::parse(FieldType::MFString, "[ \"a\" \"b\" ]").unwrap(),
            FieldValue::Strs(vec!["a".to_string(), "b".to_string()])
        );
        assert!(FieldValue::parse(FieldType::SFString, "\"open").is_err());
    }

    #[test]
    fn test_classic_round_trip() {
        let cases = [
            (FieldType::SFVec3f, "0.5 -1 2"),
            (FieldType::MFInt32, "[ 1 2 3 100000 ]"),
            (FieldType::SFBool, "FALSE"),
            (FieldType::MFString, "[ \"a b\" \"c\" ]"),
            (FieldType::MFFloat, "[]"),
        ];
        for (ty, text) in cases {
            let value = FieldValue::parse(ty, text).unwrap();
            let printed = value.to_classic(ty);
            assert_eq!(FieldValue::parse(ty, &printed).unwrap(), value);
        }
    }

    #[test]
    fn test_matches_within() {
        let a = FieldValue::Floats(vec![1.0, 2.0]);
        let b = FieldValue::Floats(vec![1.0 + 4.0e-7, 2.0]);
        assert!(a.matches_within(&b, 9.0e-7));
        assert!(!a.matches_within(&FieldValue::Floats(vec![1.0]), 9.0e-7));
        assert!(FieldValue::Int(3).matches_within(&FieldValue::Int(3), 0.0));
    }
}
