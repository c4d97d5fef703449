//! Lenient integer fields: the web client sometimes posts indices as strings
//! (`"3"`) because they come straight from route parameters.

use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

/// Accepts `3`, `3.0` or `"3"`; rejects fractions and non-numeric strings.
pub fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(value) => Ok(value),
        // i64::MIN as f64 is exact, i64::MAX as f64 rounds up to 2^63
        IntOrString::Float(value)
            if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 =>
        {
            Ok(value as i64)
        }
        IntOrString::Float(value) => Err(de::Error::custom(format!(
            "expected an integer, got {}",
            value
        ))),
        IntOrString::Str(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("expected an integer, got \"{}\"", raw))),
    }
}
