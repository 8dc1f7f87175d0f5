use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Serialize, Serializer};

/// A record read from a topic partition. Built once by the broker adapter,
/// never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    #[serde(serialize_with = "as_decimal_string")]
    pub offset: i64,
    /// Broker-assigned, milliseconds since epoch.
    #[serde(serialize_with = "as_decimal_string")]
    pub timestamp: i64,
    #[serde(serialize_with = "as_display_text")]
    pub key: Option<Bytes>,
    #[serde(serialize_with = "as_display_text")]
    pub value: Option<Bytes>,
    pub headers: BTreeMap<String, Option<String>>,
}

impl Message {
    pub fn key_text(&self) -> Option<String> {
        self.key.as_deref().map(|k| String::from_utf8_lossy(k).into_owned())
    }

    pub fn value_text(&self) -> Option<String> {
        self.value.as_deref().map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

// Offsets and timestamps travel as strings so JS clients keep full precision.
fn as_decimal_string<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn as_display_text<S: Serializer>(value: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

// ========================================
// HEADERS
// ========================================

/// Normalizes raw broker headers into display-safe strings.
///
/// - UTF-8 values are kept as-is.
/// - Binary values become `0x`-prefixed hex.
/// - A header without a value maps to `None`.
/// - Repeated keys are joined with `", "` in arrival order.
pub fn parse_headers<'a, I>(headers: I) -> BTreeMap<String, Option<String>>
where
    I: IntoIterator<Item = (&'a str, Option<&'a [u8]>)>,
{
    let mut parsed: BTreeMap<String, Option<String>> = BTreeMap::new();

    for (key, value) in headers {
        let text = value.map(header_value_to_string);
        match parsed.get_mut(key) {
            None => {
                parsed.insert(key.to_string(), text);
            }
            Some(existing) => {
                let Some(next) = text else { continue };
                match existing {
                    Some(current) => {
                        current.push_str(", ");
                        current.push_str(&next);
                    }
                    None => *existing = Some(next),
                }
            }
        }
    }

    parsed
}

fn header_value_to_string(value: &[u8]) -> String {
    match std::str::from_utf8(value) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(value)),
    }
}
