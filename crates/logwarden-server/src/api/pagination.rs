use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

const DEFAULT_PAGE_LIMIT: u64 = 20;
const MAX_PAGE_LIMIT: u64 = 1000;

/// Query strings arrive as text; JSON callers may send numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum U64Input {
    Number(u64),
    Text(String),
}

pub fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<U64Input>::deserialize(deserializer)? {
        None => Ok(None),
        Some(U64Input::Number(n)) => Ok(Some(n)),
        Some(U64Input::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(U64Input::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(DeError::custom),
    }
}

pub struct Page;

impl Page {
    pub fn limit(raw: Option<u64>) -> usize {
        raw.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT) as usize
    }

    pub fn offset(raw: Option<u64>) -> usize {
        raw.unwrap_or(0) as usize
    }
}
