use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct MessageUpdate {
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<String>,
}

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

/// A cursor is the caller-opaque encoding of the last-seen `id`: the id's
/// string form. Absent/empty means "start from the smallest id".
pub fn decode_cursor(cursor: Option<&str>) -> Result<Option<Uuid>, uuid::Error> {
    match cursor {
        None => Ok(None),
        Some("") => Ok(None),
        Some(s) => Uuid::parse_str(s).map(Some),
    }
}

pub fn encode_cursor(id: Uuid) -> String {
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_applies_default_and_bounds() {
        assert_eq!(clamp_limit(None), DEFAULT_PAGE_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(1000)), MAX_PAGE_LIMIT);
        assert_eq!(clamp_limit(Some(5)), 5);
    }

    #[test]
    fn empty_or_absent_cursor_decodes_to_none() {
        assert_eq!(decode_cursor(None).unwrap(), None);
        assert_eq!(decode_cursor(Some("")).unwrap(), None);
    }

    #[test]
    fn cursor_round_trips_through_encode_decode() {
        let id = Uuid::new_v4();
        let encoded = encode_cursor(id);
        assert_eq!(decode_cursor(Some(&encoded)).unwrap(), Some(id));
    }
}
