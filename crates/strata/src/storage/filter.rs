//! Filter types for tier searches
//!
//! Narrows a similarity search to one session, one entry type, or entries
//! written after a point in time. The same filter renders to a LanceDB
//! `only_if` clause and evaluates directly against in-memory entries.

use chrono::{DateTime, Utc};

use crate::memory::session::SessionId;
use crate::memory::types::TierEntry;

/// Filter criteria for index searches.
///
/// All fields are optional; unset fields are not applied. Set fields are
/// combined with AND logic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexFilter {
    /// Only entries written for this session
    pub session_id: Option<SessionId>,
    /// Only entries with this `type` metadata
    pub entry_type: Option<String>,
    /// Only entries written at or after this time
    pub since: Option<DateTime<Utc>>,
}

impl IndexFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_entry_type(mut self, entry_type: impl Into<String>) -> Self {
        self.entry_type = Some(entry_type.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Build a SQL WHERE clause from this filter.
    /// Returns `None` if no filters are set.
    pub fn to_sql_clause(&self) -> Option<String> {
        let mut conditions = Vec::new();

        if let Some(ref session_id) = self.session_id {
            conditions.push(format!(
                "session_id = '{}'",
                escape_literal(session_id.as_str())
            ));
        }

        if let Some(ref entry_type) = self.entry_type {
            conditions.push(format!("entry_type = '{}'", escape_literal(entry_type)));
        }

        // created_at is stored as microseconds since epoch
        if let Some(ref since) = self.since {
            conditions.push(format!("created_at >= {}", since.timestamp_micros()));
        }

        if conditions.is_empty() {
            None
        } else {
            Some(conditions.join(" AND "))
        }
    }

    /// Evaluate this filter against an entry without going through SQL
    pub fn matches(&self, entry: &TierEntry) -> bool {
        if let Some(ref session_id) = self.session_id
            && entry.session_id() != Some(session_id.as_str())
        {
            return false;
        }
        if let Some(ref entry_type) = self.entry_type
            && entry.entry_type() != Some(entry_type.as_str())
        {
            return false;
        }
        if let Some(since) = self.since
            && entry.timestamp < since
        {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.entry_type.is_none() && self.since.is_none()
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn entry(session: &str, entry_type: &str) -> TierEntry {
        let mut metadata = Map::new();
        metadata.insert("session_id".to_string(), Value::from(session));
        metadata.insert("type".to_string(), Value::from(entry_type));
        TierEntry::new("content".to_string(), vec![0.0; 4], metadata)
    }

    #[test]
    fn test_empty_filter() {
        let filter = IndexFilter::new();
        assert!(filter.is_empty());
        assert!(filter.to_sql_clause().is_none());
        assert!(filter.matches(&entry("s1", "conversation")));
    }

    #[test]
    fn test_session_filter() {
        let filter = IndexFilter::new().with_session(SessionId::new("s1").unwrap());

        assert_eq!(filter.to_sql_clause().unwrap(), "session_id = 's1'");
        assert!(filter.matches(&entry("s1", "conversation")));
        assert!(!filter.matches(&entry("s2", "conversation")));
    }

    #[test]
    fn test_session_filter_escapes_quotes() {
        let session = SessionId::new("o'brien@example.com").unwrap();
        let filter = IndexFilter::new().with_session(session);

        assert_eq!(
            filter.to_sql_clause().unwrap(),
            "session_id = 'o''brien@example.com'"
        );
        assert!(filter.matches(&entry("o'brien@example.com", "conversation")));
    }

    #[test]
    fn test_entry_type_filter_escapes_quotes() {
        let filter = IndexFilter::new().with_entry_type("it's");
        assert_eq!(filter.to_sql_clause().unwrap(), "entry_type = 'it''s'");
    }

    #[test]
    fn test_combined_filters() {
        use chrono::TimeZone;
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = IndexFilter::new()
            .with_session(SessionId::new("s1").unwrap())
            .with_entry_type("technical")
            .since(since);

        let sql = filter.to_sql_clause().unwrap();
        assert!(sql.contains("session_id = 's1'"));
        assert!(sql.contains("entry_type = 'technical'"));
        assert!(sql.contains(&format!("created_at >= {}", since.timestamp_micros())));
        assert_eq!(sql.matches(" AND ").count(), 2);

        assert!(filter.matches(&entry("s1", "technical")));
        assert!(!filter.matches(&entry("s1", "conversation")));
    }

    #[test]
    fn test_since_excludes_older_entries() {
        let mut old = entry("s1", "conversation");
        old.timestamp = Utc::now() - chrono::Duration::hours(2);
        let filter = IndexFilter::new().since(Utc::now() - chrono::Duration::hours(1));

        assert!(!filter.matches(&old));
        assert!(filter.matches(&entry("s1", "conversation")));
    }
}
