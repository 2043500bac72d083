/// Sessions are keyed by an opaque, validated string id.
pub type SessionId = String;

/// All wall-clock timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
