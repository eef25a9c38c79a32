/// Session identifiers are opaque strings issued by the session backend.
pub type SessionId = String;

/// Job identifiers are opaque strings issued by the session backend.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
