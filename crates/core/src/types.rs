pub type DbId = uuid::Uuid;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
