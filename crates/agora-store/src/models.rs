/// Database row types; these map directly to SQLite rows.

pub struct AccountRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

pub struct JournalRow {
    pub seq: i64,
    pub path: String,
    /// JSON text of the written value.
    pub value: String,
}
