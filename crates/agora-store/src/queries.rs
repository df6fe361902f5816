use crate::Database;
use crate::models::{AccountRow, JournalRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Accounts --

    pub fn create_account(&self, id: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, email, password) VALUES (?1, ?2, ?3)",
                (id, email, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account_by_email(conn, email))
    }

    // -- Journal --

    pub fn append_journal(&self, path: &str, value: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO journal (path, value) VALUES (?1, ?2)",
                (path, value),
            )?;
            Ok(())
        })
    }

    pub fn load_journal(&self) -> Result<Vec<JournalRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT seq, path, value FROM journal ORDER BY seq")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(JournalRow {
                        seq: row.get(0)?,
                        path: row.get(1)?,
                        value: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Replace the whole journal with one root write holding `root`.
    pub fn compact_journal(&self, root: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM journal", [])?;
            tx.execute("INSERT INTO journal (path, value) VALUES ('', ?1)", [root])?;
            tx.commit()?;
            Ok(())
        })
    }
}

fn query_account_by_email(conn: &Connection, email: &str) -> Result<Option<AccountRow>> {
    let mut stmt =
        conn.prepare("SELECT id, email, password, created_at FROM accounts WHERE email = ?1")?;

    let row = stmt
        .query_row([email], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_keeps_write_order_and_compacts() {
        let db = Database::open_in_memory().unwrap();
        db.append_journal("users/u1", r#"{"username":"a"}"#).unwrap();
        db.append_journal("users/u1/bio", r#""hi""#).unwrap();

        let rows = db.load_journal().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].seq < rows[1].seq);
        assert_eq!(rows[1].path, "users/u1/bio");

        db.compact_journal(r#"{"users":{}}"#).unwrap();
        let rows = db.load_journal().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "");
    }

    #[test]
    fn account_lookup_by_email() {
        let db = Database::open_in_memory().unwrap();
        db.create_account("id1", "a@b.c", "hash").unwrap();

        let row = db.get_account_by_email("a@b.c").unwrap().unwrap();
        assert_eq!(row.id, "id1");
        assert!(!row.created_at.is_empty());
        assert!(db.get_account_by_email("x@y.z").unwrap().is_none());
        assert!(db.create_account("id2", "a@b.c", "hash").is_err());
    }
}
