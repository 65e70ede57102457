//! SQLite driver.
//!
//! - [`SqliteDialect`]: DDL and statement syntax
//! - [`SqliteStore`]: reflection, row I/O and transactions over sqlx
//! - [`is_lock_error`]: separates transient lock contention from other failures

mod dialect;
mod store;

pub use dialect::SqliteDialect;
pub use store::SqliteStore;

/// SQLITE_BUSY: another connection holds a conflicting lock.
const SQLITE_BUSY: i32 = 5;

/// SQLITE_LOCKED: a conflict within the same connection or shared cache.
const SQLITE_LOCKED: i32 = 6;

/// True if `err` reports a transient lock.
///
/// Extended result codes carry the primary code in their low byte, so
/// `SQLITE_BUSY_SNAPSHOT` (517) counts as busy too.
pub fn is_lock_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let by_code = db
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false);
            by_code || is_lock_message(db.message())
        }
        _ => false,
    }
}

/// Lock detection by message, for errors that arrive without a code.
pub fn is_lock_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("database is locked") || message.contains("database table is locked")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_messages() {
        assert!(is_lock_message("database is locked"));
        assert!(is_lock_message("(code: 6) database table is locked: users"));
        assert!(!is_lock_message("no such table: users"));
    }

    #[test]
    fn test_non_database_errors_are_not_locks() {
        assert!(!is_lock_error(&sqlx::Error::RowNotFound));
        assert!(!is_lock_error(&sqlx::Error::PoolTimedOut));
    }
}
