use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS kv (
            key         TEXT PRIMARY KEY,
            value       BLOB NOT NULL
        );

        -- Append-only lists. Higher seq = pushed later = read first.
        CREATE TABLE IF NOT EXISTS list_items (
            key         TEXT NOT NULL,
            seq         INTEGER NOT NULL,
            value       BLOB NOT NULL,
            PRIMARY KEY (key, seq)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
