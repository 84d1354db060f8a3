use rusqlite::Connection;
use std::path::Path;

use crate::auth::ADMIN_EMPLOYEE_ID;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("roster.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            employee_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            roll_no TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_logs(
            id TEXT PRIMARY KEY,
            student_roll TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            updated_at TEXT,
            UNIQUE(student_roll, date),
            FOREIGN KEY(student_roll) REFERENCES students(roll_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_logs_student ON attendance_logs(student_roll)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_logs_date ON attendance_logs(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS document_bindings(
            student_roll TEXT NOT NULL,
            kind TEXT NOT NULL,
            blob_key TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(student_roll, kind),
            FOREIGN KEY(student_roll) REFERENCES students(roll_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_document_bindings_student ON document_bindings(student_roll)",
        [],
    )?;

    // Workspaces created before registration timestamps existed lack created_at.
    ensure_created_at(&conn, "teachers")?;
    ensure_created_at(&conn, "students")?;

    seed_admin(&conn)?;

    Ok(conn)
}

/// The Administrator is an ordinary teacher row with the reserved employee id.
/// Seeding it keeps a fresh workspace reachable without manual inserts.
fn seed_admin(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO teachers(employee_id, name, created_at)
         VALUES(?, 'ADMINISTRATOR', datetime('now'))",
        [ADMIN_EMPLOYEE_ID],
    )?;
    Ok(())
}

fn ensure_created_at(conn: &Connection, table: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, "created_at")? {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN created_at TEXT", table),
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
