use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "kbmrecap.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS villages(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS learning_groups(
            id TEXT PRIMARY KEY,
            village_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(village_id) REFERENCES villages(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_learning_groups_village ON learning_groups(village_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS material_categories(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS generus(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            gender TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT,
            FOREIGN KEY(group_id) REFERENCES learning_groups(id),
            FOREIGN KEY(category_id) REFERENCES categories(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_generus_group ON generus(group_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_generus_group_category ON generus(group_id, category_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_recaps(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            period_month INTEGER NOT NULL,
            period_year INTEGER NOT NULL,
            meeting_count INTEGER NOT NULL,
            generus_count INTEGER NOT NULL,
            raw_data TEXT NOT NULL,
            present_amount INTEGER NOT NULL,
            present_percentage REAL NOT NULL,
            permission_amount INTEGER NOT NULL,
            permission_percentage REAL NOT NULL,
            absent_amount INTEGER NOT NULL,
            absent_percentage REAL NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(group_id) REFERENCES learning_groups(id),
            FOREIGN KEY(category_id) REFERENCES categories(id),
            UNIQUE(group_id, category_id, period_month, period_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_recaps_period ON attendance_recaps(period_year, period_month)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluation_recaps(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            period_month INTEGER NOT NULL,
            period_year INTEGER NOT NULL,
            raw_data TEXT NOT NULL,
            challenges TEXT,
            solutions TEXT,
            notes TEXT,
            achievement TEXT,
            updated_at TEXT,
            FOREIGN KEY(group_id) REFERENCES learning_groups(id),
            FOREIGN KEY(category_id) REFERENCES categories(id),
            UNIQUE(group_id, category_id, period_month, period_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluation_recaps_period ON evaluation_recaps(period_year, period_month)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS manual_reports(
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            period_month INTEGER NOT NULL,
            period_year INTEGER NOT NULL,
            count_male INTEGER NOT NULL DEFAULT 0,
            count_female INTEGER NOT NULL DEFAULT 0,
            count_total INTEGER NOT NULL DEFAULT 0,
            present_percentage REAL NOT NULL DEFAULT 0,
            permission_percentage REAL NOT NULL DEFAULT 0,
            absent_percentage REAL NOT NULL DEFAULT 0,
            raw_data TEXT NOT NULL DEFAULT '{}',
            achievements TEXT NOT NULL DEFAULT '[]',
            program_success_info TEXT,
            challenges_info TEXT,
            updated_at TEXT,
            FOREIGN KEY(group_id) REFERENCES learning_groups(id),
            FOREIGN KEY(category_id) REFERENCES categories(id),
            UNIQUE(group_id, category_id, period_month, period_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_manual_reports_period ON manual_reports(period_year, period_month)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
