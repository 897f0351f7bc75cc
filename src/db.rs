use rusqlite::Connection;
use std::path::Path;

use crate::catalog::DEFAULT_FACULTY_PASSWORD;

pub const DB_FILE_NAME: &str = "recordbook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            rollno TEXT NOT NULL UNIQUE,
            firstname TEXT,
            lastname TEXT,
            email TEXT,
            department TEXT,
            year INTEGER,
            semester INTEGER,
            createdat TEXT,
            updatedat TEXT
        )",
        [],
    )?;

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS faculty(
                id INTEGER PRIMARY KEY,
                facultyid TEXT NOT NULL UNIQUE,
                firstname TEXT,
                lastname TEXT,
                email TEXT,
                department TEXT,
                specialization TEXT,
                password TEXT NOT NULL DEFAULT '{}',
                createdat TEXT,
                updatedat TEXT
            )",
            DEFAULT_FACULTY_PASSWORD
        ),
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_years(
            id INTEGER PRIMARY KEY,
            year TEXT,
            startdate TEXT,
            enddate TEXT,
            type TEXT,
            createdat TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            id INTEGER PRIMARY KEY,
            key TEXT NOT NULL UNIQUE,
            value TEXT,
            createdat TEXT,
            updatedat TEXT
        )",
        [],
    )?;

    // `faculty` holds the instructor's display name, not a faculty row id.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id INTEGER PRIMARY KEY,
            code TEXT,
            name TEXT,
            department TEXT,
            semester INTEGER,
            faculty TEXT,
            year INTEGER,
            credits NUMERIC,
            createdat TEXT,
            updatedat TEXT
        )",
        [],
    )?;
    // Workspaces created before per-class grading caps existed lack these.
    ensure_classes_grading_columns(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_dept_sem ON classes(department, semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id INTEGER PRIMARY KEY,
            classid INTEGER NOT NULL,
            studentid INTEGER NOT NULL,
            date TEXT,
            session TEXT,
            status TEXT,
            notes TEXT,
            createdat TEXT,
            updatedat TEXT,
            FOREIGN KEY(classid) REFERENCES classes(id),
            FOREIGN KEY(studentid) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class ON attendance(classid)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(studentid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS internal_marks(
            id INTEGER PRIMARY KEY,
            classid INTEGER NOT NULL,
            studentid INTEGER NOT NULL,
            midsem NUMERIC,
            assignment NUMERIC,
            attendance NUMERIC,
            total NUMERIC,
            createdat TEXT,
            updatedat TEXT,
            FOREIGN KEY(classid) REFERENCES classes(id),
            FOREIGN KEY(studentid) REFERENCES students(id),
            UNIQUE(classid, studentid)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_internal_marks_student ON internal_marks(studentid)",
        [],
    )?;

    Ok(())
}

fn ensure_classes_grading_columns(conn: &Connection) -> anyhow::Result<()> {
    for column in ["max_midsem", "max_assignment", "max_attendance"] {
        if !table_has_column(conn, "classes", column)? {
            conn.execute(
                &format!("ALTER TABLE classes ADD COLUMN {} NUMERIC", column),
                [],
            )?;
        }
    }
    if !table_has_column(conn, "classes", "is_active")? {
        conn.execute(
            "ALTER TABLE classes ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1",
            [],
        )?;
    }
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
