//! Fixed relational schema for the academic records store
//!
//! Seven tables, created idempotently at startup. Column lists double as the
//! allow-list for filter columns, since a column name cannot be bound as a
//! statement parameter and has to be spliced into the SQL text.

use rusqlite::Connection;

use crate::error::Result;

/// One of the seven fixed record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Department,
    Subject,
    Group,
    Student,
    Professor,
    Course,
    Grade,
}

impl Entity {
    pub const ALL: [Entity; 7] = [
        Entity::Department,
        Entity::Subject,
        Entity::Group,
        Entity::Student,
        Entity::Professor,
        Entity::Course,
        Entity::Grade,
    ];

    /// Resolve a wire-level table name.
    ///
    /// Accepts the singular form and the plural form older clients send.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "department" | "departments" => Some(Entity::Department),
            "subject" | "subjects" => Some(Entity::Subject),
            "group" | "groups" => Some(Entity::Group),
            "student" | "students" => Some(Entity::Student),
            "professor" | "professors" => Some(Entity::Professor),
            "course" | "courses" => Some(Entity::Course),
            "grade" | "grades" => Some(Entity::Grade),
            _ => None,
        }
    }

    /// Wire-level name
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Department => "department",
            Entity::Subject => "subject",
            Entity::Group => "group",
            Entity::Student => "student",
            Entity::Professor => "professor",
            Entity::Course => "course",
            Entity::Grade => "grade",
        }
    }

    /// Table name in the data file
    pub fn table(&self) -> &'static str {
        match self {
            Entity::Department => "Departments",
            Entity::Subject => "Subjects",
            Entity::Group => "Groups",
            Entity::Student => "Students",
            Entity::Professor => "Professors",
            Entity::Course => "Courses",
            Entity::Grade => "Grades",
        }
    }

    /// Columns in declaration order (the order insert payloads follow)
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Entity::Department => &["department_id", "department_name"],
            Entity::Subject => &["subject_id", "subject_name"],
            Entity::Group => &["group_id", "group_name", "department", "major"],
            Entity::Student => &[
                "student_id",
                "student_name",
                "enrollment_date",
                "study_group",
                "stipend",
            ],
            Entity::Professor => &[
                "professor_id",
                "professor_name",
                "department",
                "degree",
                "salary",
            ],
            Entity::Course => &[
                "course_id",
                "course_name",
                "subject",
                "term",
                "test",
                "hours",
            ],
            Entity::Grade => &["grade_id", "course", "student", "grade"],
        }
    }

    /// Look up a client-supplied column name in this entity's column set.
    ///
    /// Returns the schema's own `'static` spelling so the caller never splices
    /// client text into SQL.
    pub fn column(&self, name: &str) -> Option<&'static str> {
        self.columns().iter().copied().find(|c| *c == name)
    }

    fn create_sql(&self) -> &'static str {
        match self {
            Entity::Department => {
                "CREATE TABLE IF NOT EXISTS Departments (
                    department_id INTEGER PRIMARY KEY,
                    department_name TEXT NOT NULL)"
            }
            Entity::Subject => {
                "CREATE TABLE IF NOT EXISTS Subjects (
                    subject_id INTEGER PRIMARY KEY,
                    subject_name TEXT NOT NULL)"
            }
            Entity::Group => {
                "CREATE TABLE IF NOT EXISTS Groups (
                    group_id INTEGER PRIMARY KEY,
                    group_name TEXT NOT NULL,
                    department INTEGER NOT NULL,
                    major INTEGER NOT NULL,
                    FOREIGN KEY (department) REFERENCES Departments(department_id),
                    FOREIGN KEY (major) REFERENCES Subjects(subject_id))"
            }
            Entity::Student => {
                "CREATE TABLE IF NOT EXISTS Students (
                    student_id INTEGER PRIMARY KEY,
                    student_name TEXT NOT NULL,
                    enrollment_date TEXT,
                    study_group INTEGER NOT NULL,
                    stipend INTEGER,
                    FOREIGN KEY (study_group) REFERENCES Groups(group_id))"
            }
            Entity::Professor => {
                "CREATE TABLE IF NOT EXISTS Professors (
                    professor_id INTEGER PRIMARY KEY,
                    professor_name TEXT NOT NULL,
                    department INTEGER NOT NULL,
                    degree TEXT,
                    salary INTEGER,
                    FOREIGN KEY (department) REFERENCES Departments(department_id))"
            }
            Entity::Course => {
                "CREATE TABLE IF NOT EXISTS Courses (
                    course_id INTEGER PRIMARY KEY,
                    course_name TEXT NOT NULL,
                    subject INTEGER NOT NULL,
                    term INTEGER NOT NULL,
                    test TEXT NOT NULL,
                    hours INTEGER NOT NULL,
                    FOREIGN KEY (subject) REFERENCES Subjects(subject_id))"
            }
            Entity::Grade => {
                "CREATE TABLE IF NOT EXISTS Grades (
                    grade_id INTEGER PRIMARY KEY,
                    course INTEGER NOT NULL,
                    student INTEGER NOT NULL,
                    grade INTEGER NOT NULL,
                    FOREIGN KEY (course) REFERENCES Courses(course_id),
                    FOREIGN KEY (student) REFERENCES Students(student_id))"
            }
        }
    }
}

/// Create every table that does not exist yet. Safe to run on every startup.
pub fn initialize(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for entity in Entity::ALL {
        tx.execute(entity.create_sql(), [])?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod schema_tests {
    use super::*;

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
    }

    #[test]
    fn test_initialize_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        for entity in Entity::ALL {
            assert_eq!(
                table_columns(&conn, entity.table()),
                entity.columns(),
                "column list of {} must match its table",
                entity.table()
            );
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO Departments VALUES (1, 'Physics')",
            [],
        )
        .unwrap();

        initialize(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM Departments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_from_name_accepts_singular_and_plural() {
        assert_eq!(Entity::from_name("student"), Some(Entity::Student));
        assert_eq!(Entity::from_name("students"), Some(Entity::Student));
        assert_eq!(Entity::from_name("courses"), Some(Entity::Course));
        assert_eq!(Entity::from_name("Students"), None);
        assert_eq!(Entity::from_name(""), None);
    }

    #[test]
    fn test_column_allow_list() {
        assert_eq!(Entity::Student.column("student_id"), Some("student_id"));
        assert_eq!(Entity::Professor.column("salary"), Some("salary"));
        assert_eq!(Entity::Student.column("salary"), None);
        assert_eq!(Entity::Student.column("1=1 OR student_id"), None);
    }
}
