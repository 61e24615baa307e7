pub mod mapper;
pub mod memory;
pub mod postgres;
pub mod seed;
pub mod sync;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::FromRow;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("constraint violated on {table}: {detail}")]
    Constraint { table: &'static str, detail: String },
    #[error("malformed {table} row: {detail}")]
    Malformed { table: &'static str, detail: String },
}

#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub token: String,
    pub position: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct SchoolYearRow {
    pub id: Uuid,
    pub label: String,
    pub position: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, FromRow)]
pub struct ModuleRow {
    pub id: Uuid,
    pub school_year_id: Uuid,
    pub title: String,
    pub position: i32,
}

/// One template per (module, evaluation type). Everything but the key lives
/// in `data`, read and written whole.
#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct TemplateRow {
    pub module_id: Uuid,
    pub evaluation_type: String,
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct StudentRow {
    pub id: Uuid,
    pub module_id: Uuid,
    pub evaluation_type: String,
    pub teacher_id: Option<Uuid>,
    pub name: String,
    pub firstname: String,
    pub note: String,
    pub group_name: String,
    pub class_name: String,
    pub teacher: String,
    pub evaluation_date: String,
    pub coaching_date: String,
    pub operational_competence: String,
    pub competency_options: Value,
    pub competencies: Value,
    pub position: i32,
}

/// Full relational image of the workspace, one vector per table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowSets {
    pub users: Vec<UserRow>,
    pub school_years: Vec<SchoolYearRow>,
    pub modules: Vec<ModuleRow>,
    pub templates: Vec<TemplateRow>,
    pub students: Vec<StudentRow>,
}

impl RowSets {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.school_years.is_empty()
            && self.modules.is_empty()
            && self.templates.is_empty()
            && self.students.is_empty()
    }
}

/// A row type that can take part in replace-by-diff.
pub trait SyncRow: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync;
    const TABLE: &'static str;

    fn key(&self) -> Self::Key;
}

impl SyncRow for UserRow {
    type Key = Uuid;
    const TABLE: &'static str = "users";

    fn key(&self) -> Uuid {
        self.id
    }
}

impl SyncRow for SchoolYearRow {
    type Key = Uuid;
    const TABLE: &'static str = "school_years";

    fn key(&self) -> Uuid {
        self.id
    }
}

impl SyncRow for ModuleRow {
    type Key = Uuid;
    const TABLE: &'static str = "modules";

    fn key(&self) -> Uuid {
        self.id
    }
}

impl SyncRow for TemplateRow {
    type Key = (Uuid, String);
    const TABLE: &'static str = "module_templates";

    fn key(&self) -> (Uuid, String) {
        (self.module_id, self.evaluation_type.clone())
    }
}

impl SyncRow for StudentRow {
    type Key = Uuid;
    const TABLE: &'static str = "students";

    fn key(&self) -> Uuid {
        self.id
    }
}

/// Relational backing store for the workspace.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads every table, each ordered by `position`.
    async fn load(&self) -> Result<RowSets, StoreError>;

    /// Makes the tables equal to `rows` in a single transaction.
    async fn replace_all(&self, rows: &RowSets) -> Result<(), StoreError>;

    /// Stored status encoding version, 0 when never set.
    async fn status_schema_version(&self) -> Result<i32, StoreError>;

    async fn set_status_schema_version(&self, version: i32) -> Result<(), StoreError>;
}
