//! Process-local store with the same constraint and cascade rules as the
//! Postgres schema. Nothing survives a restart.

use crate::db::sync::{apply_row_sets, TableWriter};
use crate::db::{
    ModuleRow, RowSets, SchoolYearRow, Store, StoreError, StudentRow, SyncRow, TemplateRow,
    UserRow,
};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<RowSets>,
    status_schema_version: RwLock<i32>,
}

/// Working copy of the tables; dropped on rollback, swapped in on commit.
pub struct MemoryWriter {
    tables: RowSets,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn begin(&self) -> MemoryWriter {
        MemoryWriter {
            tables: self.tables.read().await.clone(),
        }
    }

    #[cfg(test)]
    pub async fn commit(&self, writer: MemoryWriter) {
        *self.tables.write().await = writer.tables;
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self) -> Result<RowSets, StoreError> {
        let mut rows = self.tables.read().await.clone();
        rows.users.sort_by_key(|r| r.position);
        rows.school_years.sort_by_key(|r| r.position);
        rows.modules.sort_by_key(|r| r.position);
        rows.students.sort_by_key(|r| r.position);
        Ok(rows)
    }

    async fn replace_all(&self, rows: &RowSets) -> Result<(), StoreError> {
        // Held for the whole sync so writers are serialized.
        let mut tables = self.tables.write().await;
        let mut writer = MemoryWriter {
            tables: tables.clone(),
        };
        apply_row_sets(&mut writer, rows).await?;
        *tables = writer.tables;
        Ok(())
    }

    async fn status_schema_version(&self) -> Result<i32, StoreError> {
        Ok(*self.status_schema_version.read().await)
    }

    async fn set_status_schema_version(&self, version: i32) -> Result<(), StoreError> {
        *self.status_schema_version.write().await = version;
        Ok(())
    }
}

fn upsert_by_key<R: SyncRow>(table: &mut Vec<R>, row: &R) {
    let key = row.key();
    match table.iter_mut().find(|r| r.key() == key) {
        Some(existing) => *existing = row.clone(),
        None => table.push(row.clone()),
    }
}

/// Unique columns are checked once the whole batch is applied, like the
/// deferred constraints in the schema.
fn first_duplicate<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| !seen.insert(*v))
        .map(str::to_string)
        .next()
}

fn violation(table: &'static str, detail: String) -> StoreError {
    StoreError::Constraint { table, detail }
}

impl MemoryWriter {
    fn cascade_modules(&mut self, removed: &HashSet<Uuid>) {
        self.tables.templates.retain(|t| !removed.contains(&t.module_id));
        self.tables.students.retain(|s| !removed.contains(&s.module_id));
    }
}

#[async_trait]
impl TableWriter<UserRow> for MemoryWriter {
    async fn existing_keys(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.tables.users.iter().map(|r| r.id).collect())
    }

    async fn delete_rows(&mut self, keys: &[Uuid]) -> Result<(), StoreError> {
        self.tables.users.retain(|r| !keys.contains(&r.id));
        for student in self.tables.students.iter_mut() {
            if student.teacher_id.is_some_and(|id| keys.contains(&id)) {
                student.teacher_id = None;
            }
        }
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[UserRow]) -> Result<(), StoreError> {
        for row in rows {
            upsert_by_key(&mut self.tables.users, row);
        }
        match first_duplicate(self.tables.users.iter().map(|u| u.email.as_str())) {
            Some(email) => Err(violation(UserRow::TABLE, format!("duplicate email {email}"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TableWriter<SchoolYearRow> for MemoryWriter {
    async fn existing_keys(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.tables.school_years.iter().map(|r| r.id).collect())
    }

    async fn delete_rows(&mut self, keys: &[Uuid]) -> Result<(), StoreError> {
        self.tables.school_years.retain(|r| !keys.contains(&r.id));
        let removed: HashSet<Uuid> = self
            .tables
            .modules
            .iter()
            .filter(|m| keys.contains(&m.school_year_id))
            .map(|m| m.id)
            .collect();
        self.tables.modules.retain(|m| !removed.contains(&m.id));
        self.cascade_modules(&removed);
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[SchoolYearRow]) -> Result<(), StoreError> {
        for row in rows {
            upsert_by_key(&mut self.tables.school_years, row);
        }
        match first_duplicate(self.tables.school_years.iter().map(|y| y.label.as_str())) {
            Some(label) => Err(violation(
                SchoolYearRow::TABLE,
                format!("duplicate label {label}"),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TableWriter<ModuleRow> for MemoryWriter {
    async fn existing_keys(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.tables.modules.iter().map(|r| r.id).collect())
    }

    async fn delete_rows(&mut self, keys: &[Uuid]) -> Result<(), StoreError> {
        self.tables.modules.retain(|r| !keys.contains(&r.id));
        let removed: HashSet<Uuid> = keys.iter().copied().collect();
        self.cascade_modules(&removed);
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[ModuleRow]) -> Result<(), StoreError> {
        for row in rows {
            if !self.tables.school_years.iter().any(|y| y.id == row.school_year_id) {
                return Err(violation(
                    ModuleRow::TABLE,
                    format!("unknown school year {}", row.school_year_id),
                ));
            }
            upsert_by_key(&mut self.tables.modules, row);
        }
        Ok(())
    }
}

#[async_trait]
impl TableWriter<TemplateRow> for MemoryWriter {
    async fn existing_keys(&mut self) -> Result<Vec<(Uuid, String)>, StoreError> {
        Ok(self.tables.templates.iter().map(SyncRow::key).collect())
    }

    async fn delete_rows(&mut self, keys: &[(Uuid, String)]) -> Result<(), StoreError> {
        self.tables.templates.retain(|r| !keys.contains(&r.key()));
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[TemplateRow]) -> Result<(), StoreError> {
        for row in rows {
            if !self.tables.modules.iter().any(|m| m.id == row.module_id) {
                return Err(violation(
                    TemplateRow::TABLE,
                    format!("unknown module {}", row.module_id),
                ));
            }
            upsert_by_key(&mut self.tables.templates, row);
        }
        Ok(())
    }
}

#[async_trait]
impl TableWriter<StudentRow> for MemoryWriter {
    async fn existing_keys(&mut self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.tables.students.iter().map(|r| r.id).collect())
    }

    async fn delete_rows(&mut self, keys: &[Uuid]) -> Result<(), StoreError> {
        self.tables.students.retain(|r| !keys.contains(&r.id));
        Ok(())
    }

    async fn upsert_rows(&mut self, rows: &[StudentRow]) -> Result<(), StoreError> {
        for row in rows {
            if !self.tables.modules.iter().any(|m| m.id == row.module_id) {
                return Err(violation(
                    StudentRow::TABLE,
                    format!("unknown module {}", row.module_id),
                ));
            }
            if let Some(teacher_id) = row.teacher_id {
                if !self.tables.users.iter().any(|u| u.id == teacher_id) {
                    return Err(violation(
                        StudentRow::TABLE,
                        format!("unknown teacher {teacher_id}"),
                    ));
                }
            }
            upsert_by_key(&mut self.tables.students, row);
        }
        Ok(())
    }
}
