//! Replace-by-diff across the five tables, parents before children.

use crate::db::{
    ModuleRow, RowSets, SchoolYearRow, StoreError, StudentRow, SyncRow, TemplateRow, UserRow,
};
use async_trait::async_trait;
use std::collections::HashSet;

/// Table access inside an open transaction.
#[async_trait]
pub trait TableWriter<R: SyncRow>: Send {
    async fn existing_keys(&mut self) -> Result<Vec<R::Key>, StoreError>;
    async fn delete_rows(&mut self, keys: &[R::Key]) -> Result<(), StoreError>;
    /// Insert-or-update by key.
    async fn upsert_rows(&mut self, rows: &[R]) -> Result<(), StoreError>;
}

/// Writer able to sync every table of the workspace.
pub trait RowWriter:
    TableWriter<UserRow>
    + TableWriter<SchoolYearRow>
    + TableWriter<ModuleRow>
    + TableWriter<TemplateRow>
    + TableWriter<StudentRow>
{
}

impl<T> RowWriter for T where
    T: TableWriter<UserRow>
        + TableWriter<SchoolYearRow>
        + TableWriter<ModuleRow>
        + TableWriter<TemplateRow>
        + TableWriter<StudentRow>
{
}

#[derive(Debug)]
pub struct SyncPlan<'a, R: SyncRow> {
    pub delete: Vec<R::Key>,
    pub upsert: &'a [R],
}

/// Keys present in storage but absent from `desired` are deleted; every
/// desired row is upserted.
pub fn plan_sync<'a, R: SyncRow>(existing: &[R::Key], desired: &'a [R]) -> SyncPlan<'a, R> {
    let wanted: HashSet<R::Key> = desired.iter().map(SyncRow::key).collect();
    let delete = existing
        .iter()
        .filter(|key| !wanted.contains(*key))
        .cloned()
        .collect();
    SyncPlan {
        delete,
        upsert: desired,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub deleted: usize,
    pub upserted: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub users: TableSummary,
    pub school_years: TableSummary,
    pub modules: TableSummary,
    pub templates: TableSummary,
    pub students: TableSummary,
}

pub async fn sync_table<R, W>(writer: &mut W, desired: &[R]) -> Result<TableSummary, StoreError>
where
    R: SyncRow,
    W: TableWriter<R>,
{
    let existing = writer.existing_keys().await?;
    let plan = plan_sync(&existing, desired);
    if !plan.delete.is_empty() {
        writer.delete_rows(&plan.delete).await?;
    }
    if !plan.upsert.is_empty() {
        writer.upsert_rows(plan.upsert).await?;
    }
    tracing::debug!(
        table = R::TABLE,
        deleted = plan.delete.len(),
        upserted = plan.upsert.len(),
        "table synced"
    );
    Ok(TableSummary {
        deleted: plan.delete.len(),
        upserted: plan.upsert.len(),
    })
}

/// Runs the five table syncs in dependency order. The caller owns the
/// transaction and must not commit when this returns an error.
pub async fn apply_row_sets<W: RowWriter>(
    writer: &mut W,
    rows: &RowSets,
) -> Result<SyncSummary, StoreError> {
    Ok(SyncSummary {
        users: sync_table(&mut *writer, &rows.users).await?,
        school_years: sync_table(&mut *writer, &rows.school_years).await?,
        modules: sync_table(&mut *writer, &rows.modules).await?,
        templates: sync_table(&mut *writer, &rows.templates).await?,
        students: sync_table(&mut *writer, &rows.students).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryStore, MemoryWriter};
    use crate::db::Store;
    use serde_json::json;
    use uuid::Uuid;

    fn year(label: &str, position: i32) -> SchoolYearRow {
        SchoolYearRow {
            id: Uuid::new_v4(),
            label: label.to_string(),
            position,
        }
    }

    fn student(module_id: Uuid, name: &str) -> StudentRow {
        StudentRow {
            id: Uuid::new_v4(),
            module_id,
            evaluation_type: "summative".into(),
            teacher_id: None,
            name: name.into(),
            firstname: String::new(),
            note: String::new(),
            group_name: String::new(),
            class_name: String::new(),
            teacher: String::new(),
            evaluation_date: String::new(),
            coaching_date: String::new(),
            operational_competence: String::new(),
            competency_options: json!([]),
            competencies: json!([]),
            position: 0,
        }
    }

    fn sample() -> RowSets {
        let y = year("2026-2027", 0);
        let module = ModuleRow {
            id: Uuid::new_v4(),
            school_year_id: y.id,
            title: "Networks".into(),
            position: 0,
        };
        let template = TemplateRow {
            module_id: module.id,
            evaluation_type: "summative".into(),
            data: json!({ "note": "" }),
        };
        let s = student(module.id, "Doe");
        RowSets {
            users: Vec::new(),
            school_years: vec![y],
            modules: vec![module],
            templates: vec![template],
            students: vec![s],
        }
    }

    #[test]
    fn test_plan_deletes_only_absent_keys() {
        let keep = year("keep", 0);
        let gone = Uuid::new_v4();
        let existing = vec![keep.id, gone];
        let desired = vec![keep.clone(), year("new", 1)];

        let plan = plan_sync(&existing, &desired);
        assert_eq!(plan.delete, vec![gone]);
        assert_eq!(plan.upsert.len(), 2);
    }

    #[test]
    fn test_plan_uses_composite_template_key() {
        let module_id = Uuid::new_v4();
        let row = |evaluation_type: &str| TemplateRow {
            module_id,
            evaluation_type: evaluation_type.to_string(),
            data: json!({}),
        };
        let existing = vec![
            (module_id, "summative".to_string()),
            (module_id, "formative".to_string()),
        ];
        let desired = vec![row("summative")];
        let plan = plan_sync(&existing, &desired);
        assert_eq!(plan.delete, vec![(module_id, "formative".to_string())]);
    }

    #[tokio::test]
    async fn test_replace_all_then_shrink() {
        let store = MemoryStore::new();
        let rows = sample();
        store.replace_all(&rows).await.unwrap();
        assert_eq!(store.load().await.unwrap(), rows);

        let mut smaller = rows.clone();
        smaller.students.clear();
        store.replace_all(&smaller).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert!(loaded.students.is_empty());
        assert_eq!(loaded.modules.len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_school_year_cascades() {
        let store = MemoryStore::new();
        let rows = sample();
        store.replace_all(&rows).await.unwrap();

        store.replace_all(&RowSets::default()).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    /// Delegates to a memory transaction but fails on the final step.
    struct FailOnStudents(MemoryWriter);

    #[async_trait]
    impl<R: SyncRow> TableWriter<R> for FailOnStudents
    where
        MemoryWriter: TableWriter<R>,
    {
        async fn existing_keys(&mut self) -> Result<Vec<R::Key>, StoreError> {
            <MemoryWriter as TableWriter<R>>::existing_keys(&mut self.0).await
        }

        async fn delete_rows(&mut self, keys: &[R::Key]) -> Result<(), StoreError> {
            <MemoryWriter as TableWriter<R>>::delete_rows(&mut self.0, keys).await
        }

        async fn upsert_rows(&mut self, rows: &[R]) -> Result<(), StoreError> {
            if R::TABLE == StudentRow::TABLE {
                return Err(StoreError::Constraint {
                    table: R::TABLE,
                    detail: "injected failure".into(),
                });
            }
            <MemoryWriter as TableWriter<R>>::upsert_rows(&mut self.0, rows).await
        }
    }

    #[tokio::test]
    async fn test_failure_before_last_step_keeps_prior_state() {
        let store = MemoryStore::new();
        let before = sample();
        store.replace_all(&before).await.unwrap();

        let mut next = sample();
        next.users.push(UserRow {
            id: Uuid::new_v4(),
            name: "Teacher".into(),
            email: "t@example.org".into(),
            password_hash: String::new(),
            salt: String::new(),
            token: String::new(),
            position: 0,
        });

        let mut writer = FailOnStudents(store.begin().await);
        let result = apply_row_sets(&mut writer, &next).await;
        assert!(result.is_err());
        drop(writer);

        assert_eq!(store.load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_constraint_violation_rolls_back_whole_replace() {
        let store = MemoryStore::new();
        let before = sample();
        store.replace_all(&before).await.unwrap();

        let mut next = before.clone();
        next.school_years.push(year("2027-2028", 1));
        next.students.push(student(Uuid::new_v4(), "Orphan"));

        let err = store.replace_all(&next).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint { table: "students", .. }));
        assert_eq!(store.load().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_labels_can_swap_in_one_replace() {
        let store = MemoryStore::new();
        let mut rows = sample();
        rows.school_years.push(year("2027-2028", 1));
        store.replace_all(&rows).await.unwrap();

        let mut swapped = rows.clone();
        swapped.school_years[0].label = "2027-2028".into();
        swapped.school_years[1].label = "2026-2027".into();
        store.replace_all(&swapped).await.unwrap();
        assert_eq!(store.load().await.unwrap(), swapped);

        let mut clash = swapped.clone();
        clash.school_years[1].label = "2027-2028".into();
        let err = store.replace_all(&clash).await.unwrap_err();
        assert!(matches!(err, StoreError::Constraint { table: "school_years", .. }));
        assert_eq!(store.load().await.unwrap(), swapped);
    }

    #[tokio::test]
    async fn test_commit_publishes_writer_state() {
        let store = MemoryStore::new();
        let rows = sample();
        let mut writer = store.begin().await;
        let summary = apply_row_sets(&mut writer, &rows).await.unwrap();
        assert_eq!(summary.students.upserted, 1);
        assert!(store.load().await.unwrap().is_empty());

        store.commit(writer).await;
        assert_eq!(store.load().await.unwrap(), rows);
    }
}
