//! Application service over the in-memory workspace and its store.
//!
//! Every mutation works on a copy of the last committed workspace. The copy
//! is flattened and written with one `replace_all`; only when that commits
//! does it become the current state. A failed write leaves the previous
//! state untouched.
//!
//! When stored rows cannot be read the service starts empty and refuses
//! every write, so the unreadable rows are never diffed away.

use crate::db::{mapper, Store, StoreError};
use crate::domain::defaults::TemplateDefaults;
use crate::domain::models::{Module, SchoolYear, StudentReport, Template, User, Workspace};
use crate::domain::reconcile::{apply_template_to_reports, new_report, sync_report};
use crate::domain::status_migration;
use crate::services::credentials;
use crate::services::export::{self, DocumentRenderer, RenderError, RenderedDocument};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("credential error: {0}")]
    Credentials(String),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("stored data is unreadable, writes are disabled: {0}")]
    ReadOnly(String),
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;

/// Fields the editing surface supplies when starting a report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewStudent {
    pub module_id: Uuid,
    pub evaluation_type: String,
    pub teacher_id: Option<Uuid>,
    pub name: String,
    pub firstname: String,
    pub group_name: String,
    pub note: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub module_id: Option<Uuid>,
    pub evaluation_type: Option<String>,
}

pub struct WorkspaceService {
    store: Arc<dyn Store>,
    defaults: TemplateDefaults,
    current: Mutex<Workspace>,
    /// Set when the stored rows failed to load.
    read_only: Option<String>,
}

impl WorkspaceService {
    /// Reads the store, runs the pending status migration and hydrates.
    /// Malformed stored state is logged and replaced by an empty, read-only
    /// workspace.
    pub async fn load(store: Arc<dyn Store>, defaults: TemplateDefaults) -> Result<Self> {
        let mut rows = store.load().await?;
        let stored_version = store.status_schema_version().await?;

        let loaded = match status_migration::run(
            stored_version,
            rows.students.iter_mut().map(|s| &mut s.competencies),
        ) {
            Ok(report) => {
                if report.ran {
                    store.replace_all(&rows).await?;
                    store.set_status_schema_version(report.version).await?;
                    tracing::info!(
                        "Status migration v{} applied, {} values rewritten",
                        report.version,
                        report.statuses_rewritten
                    );
                }
                mapper::hydrate(rows, &defaults).map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };

        let (workspace, read_only) = match loaded {
            Ok(workspace) => (workspace, None),
            Err(reason) => {
                tracing::error!("Stored workspace is unreadable, starting empty and read-only: {}", reason);
                (Workspace::default(), Some(reason))
            }
        };

        tracing::info!(
            "Workspace loaded: {} school years, {} reports, {} users",
            workspace.school_years.len(),
            workspace.students.len(),
            workspace.users.len()
        );

        Ok(Self {
            store,
            defaults,
            current: Mutex::new(workspace),
            read_only,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.is_some()
    }

    pub async fn snapshot(&self) -> Workspace {
        self.current.lock().await.clone()
    }

    /// Persists `next` and, once committed, makes its normalized form
    /// current so memory always matches what a reload would produce.
    async fn commit(&self, current: &mut MutexGuard<'_, Workspace>, next: Workspace) -> Result<()> {
        if let Some(reason) = &self.read_only {
            return Err(WorkspaceError::ReadOnly(reason.clone()));
        }
        let rows = mapper::flatten(&next)?;
        if let Err(e) = self.store.replace_all(&rows).await {
            tracing::error!("Workspace save rolled back: {}", e);
            return Err(e.into());
        }
        **current = mapper::normalize(next, &self.defaults);
        Ok(())
    }

    pub async fn school_years(&self) -> Vec<SchoolYear> {
        self.current.lock().await.school_years.clone()
    }

    pub async fn create_school_year(&self, label: &str) -> Result<SchoolYear> {
        let label = label.trim();
        if label.is_empty() {
            return Err(WorkspaceError::Validation("label is required".into()));
        }

        let mut current = self.current.lock().await;
        if current.school_years.iter().any(|y| y.label == label) {
            return Err(WorkspaceError::Conflict(format!("school year {label} exists")));
        }
        let mut next = current.clone();
        let year = SchoolYear::new(label);
        next.school_years.push(year.clone());
        self.commit(&mut current, next).await?;
        Ok(year)
    }

    pub async fn create_module(&self, school_year_id: Uuid, title: &str) -> Result<Module> {
        let title = title.trim();
        if title.is_empty() {
            return Err(WorkspaceError::Validation("title is required".into()));
        }

        let mut current = self.current.lock().await;
        let mut next = current.clone();
        let year = next
            .school_years
            .iter_mut()
            .find(|y| y.id == school_year_id)
            .ok_or(WorkspaceError::NotFound("school year"))?;
        let module = Module {
            id: Uuid::new_v4(),
            title: title.to_string(),
            school_year: year.label.clone(),
            templates: BTreeMap::new(),
        };
        year.modules.push(module.clone());
        self.commit(&mut current, next).await?;
        Ok(module)
    }

    pub async fn rename_school_year(&self, id: Uuid, label: &str) -> Result<SchoolYear> {
        let label = label.trim();
        if label.is_empty() {
            return Err(WorkspaceError::Validation("label is required".into()));
        }

        let mut current = self.current.lock().await;
        if current.school_years.iter().any(|y| y.label == label && y.id != id) {
            return Err(WorkspaceError::Conflict(format!("school year {label} exists")));
        }
        let mut next = current.clone();
        let year = next
            .school_years
            .iter_mut()
            .find(|y| y.id == id)
            .ok_or(WorkspaceError::NotFound("school year"))?;
        year.label = label.to_string();
        self.commit(&mut current, next).await?;
        current
            .school_years
            .iter()
            .find(|y| y.id == id)
            .cloned()
            .ok_or(WorkspaceError::NotFound("school year"))
    }

    /// Removes a school year with its modules, templates and reports.
    pub async fn delete_school_year(&self, id: Uuid) -> Result<()> {
        let mut current = self.current.lock().await;
        if !current.school_years.iter().any(|y| y.id == id) {
            return Err(WorkspaceError::NotFound("school year"));
        }
        let mut next = current.clone();
        next.school_years.retain(|y| y.id != id);
        let before = next.students.len();
        self.commit(&mut current, next).await?;
        tracing::info!(
            "School year {} deleted with {} reports",
            id,
            before - current.students.len()
        );
        Ok(())
    }

    pub async fn rename_module(&self, id: Uuid, title: &str) -> Result<Module> {
        let title = title.trim();
        if title.is_empty() {
            return Err(WorkspaceError::Validation("title is required".into()));
        }

        let mut current = self.current.lock().await;
        let mut next = current.clone();
        next.module_mut(id)
            .ok_or(WorkspaceError::NotFound("module"))?
            .title = title.to_string();
        self.commit(&mut current, next).await?;
        current
            .module(id)
            .cloned()
            .ok_or(WorkspaceError::NotFound("module"))
    }

    /// Removes a module with its templates and reports.
    pub async fn delete_module(&self, id: Uuid) -> Result<()> {
        let mut current = self.current.lock().await;
        if current.module(id).is_none() {
            return Err(WorkspaceError::NotFound("module"));
        }
        let mut next = current.clone();
        for year in next.school_years.iter_mut() {
            year.modules.retain(|m| m.id != id);
        }
        let before = next.students.len();
        self.commit(&mut current, next).await?;
        tracing::info!(
            "Module {} deleted with {} reports",
            id,
            before - current.students.len()
        );
        Ok(())
    }

    /// Stored template for the pair, or the built-in default bound to it.
    pub async fn template(&self, module_id: Uuid, evaluation_type: &str) -> Result<Template> {
        let current = self.current.lock().await;
        let module = current
            .module(module_id)
            .ok_or(WorkspaceError::NotFound("module"))?;
        Ok(self.defaults.template_for(module, evaluation_type))
    }

    /// Replaces the template of a (module, evaluation type) pair and
    /// re-applies it to every report of that pair. Returns the stored
    /// template and how many reports were updated.
    pub async fn replace_template(
        &self,
        module_id: Uuid,
        evaluation_type: &str,
        mut template: Template,
    ) -> Result<(Template, usize)> {
        let evaluation_type = evaluation_type.trim();
        if evaluation_type.is_empty() {
            return Err(WorkspaceError::Validation("evaluation type is required".into()));
        }
        if let Some(code) = template.duplicate_option_code() {
            return Err(WorkspaceError::Validation(format!(
                "competency code {code} is defined twice"
            )));
        }

        let unresolved = template
            .competencies
            .iter()
            .flat_map(|c| &c.items)
            .filter(|t| !t.competency_id.is_empty() && template.option(&t.competency_id).is_none())
            .count();
        if unresolved > 0 {
            tracing::warn!(
                "Template {}/{} has {} tasks with undefined competency codes",
                module_id,
                evaluation_type,
                unresolved
            );
        }

        let mut current = self.current.lock().await;
        let mut next = current.clone();
        let module = next
            .module_mut(module_id)
            .ok_or(WorkspaceError::NotFound("module"))?;

        template.module_id = module.id;
        template.module_title = module.title.clone();
        template.school_year = module.school_year.clone();
        template.evaluation_type = evaluation_type.to_string();
        module
            .templates
            .insert(evaluation_type.to_string(), template.clone());

        let updated = apply_template_to_reports(&template, &mut next.students);
        self.commit(&mut current, next).await?;
        tracing::info!(
            "Template {}/{} saved with {} tasks, {} reports reconciled",
            module_id,
            evaluation_type,
            template.task_count(),
            updated
        );
        Ok((template, updated))
    }

    /// Drops the stored template of a pair. Its reports fall back to the
    /// built-in default and are re-synced the next time they are opened.
    pub async fn delete_template(&self, module_id: Uuid, evaluation_type: &str) -> Result<()> {
        let mut current = self.current.lock().await;
        let mut next = current.clone();
        let module = next
            .module_mut(module_id)
            .ok_or(WorkspaceError::NotFound("module"))?;
        if module.templates.remove(evaluation_type).is_none() {
            return Err(WorkspaceError::NotFound("template"));
        }
        self.commit(&mut current, next).await
    }

    pub async fn list_students(&self, filter: &StudentFilter) -> Vec<StudentReport> {
        let current = self.current.lock().await;
        current
            .students
            .iter()
            .filter(|s| filter.module_id.map_or(true, |id| s.module_id == id))
            .filter(|s| {
                filter
                    .evaluation_type
                    .as_deref()
                    .map_or(true, |t| s.evaluation_type == t)
            })
            .cloned()
            .collect()
    }

    /// Opens a report against its current template. A report whose
    /// snapshot drifted from the template is saved back in synced form.
    pub async fn open_student(&self, id: Uuid) -> Result<StudentReport> {
        let mut current = self.current.lock().await;
        let stored = current
            .student(id)
            .ok_or(WorkspaceError::NotFound("student"))?
            .clone();

        let mut synced = stored.clone();
        sync_report(&self.effective_template(&current, &synced), &mut synced);
        if synced != stored {
            let mut next = current.clone();
            if let Some(slot) = next.students.iter_mut().find(|s| s.id == id) {
                *slot = synced.clone();
            }
            self.commit(&mut current, next).await?;
            tracing::debug!("Report {} re-synced on open", id);
        }
        Ok(synced)
    }

    pub async fn create_student(&self, draft: NewStudent) -> Result<StudentReport> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(WorkspaceError::Validation("name is required".into()));
        }
        if draft.evaluation_type.trim().is_empty() {
            return Err(WorkspaceError::Validation("evaluation type is required".into()));
        }

        let mut current = self.current.lock().await;
        self.check_teacher(&current, draft.teacher_id)?;
        let module = current
            .module(draft.module_id)
            .ok_or(WorkspaceError::NotFound("module"))?;
        let template = self.defaults.template_for(module, draft.evaluation_type.trim());

        let mut report = new_report(&template, name, draft.firstname.trim());
        report.teacher_id = draft.teacher_id;
        report.group_name = draft.group_name;
        report.note = draft.note;

        let mut next = current.clone();
        next.students.push(report.clone());
        self.commit(&mut current, next).await?;
        Ok(report)
    }

    /// Saves an edited report. Structure is re-derived from the template so
    /// only assessment state and per-student fields are taken from `report`.
    pub async fn update_student(&self, id: Uuid, mut report: StudentReport) -> Result<StudentReport> {
        if report.name.trim().is_empty() {
            return Err(WorkspaceError::Validation("name is required".into()));
        }
        let evaluation_type = report.evaluation_type.trim().to_string();
        if evaluation_type.is_empty() {
            return Err(WorkspaceError::Validation("evaluation type is required".into()));
        }
        report.evaluation_type = evaluation_type;

        let mut current = self.current.lock().await;
        if current.student(id).is_none() {
            return Err(WorkspaceError::NotFound("student"));
        }
        if current.module(report.module_id).is_none() {
            return Err(WorkspaceError::NotFound("module"));
        }
        self.check_teacher(&current, report.teacher_id)?;

        report.id = id;
        sync_report(&self.effective_template(&current, &report), &mut report);

        let mut next = current.clone();
        if let Some(slot) = next.students.iter_mut().find(|s| s.id == id) {
            *slot = report.clone();
        }
        self.commit(&mut current, next).await?;
        Ok(report)
    }

    pub async fn delete_student(&self, id: Uuid) -> Result<()> {
        let mut current = self.current.lock().await;
        if current.student(id).is_none() {
            return Err(WorkspaceError::NotFound("student"));
        }
        let mut next = current.clone();
        next.students.retain(|s| s.id != id);
        self.commit(&mut current, next).await
    }

    /// Renders the synced form of a report.
    pub async fn export_student(
        &self,
        id: Uuid,
        renderer: &dyn DocumentRenderer,
    ) -> Result<RenderedDocument> {
        let report = self.open_student(id).await?;
        let document = export::export(&report, renderer)?;
        tracing::info!("Exported report {} as {}", id, document.filename);
        Ok(document)
    }

    pub async fn users(&self) -> Vec<User> {
        self.current.lock().await.users.clone()
    }

    pub async fn create_user(&self, draft: NewUser) -> Result<User> {
        let name = draft.name.trim();
        let email = draft.email.trim().to_lowercase();
        if name.is_empty() || email.is_empty() {
            return Err(WorkspaceError::Validation("name and email are required".into()));
        }
        if draft.password.is_empty() {
            return Err(WorkspaceError::Validation("password is required".into()));
        }

        let mut current = self.current.lock().await;
        if current.users.iter().any(|u| u.email == email) {
            return Err(WorkspaceError::Conflict(format!("email {email} is taken")));
        }

        let hashed = credentials::hash_password(&draft.password)
            .map_err(|e| WorkspaceError::Credentials(e.to_string()))?;
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            password_hash: hashed.hash,
            salt: hashed.salt,
            token: credentials::generate_token(),
        };

        let mut next = current.clone();
        next.users.push(user.clone());
        self.commit(&mut current, next).await?;
        Ok(user)
    }

    /// Removes a user. Reports they taught keep their text fields and lose
    /// the link.
    pub async fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut current = self.current.lock().await;
        if !current.users.iter().any(|u| u.id == id) {
            return Err(WorkspaceError::NotFound("user"));
        }
        let mut next = current.clone();
        next.users.retain(|u| u.id != id);
        for student in next.students.iter_mut() {
            if student.teacher_id == Some(id) {
                student.teacher_id = None;
            }
        }
        self.commit(&mut current, next).await
    }

    fn effective_template(&self, workspace: &Workspace, report: &StudentReport) -> Template {
        match workspace.module(report.module_id) {
            Some(module) => self.defaults.template_for(module, &report.evaluation_type),
            None => self.defaults.orphan_template(report),
        }
    }

    fn check_teacher(&self, workspace: &Workspace, teacher_id: Option<Uuid>) -> Result<()> {
        match teacher_id {
            Some(id) if !workspace.users.iter().any(|u| u.id == id) => {
                Err(WorkspaceError::NotFound("teacher"))
            }
            _ => Ok(()),
        }
    }
}
