//! Converts the nested workspace to table rows and back.
//!
//! Template bodies and report snapshots travel as whole JSON documents; only
//! identifiers and scalar report fields get their own columns.

use crate::db::{
    ModuleRow, RowSets, SchoolYearRow, StoreError, StudentRow, SyncRow, TemplateRow, UserRow,
};
use crate::domain::defaults::TemplateDefaults;
use crate::domain::models::{
    CompetencyCategory, CompetencyOption, Module, ReportTask, SchoolYear, StudentReport, Template,
    TemplateTask, User, Workspace,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Shape of `module_templates.data`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TemplateDocument {
    note: String,
    group_feature_enabled: bool,
    class_name: String,
    teacher: String,
    evaluation_date: String,
    coaching_date: String,
    operational_competence: String,
    competency_options: Vec<CompetencyOption>,
    competencies: Vec<CompetencyCategory<TemplateTask>>,
}

impl From<&Template> for TemplateDocument {
    fn from(t: &Template) -> Self {
        Self {
            note: t.note.clone(),
            group_feature_enabled: t.group_feature_enabled,
            class_name: t.class_name.clone(),
            teacher: t.teacher.clone(),
            evaluation_date: t.evaluation_date.clone(),
            coaching_date: t.coaching_date.clone(),
            operational_competence: t.operational_competence.clone(),
            competency_options: t.competency_options.clone(),
            competencies: t.competencies.clone(),
        }
    }
}

fn to_json<T: Serialize>(table: &'static str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Malformed {
        table,
        detail: e.to_string(),
    })
}

fn from_json<T: for<'de> Deserialize<'de>>(
    table: &'static str,
    value: Value,
) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Malformed {
        table,
        detail: e.to_string(),
    })
}

pub fn flatten(workspace: &Workspace) -> Result<RowSets, StoreError> {
    let mut rows = RowSets::default();

    for (idx, user) in workspace.users.iter().enumerate() {
        rows.users.push(UserRow {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            salt: user.salt.clone(),
            token: user.token.clone(),
            position: idx as i32,
        });
    }

    for (year_idx, year) in workspace.school_years.iter().enumerate() {
        rows.school_years.push(SchoolYearRow {
            id: year.id,
            label: year.label.clone(),
            position: year_idx as i32,
        });
        for (module_idx, module) in year.modules.iter().enumerate() {
            rows.modules.push(ModuleRow {
                id: module.id,
                school_year_id: year.id,
                title: module.title.clone(),
                position: module_idx as i32,
            });
            for (evaluation_type, template) in &module.templates {
                rows.templates.push(TemplateRow {
                    module_id: module.id,
                    evaluation_type: evaluation_type.clone(),
                    data: to_json(TemplateRow::TABLE, &TemplateDocument::from(template))?,
                });
            }
        }
    }

    for (idx, student) in workspace.students.iter().enumerate() {
        rows.students.push(StudentRow {
            id: student.id,
            module_id: student.module_id,
            evaluation_type: student.evaluation_type.clone(),
            teacher_id: student.teacher_id,
            name: student.name.clone(),
            firstname: student.firstname.clone(),
            note: student.note.clone(),
            group_name: student.group_name.clone(),
            class_name: student.class_name.clone(),
            teacher: student.teacher.clone(),
            evaluation_date: student.evaluation_date.clone(),
            coaching_date: student.coaching_date.clone(),
            operational_competence: student.operational_competence.clone(),
            competency_options: to_json(StudentRow::TABLE, &student.competency_options)?,
            competencies: to_json(StudentRow::TABLE, &student.competencies)?,
            position: idx as i32,
        });
    }

    Ok(rows)
}

pub fn hydrate(rows: RowSets, defaults: &TemplateDefaults) -> Result<Workspace, StoreError> {
    let users = rows
        .users
        .into_iter()
        .map(|r| User {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            salt: r.salt,
            token: r.token,
        })
        .collect();

    let mut templates_by_module: HashMap<Uuid, Vec<TemplateRow>> = HashMap::new();
    for row in rows.templates {
        templates_by_module.entry(row.module_id).or_default().push(row);
    }

    let mut modules_by_year: HashMap<Uuid, Vec<ModuleRow>> = HashMap::new();
    for row in rows.modules {
        modules_by_year.entry(row.school_year_id).or_default().push(row);
    }

    let mut school_years = Vec::with_capacity(rows.school_years.len());
    for year_row in rows.school_years {
        let mut module_rows = modules_by_year.remove(&year_row.id).unwrap_or_default();
        module_rows.sort_by_key(|m| m.position);

        let mut modules = Vec::with_capacity(module_rows.len());
        for module_row in module_rows {
            let mut templates = BTreeMap::new();
            for template_row in templates_by_module.remove(&module_row.id).unwrap_or_default() {
                let doc: TemplateDocument = from_json(TemplateRow::TABLE, template_row.data)?;
                templates.insert(
                    template_row.evaluation_type.clone(),
                    Template {
                        module_id: module_row.id,
                        module_title: module_row.title.clone(),
                        school_year: year_row.label.clone(),
                        evaluation_type: template_row.evaluation_type,
                        note: doc.note,
                        group_feature_enabled: doc.group_feature_enabled,
                        class_name: doc.class_name,
                        teacher: doc.teacher,
                        evaluation_date: doc.evaluation_date,
                        coaching_date: doc.coaching_date,
                        operational_competence: doc.operational_competence,
                        competency_options: doc.competency_options,
                        competencies: doc.competencies,
                    },
                );
            }
            modules.push(Module {
                id: module_row.id,
                title: module_row.title,
                school_year: year_row.label.clone(),
                templates,
            });
        }

        school_years.push(SchoolYear {
            id: year_row.id,
            label: year_row.label,
            modules,
        });
    }

    let mut workspace = Workspace {
        school_years,
        students: Vec::with_capacity(rows.students.len()),
        users,
    };

    let mut student_rows = rows.students;
    student_rows.sort_by_key(|s| s.position);
    for row in student_rows {
        let Some(module) = workspace.module(row.module_id) else {
            tracing::warn!(student_id = %row.id, module_id = %row.module_id, "Dropping report of unknown module");
            continue;
        };
        let template = defaults.template_for(module, &row.evaluation_type);
        let competency_options: Vec<CompetencyOption> =
            from_json(StudentRow::TABLE, row.competency_options)?;
        let competencies: Vec<CompetencyCategory<ReportTask>> =
            from_json(StudentRow::TABLE, row.competencies)?;

        workspace.students.push(StudentReport {
            id: row.id,
            module_id: row.module_id,
            evaluation_type: row.evaluation_type,
            teacher_id: row.teacher_id,
            name: row.name,
            firstname: row.firstname,
            note: row.note,
            group_name: row.group_name,
            class_name: row.class_name,
            teacher: row.teacher,
            evaluation_date: row.evaluation_date,
            coaching_date: row.coaching_date,
            operational_competence: row.operational_competence,
            competency_options,
            competencies,
            module_title: template.module_title,
            school_year: template.school_year,
        });
    }

    Ok(workspace)
}

/// Recomputes every field that is derived rather than stored, and drops
/// reports whose module is gone. `hydrate(flatten(w))` equals `normalize(w)`.
pub fn normalize(mut workspace: Workspace, defaults: &TemplateDefaults) -> Workspace {
    for year in workspace.school_years.iter_mut() {
        for module in year.modules.iter_mut() {
            module.school_year = year.label.clone();
            for (evaluation_type, template) in module.templates.iter_mut() {
                template.module_id = module.id;
                template.module_title = module.title.clone();
                template.school_year = year.label.clone();
                template.evaluation_type = evaluation_type.clone();
            }
        }
    }

    let mut students = std::mem::take(&mut workspace.students);
    students.retain_mut(|student| match workspace.module(student.module_id) {
        Some(module) => {
            let template = defaults.template_for(module, &student.evaluation_type);
            student.module_title = template.module_title;
            student.school_year = template.school_year;
            true
        }
        None => false,
    });
    workspace.students = students;
    workspace
}
