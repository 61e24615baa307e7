use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// High-level graded objective a task can be linked to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetencyOption {
    pub code: String,
    pub description: String,
}

/// Assessment mark of a single task on a student report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[default]
    Unset,
    Ok,
    NeedsImprovement,
    NotAssessed,
}

impl TaskStatus {
    pub fn as_code(&self) -> &'static str {
        match self {
            TaskStatus::Unset => "",
            TaskStatus::Ok => "OK",
            TaskStatus::NeedsImprovement => "NEEDS_IMPROVEMENT",
            TaskStatus::NotAssessed => "NOT_ASSESSED",
        }
    }

    /// Unknown codes degrade to `Unset` instead of failing the whole record.
    pub fn from_code(raw: &str) -> Self {
        match raw {
            "OK" => TaskStatus::Ok,
            "NEEDS_IMPROVEMENT" => TaskStatus::NeedsImprovement,
            "NOT_ASSESSED" => TaskStatus::NotAssessed,
            _ => TaskStatus::Unset,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Unset => "-",
            TaskStatus::Ok => "Acquired",
            TaskStatus::NeedsImprovement => "Needs improvement",
            TaskStatus::NotAssessed => "Not assessed",
        }
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_code())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Anything that is not a string (null, numbers, objects) reads as unset.
        let raw = Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(TaskStatus::from_code).unwrap_or_default())
    }
}

/// Task as defined on a template.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub task: String,
    /// Code of a `CompetencyOption`; empty when the task is not linked.
    pub competency_id: String,
}

impl TemplateTask {
    pub fn new(task: impl Into<String>, competency_id: impl Into<String>) -> Self {
        Self {
            id: None,
            task: task.into(),
            competency_id: competency_id.into(),
        }
    }
}

/// Task as carried on a student report: template structure plus assessment state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub task: String,
    /// Older records stored the task text under `label`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub competency_id: String,
    pub status: TaskStatus,
    pub comment: String,
}

impl ReportTask {
    /// Text shown for this task, falling back to the legacy `label`.
    pub fn display_text(&self) -> &str {
        if !self.task.is_empty() {
            return &self.task;
        }
        self.label.as_deref().unwrap_or_default()
    }

    /// True when `text` equals either the task text or the legacy label.
    pub fn matches_text(&self, text: &str) -> bool {
        self.task == text || self.label.as_deref() == Some(text)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetencyCategory<T> {
    pub category: String,
    pub items: Vec<T>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Template {
    pub module_id: Uuid,
    pub module_title: String,
    pub school_year: String,
    pub evaluation_type: String,
    pub note: String,
    pub group_feature_enabled: bool,
    pub class_name: String,
    pub teacher: String,
    pub evaluation_date: String,
    pub coaching_date: String,
    pub operational_competence: String,
    pub competency_options: Vec<CompetencyOption>,
    pub competencies: Vec<CompetencyCategory<TemplateTask>>,
}

impl Template {
    pub fn option(&self, code: &str) -> Option<&CompetencyOption> {
        if code.is_empty() {
            return None;
        }
        self.competency_options.iter().find(|o| o.code == code)
    }

    pub fn task_count(&self) -> usize {
        self.competencies.iter().map(|c| c.items.len()).sum()
    }

    /// Returns the first duplicated competency code, if any.
    pub fn duplicate_option_code(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.competency_options
            .iter()
            .map(|o| o.code.as_str())
            .find(|code| !seen.insert(*code))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Module {
    pub id: Uuid,
    pub title: String,
    pub school_year: String,
    /// evaluation type -> template
    pub templates: BTreeMap<String, Template>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchoolYear {
    pub id: Uuid,
    pub label: String,
    pub modules: Vec<Module>,
}

impl SchoolYear {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            modules: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentReport {
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
    pub competency_options: Vec<CompetencyOption>,
    pub competencies: Vec<CompetencyCategory<ReportTask>>,
    /// Display only, resolved from the owning template on load.
    pub module_title: String,
    /// Display only, resolved from the owning template on load.
    pub school_year: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub salt: String,
    #[serde(skip_serializing)]
    pub token: String,
}

/// The whole editable state: template tree, reports and users.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Workspace {
    pub school_years: Vec<SchoolYear>,
    pub students: Vec<StudentReport>,
    pub users: Vec<User>,
}

impl Workspace {
    pub fn module(&self, module_id: Uuid) -> Option<&Module> {
        self.school_years
            .iter()
            .flat_map(|y| y.modules.iter())
            .find(|m| m.id == module_id)
    }

    pub fn module_mut(&mut self, module_id: Uuid) -> Option<&mut Module> {
        self.school_years
            .iter_mut()
            .flat_map(|y| y.modules.iter_mut())
            .find(|m| m.id == module_id)
    }

    pub fn student(&self, id: Uuid) -> Option<&StudentReport> {
        self.students.iter().find(|s| s.id == id)
    }
}
