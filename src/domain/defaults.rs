use crate::domain::models::{
    CompetencyCategory, CompetencyOption, Module, StudentReport, Template, TemplateTask,
};
use chrono::{Datelike, NaiveDate};

/// Fallback template and first-run seed values, built once at startup and
/// passed to whoever needs them.
#[derive(Clone, Debug)]
pub struct TemplateDefaults {
    pub template: Template,
    pub seed_school_years: Vec<String>,
}

impl TemplateDefaults {
    pub fn new(seed_school_years: Vec<String>) -> Self {
        Self {
            template: builtin_template(),
            seed_school_years,
        }
    }

    /// Template for `module`/`evaluation_type`, or the built-in one bound to
    /// that pair when the module has none.
    pub fn template_for(&self, module: &Module, evaluation_type: &str) -> Template {
        module
            .templates
            .get(evaluation_type)
            .cloned()
            .unwrap_or_else(|| self.bound_default(module, evaluation_type))
    }

    pub fn bound_default(&self, module: &Module, evaluation_type: &str) -> Template {
        Template {
            module_id: module.id,
            module_title: module.title.clone(),
            school_year: module.school_year.clone(),
            evaluation_type: evaluation_type.to_string(),
            ..self.template.clone()
        }
    }

    /// Used for reports whose module no longer resolves at all.
    pub fn orphan_template(&self, report: &StudentReport) -> Template {
        Template {
            module_id: report.module_id,
            evaluation_type: report.evaluation_type.clone(),
            ..self.template.clone()
        }
    }
}

/// School-year labels seeded into an empty store: the current one and the next.
pub fn seed_school_year_labels(today: NaiveDate) -> Vec<String> {
    // School years start in August.
    let start = if today.month() >= 8 {
        today.year()
    } else {
        today.year() - 1
    };
    vec![
        format!("{}-{}", start, start + 1),
        format!("{}-{}", start + 1, start + 2),
    ]
}

fn builtin_template() -> Template {
    let task = |text: &str, code: &str| TemplateTask::new(text, code);
    Template {
        evaluation_type: "summative".to_string(),
        operational_competence: "Install and configure network services".to_string(),
        competency_options: vec![
            CompetencyOption {
                code: "OO1".to_string(),
                description: "Plan the installation".to_string(),
            },
            CompetencyOption {
                code: "OO2".to_string(),
                description: "Configure the service".to_string(),
            },
            CompetencyOption {
                code: "OO3".to_string(),
                description: "Test and document".to_string(),
            },
        ],
        competencies: vec![
            CompetencyCategory {
                category: "Preparation".to_string(),
                items: vec![
                    task("Read the assignment", "OO1"),
                    task("Prepare the workstation", "OO1"),
                ],
            },
            CompetencyCategory {
                category: "Realisation".to_string(),
                items: vec![
                    task("Configure the service", "OO2"),
                    task("Verify name resolution", "OO3"),
                ],
            },
            CompetencyCategory {
                category: "Documentation".to_string(),
                items: vec![task("Write the installation report", "OO3")],
            },
        ],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_seed_labels_follow_school_calendar() {
        let autumn = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(seed_school_year_labels(autumn), vec!["2026-2027", "2027-2028"]);

        let spring = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(seed_school_year_labels(spring), vec!["2025-2026", "2026-2027"]);
    }

    #[test]
    fn test_missing_template_falls_back_to_default() {
        let defaults = TemplateDefaults::new(Vec::new());
        let module = Module {
            id: Uuid::new_v4(),
            title: "Networks".into(),
            school_year: "2026-2027".into(),
            ..Default::default()
        };
        let template = defaults.template_for(&module, "formative");
        assert_eq!(template.module_id, module.id);
        assert_eq!(template.module_title, "Networks");
        assert_eq!(template.evaluation_type, "formative");
        assert!(template.task_count() > 0);
    }
}
