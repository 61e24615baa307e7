//! Re-applies a template onto student reports.
//!
//! The template is the only source of structure: categories and tasks come
//! out in template order, exactly as many as the template defines. Prior
//! report state (status, comment) is carried over by matching categories on
//! their label and tasks on their stable id or, failing that, their text.
//! Renaming a task's text therefore resets its assessment.

use crate::domain::models::{CompetencyCategory, ReportTask, StudentReport, Template, TemplateTask};
use uuid::Uuid;

/// Rebuilds a report's competency tree from `template`, keeping the
/// assessment state of every task that still exists.
pub fn reconcile(
    template: &Template,
    existing: &[CompetencyCategory<ReportTask>],
) -> Vec<CompetencyCategory<ReportTask>> {
    template
        .competencies
        .iter()
        .enumerate()
        .map(|(idx, category)| {
            let occurrence = template.competencies[..idx]
                .iter()
                .filter(|c| c.category == category.category)
                .count();
            let prior = nth_or_first(existing, occurrence, |c| c.category == category.category);
            CompetencyCategory {
                category: category.category.clone(),
                items: reconcile_items(&category.items, prior.map(|c| c.items.as_slice())),
            }
        })
        .collect()
}

fn reconcile_items(items: &[TemplateTask], prior: Option<&[ReportTask]>) -> Vec<ReportTask> {
    let prior = prior.unwrap_or_default();
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let matched = item
                .id
                .and_then(|id| prior.iter().find(|p| p.id == Some(id)))
                .or_else(|| {
                    let occurrence = items[..idx].iter().filter(|i| i.task == item.task).count();
                    nth_or_first(prior, occurrence, |p| p.matches_text(&item.task))
                });

            let (status, comment) = matched
                .map(|p| (p.status, p.comment.clone()))
                .unwrap_or_default();

            ReportTask {
                id: item.id,
                task: item.task.clone(),
                label: None,
                competency_id: item.competency_id.clone(),
                status,
                comment,
            }
        })
        .collect()
}

/// Picks the `n`-th element matching `pred`, or the first match when there
/// are fewer than `n + 1`. Pairing duplicates by occurrence keeps repeated
/// reconciliation stable when a template repeats a label.
fn nth_or_first<T>(items: &[T], n: usize, pred: impl Fn(&T) -> bool) -> Option<&T> {
    let mut matches = items.iter().filter(|item| pred(item));
    let first = matches.next()?;
    if n == 0 {
        return Some(first);
    }
    Some(matches.nth(n - 1).unwrap_or(first))
}

/// Copies the template's structural fields onto `report` and reconciles its
/// competency tree. Per-student fields are left alone.
pub fn sync_report(template: &Template, report: &mut StudentReport) {
    report.class_name = template.class_name.clone();
    report.teacher = template.teacher.clone();
    report.evaluation_date = template.evaluation_date.clone();
    report.coaching_date = template.coaching_date.clone();
    report.operational_competence = template.operational_competence.clone();
    report.competency_options = template.competency_options.clone();
    report.competencies = reconcile(template, &report.competencies);
    report.module_title = template.module_title.clone();
    report.school_year = template.school_year.clone();
}

/// Bulk apply after a template edit. Returns how many reports were touched.
pub fn apply_template_to_reports(template: &Template, reports: &mut [StudentReport]) -> usize {
    let mut updated = 0;
    for report in reports.iter_mut().filter(|r| {
        r.module_id == template.module_id && r.evaluation_type == template.evaluation_type
    }) {
        sync_report(template, report);
        updated += 1;
    }
    updated
}

/// Starts a fresh report from the current template snapshot.
pub fn new_report(template: &Template, name: &str, firstname: &str) -> StudentReport {
    let mut report = StudentReport {
        id: Uuid::new_v4(),
        module_id: template.module_id,
        evaluation_type: template.evaluation_type.clone(),
        name: name.to_string(),
        firstname: firstname.to_string(),
        ..Default::default()
    };
    sync_report(template, &mut report);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CompetencyOption, TaskStatus};

    fn category(label: &str, tasks: &[(&str, &str)]) -> CompetencyCategory<TemplateTask> {
        CompetencyCategory {
            category: label.to_string(),
            items: tasks
                .iter()
                .map(|(task, code)| TemplateTask::new(*task, *code))
                .collect(),
        }
    }

    fn assessed(task: &str, status: TaskStatus, comment: &str) -> ReportTask {
        ReportTask {
            task: task.to_string(),
            status,
            comment: comment.to_string(),
            ..Default::default()
        }
    }

    fn dns_template() -> Template {
        Template {
            module_id: Uuid::new_v4(),
            evaluation_type: "summative".into(),
            competency_options: vec![
                CompetencyOption { code: "OO2".into(), description: "Operate".into() },
                CompetencyOption { code: "OO3".into(), description: "Diagnose".into() },
            ],
            competencies: vec![category("DNS", &[("Verify name resolution", "OO3")])],
            ..Default::default()
        }
    }

    #[test]
    fn test_dns_relink_and_new_task() {
        let mut template = dns_template();
        let prior = vec![CompetencyCategory {
            category: "DNS".into(),
            items: vec![ReportTask {
                competency_id: "OO3".into(),
                ..assessed("Verify name resolution", TaskStatus::NeedsImprovement, "slow")
            }],
        }];

        template.competencies = vec![category(
            "DNS",
            &[("Verify name resolution", "OO2"), ("Check reverse lookup", "OO3")],
        )];
        let out = reconcile(&template, &prior);

        assert_eq!(out.len(), 1);
        let items = &out[0].items;
        assert_eq!(items[0].task, "Verify name resolution");
        assert_eq!(items[0].competency_id, "OO2");
        assert_eq!(items[0].status, TaskStatus::NeedsImprovement);
        assert_eq!(items[0].comment, "slow");
        assert_eq!(items[1].task, "Check reverse lookup");
        assert_eq!(items[1].status, TaskStatus::Unset);
        assert_eq!(items[1].comment, "");
    }

    #[test]
    fn test_structure_follows_template_order() {
        let template = Template {
            competencies: vec![
                category("B", &[("b2", ""), ("b1", "")]),
                category("A", &[("a1", "")]),
            ],
            ..Default::default()
        };
        let prior = vec![
            CompetencyCategory {
                category: "A".into(),
                items: vec![assessed("a1", TaskStatus::Ok, ""), assessed("gone", TaskStatus::Ok, "")],
            },
            CompetencyCategory {
                category: "Removed".into(),
                items: vec![assessed("x", TaskStatus::Ok, "")],
            },
            CompetencyCategory {
                category: "B".into(),
                items: vec![assessed("b1", TaskStatus::NotAssessed, "later"), assessed("b2", TaskStatus::Ok, "")],
            },
        ];

        let out = reconcile(&template, &prior);
        let shape: Vec<(&str, Vec<&str>)> = out
            .iter()
            .map(|c| (c.category.as_str(), c.items.iter().map(|i| i.task.as_str()).collect()))
            .collect();
        assert_eq!(shape, vec![("B", vec!["b2", "b1"]), ("A", vec!["a1"])]);
        assert_eq!(out[0].items[1].status, TaskStatus::NotAssessed);
        assert_eq!(out[0].items[1].comment, "later");
        assert_eq!(out[1].items[0].status, TaskStatus::Ok);
    }

    #[test]
    fn test_state_preserved_for_unchanged_task_text() {
        let template = Template {
            competencies: vec![category("Domain", &[("Join a workstation to the domain", "OO1")])],
            ..Default::default()
        };
        let prior = vec![CompetencyCategory {
            category: "Domain".into(),
            items: vec![assessed("Join a workstation to the domain", TaskStatus::Ok, "done well")],
        }];
        let out = reconcile(&template, &prior);
        assert_eq!(out[0].items[0].status, TaskStatus::Ok);
        assert_eq!(out[0].items[0].comment, "done well");
    }

    #[test]
    fn test_renamed_task_resets_assessment() {
        let template = Template {
            competencies: vec![category("DNS", &[("Verify resolution", "")])],
            ..Default::default()
        };
        let prior = vec![CompetencyCategory {
            category: "DNS".into(),
            items: vec![assessed("Verify name resolution", TaskStatus::Ok, "fine")],
        }];
        let out = reconcile(&template, &prior);
        assert_eq!(out[0].items[0].status, TaskStatus::Unset);
        assert!(out[0].items[0].comment.is_empty());
    }

    #[test]
    fn test_legacy_label_field_matches() {
        let template = Template {
            competencies: vec![category("DNS", &[("Verify name resolution", "OO3")])],
            ..Default::default()
        };
        let prior = vec![CompetencyCategory {
            category: "DNS".into(),
            items: vec![ReportTask {
                label: Some("Verify name resolution".into()),
                status: TaskStatus::Ok,
                comment: "legacy".into(),
                ..Default::default()
            }],
        }];
        let out = reconcile(&template, &prior);
        assert_eq!(out[0].items[0].status, TaskStatus::Ok);
        assert_eq!(out[0].items[0].comment, "legacy");
        assert_eq!(out[0].items[0].task, "Verify name resolution");
        assert!(out[0].items[0].label.is_none());
    }

    #[test]
    fn test_label_matches_when_task_text_differs() {
        let template = Template {
            competencies: vec![category("DNS", &[("Verify name resolution", "OO3")])],
            ..Default::default()
        };
        let prior = vec![CompetencyCategory {
            category: "DNS".into(),
            items: vec![ReportTask {
                task: "Check resolver".into(),
                label: Some("Verify name resolution".into()),
                status: TaskStatus::NeedsImprovement,
                comment: "retry".into(),
                ..Default::default()
            }],
        }];
        let out = reconcile(&template, &prior);
        assert_eq!(out[0].items[0].status, TaskStatus::NeedsImprovement);
        assert_eq!(out[0].items[0].comment, "retry");
    }

    #[test]
    fn test_stable_id_survives_rename() {
        let id = Uuid::new_v4();
        let template = Template {
            competencies: vec![CompetencyCategory {
                category: "DNS".into(),
                items: vec![TemplateTask {
                    id: Some(id),
                    task: "Check forward resolution".into(),
                    competency_id: String::new(),
                }],
            }],
            ..Default::default()
        };
        let prior = vec![CompetencyCategory {
            category: "DNS".into(),
            items: vec![ReportTask {
                id: Some(id),
                ..assessed("Verify name resolution", TaskStatus::Ok, "kept")
            }],
        }];
        let out = reconcile(&template, &prior);
        assert_eq!(out[0].items[0].comment, "kept");
        assert_eq!(out[0].items[0].task, "Check forward resolution");
    }

    #[test]
    fn test_reconcile_is_idempotent_with_duplicate_labels() {
        let template = Template {
            competencies: vec![
                category("A", &[("x", ""), ("t", "")]),
                category("A", &[("y", ""), ("t", "")]),
            ],
            ..Default::default()
        };
        let prior = vec![CompetencyCategory {
            category: "A".into(),
            items: vec![
                assessed("y", TaskStatus::Ok, "y"),
                assessed("t", TaskStatus::Ok, "t1"),
                assessed("t", TaskStatus::NeedsImprovement, "t2"),
            ],
        }];

        let once = reconcile(&template, &prior);
        let twice = reconcile(&template, &once);
        assert_eq!(once, twice);
        assert_eq!(once[1].items[0].status, TaskStatus::Ok);
    }

    #[test]
    fn test_bulk_and_lazy_paths_agree() {
        let template = dns_template();
        let mut report = new_report(&template, "Doe", "Jane");
        report.competencies[0].items[0].status = TaskStatus::Ok;
        report.note = "keep me".into();

        let mut bulk = vec![report.clone()];
        let mut lazy = report.clone();
        let mut other = StudentReport {
            evaluation_type: "formative".into(),
            module_id: template.module_id,
            ..Default::default()
        };

        assert_eq!(apply_template_to_reports(&template, &mut bulk), 1);
        sync_report(&template, &mut lazy);
        assert_eq!(bulk[0], lazy);
        assert_eq!(lazy.note, "keep me");

        assert_eq!(apply_template_to_reports(&template, std::slice::from_mut(&mut other)), 0);
        assert!(other.competencies.is_empty());
    }

    #[test]
    fn test_new_report_starts_unset() {
        let template = dns_template();
        let report = new_report(&template, "Doe", "Jane");
        assert_eq!(report.module_id, template.module_id);
        assert_eq!(report.competency_options.len(), 2);
        assert!(report
            .competencies
            .iter()
            .flat_map(|c| &c.items)
            .all(|t| t.status == TaskStatus::Unset && t.comment.is_empty()));
    }
}
