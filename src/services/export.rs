//! Hand-off to the document renderer.

use crate::domain::models::{CompetencyOption, StudentReport, TaskStatus};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render failed: {0}")]
    Failed(String),
}

/// A report with every reference resolved, ready for layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedReport {
    pub name: String,
    pub firstname: String,
    pub module_title: String,
    pub school_year: String,
    pub evaluation_type: String,
    pub class_name: String,
    pub group_name: String,
    pub teacher: String,
    pub evaluation_date: String,
    pub coaching_date: String,
    pub operational_competence: String,
    pub note: String,
    pub categories: Vec<FinalizedCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedCategory {
    pub category: String,
    pub items: Vec<FinalizedTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedTask {
    pub task: String,
    /// `None` when the task points at a code the report does not define.
    pub competency: Option<CompetencyOption>,
    pub status: TaskStatus,
    pub comment: String,
}

impl FinalizedReport {
    pub fn from_report(report: &StudentReport) -> Self {
        let resolve = |code: &str| {
            report
                .competency_options
                .iter()
                .find(|o| !code.is_empty() && o.code == code)
                .cloned()
        };

        Self {
            name: report.name.clone(),
            firstname: report.firstname.clone(),
            module_title: report.module_title.clone(),
            school_year: report.school_year.clone(),
            evaluation_type: report.evaluation_type.clone(),
            class_name: report.class_name.clone(),
            group_name: report.group_name.clone(),
            teacher: report.teacher.clone(),
            evaluation_date: report.evaluation_date.clone(),
            coaching_date: report.coaching_date.clone(),
            operational_competence: report.operational_competence.clone(),
            note: report.note.clone(),
            categories: report
                .competencies
                .iter()
                .map(|c| FinalizedCategory {
                    category: c.category.clone(),
                    items: c
                        .items
                        .iter()
                        .map(|t| FinalizedTask {
                            task: t.display_text().to_string(),
                            competency: resolve(&t.competency_id),
                            status: t.status,
                            comment: t.comment.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

pub trait DocumentRenderer: Send + Sync {
    fn content_type(&self) -> &'static str;
    fn extension(&self) -> &'static str;
    fn render(&self, report: &FinalizedReport) -> Result<Vec<u8>, RenderError>;
}

pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
}

pub fn export(
    report: &StudentReport,
    renderer: &dyn DocumentRenderer,
) -> Result<RenderedDocument, RenderError> {
    let finalized = FinalizedReport::from_report(report);
    let bytes = renderer.render(&finalized)?;
    Ok(RenderedDocument {
        bytes,
        filename: suggested_filename(&report.name, &report.firstname, renderer.extension()),
        content_type: renderer.content_type(),
    })
}

/// `Name_Firstname.ext`, restricted to characters safe in a header and on disk.
pub fn suggested_filename(name: &str, firstname: &str, extension: &str) -> String {
    let clean = |part: &str| -> String {
        part.trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    };
    let stem = [clean(name), clean(firstname)]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let stem = if stem.is_empty() { "report".to_string() } else { stem };
    format!("{stem}.{extension}")
}

/// Minimal built-in renderer producing a UTF-8 text document.
pub struct PlainTextRenderer {
    pub generated_on: NaiveDate,
}

impl DocumentRenderer for PlainTextRenderer {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, report: &FinalizedReport) -> Result<Vec<u8>, RenderError> {
        let mut out = String::new();
        write_text(&mut out, report, self.generated_on).map_err(|e| RenderError::Failed(e.to_string()))?;
        Ok(out.into_bytes())
    }
}

fn write_text(out: &mut String, r: &FinalizedReport, generated_on: NaiveDate) -> std::fmt::Result {
    writeln!(out, "{} - {} ({})", r.module_title, r.evaluation_type, r.school_year)?;
    writeln!(out, "Student: {} {}", r.name, r.firstname)?;
    if !r.group_name.is_empty() {
        writeln!(out, "Group: {}", r.group_name)?;
    }
    writeln!(out, "Class: {}", r.class_name)?;
    writeln!(out, "Teacher: {}", r.teacher)?;
    writeln!(out, "Evaluation date: {}", r.evaluation_date)?;
    writeln!(out, "Coaching date: {}", r.coaching_date)?;
    writeln!(out, "Operational competence: {}", r.operational_competence)?;

    for category in &r.categories {
        writeln!(out)?;
        writeln!(out, "## {}", category.category)?;
        for item in &category.items {
            let competency = item
                .competency
                .as_ref()
                .map(|c| format!(" [{}]", c.code))
                .unwrap_or_default();
            writeln!(out, "- {}{}: {}", item.task, competency, item.status.label())?;
            if !item.comment.is_empty() {
                writeln!(out, "    {}", item.comment)?;
            }
        }
    }

    if !r.note.is_empty() {
        writeln!(out)?;
        writeln!(out, "Note: {}", r.note)?;
    }
    writeln!(out)?;
    writeln!(out, "Generated on {}", generated_on.format("%Y-%m-%d"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CompetencyCategory, ReportTask};

    fn report() -> StudentReport {
        StudentReport {
            name: "Müller".into(),
            firstname: "Anna Lena".into(),
            module_title: "Networks".into(),
            competency_options: vec![CompetencyOption {
                code: "OO2".into(),
                description: "Configure".into(),
            }],
            competencies: vec![CompetencyCategory {
                category: "DNS".into(),
                items: vec![
                    ReportTask {
                        task: "Verify name resolution".into(),
                        competency_id: "OO2".into(),
                        status: TaskStatus::NeedsImprovement,
                        comment: "slow".into(),
                        ..Default::default()
                    },
                    ReportTask {
                        task: "Check reverse lookup".into(),
                        competency_id: "OO9".into(),
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_unresolved_competency_is_absent() {
        let finalized = FinalizedReport::from_report(&report());
        let items = &finalized.categories[0].items;
        assert_eq!(items[0].competency.as_ref().map(|c| c.code.as_str()), Some("OO2"));
        assert!(items[1].competency.is_none());
    }

    #[test]
    fn test_filename_from_student_name() {
        assert_eq!(suggested_filename("Müller", "Anna Lena", "txt"), "Müller_Anna_Lena.txt");
        assert_eq!(suggested_filename("O'Neil", "", "pdf"), "O_Neil.pdf");
        assert_eq!(suggested_filename(" ", "", "txt"), "report.txt");
    }

    #[test]
    fn test_plain_text_export() {
        let renderer = PlainTextRenderer {
            generated_on: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        };
        let doc = export(&report(), &renderer).unwrap();
        let text = String::from_utf8(doc.bytes).unwrap();
        assert_eq!(doc.filename, "Müller_Anna_Lena.txt");
        assert!(text.contains("- Verify name resolution [OO2]: Needs improvement"));
        assert!(text.contains("    slow"));
        assert!(text.contains("- Check reverse lookup: -"));
        assert!(text.ends_with("Generated on 2026-10-19\n"));
    }
}
