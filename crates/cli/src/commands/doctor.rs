use std::path::Path;

use permitdesk_core::config::{AppConfig, LoadOptions};
use permitdesk_db::{connect_with_config, migrations};
use serde::Serialize;

use crate::commands::{exit_codes, CommandResult};

const PERMIT_TEMPLATE: &str = "permit.html.tera";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { exit_codes::DOCTOR } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            serde_json::json!({
                "overall_status": "fail",
                "summary": "doctor serialization failed",
                "error": error.to_string(),
            })
            .to_string()
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.extend(check_database(&config));
            checks.push(check_templates(&config.document.template_dir));
            checks.push(check_pdf_converter());
        }
        Err(error) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Fail,
                error.to_string(),
            ));
            for name in ["database_connectivity", "schema_migrations", "document_templates"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
            checks.push(check_pdf_converter());
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            )];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::new(
                        "schema_migrations",
                        CheckStatus::Skipped,
                        "skipped because the database is unreachable",
                    ),
                ];
            }
        };

        let connectivity = DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected using `{}`", config.database.url),
        );
        let schema = match migrations::pending_versions(&pool).await {
            Ok(pending) if pending.is_empty() => {
                DoctorCheck::new("schema_migrations", CheckStatus::Pass, "schema is up to date")
            }
            Ok(pending) => DoctorCheck::new(
                "schema_migrations",
                CheckStatus::Fail,
                format!("{} pending migration(s); run `permitdesk migrate`", pending.len()),
            ),
            Err(error) => DoctorCheck::new(
                "schema_migrations",
                CheckStatus::Fail,
                format!("could not read migration history: {error}"),
            ),
        };
        pool.close().await;

        vec![connectivity, schema]
    })
}

fn check_templates(template_dir: &str) -> DoctorCheck {
    let template = Path::new(template_dir).join(PERMIT_TEMPLATE);
    if template.is_file() {
        DoctorCheck::new(
            "document_templates",
            CheckStatus::Pass,
            format!("using `{}`", template.display()),
        )
    } else {
        DoctorCheck::new(
            "document_templates",
            CheckStatus::Warn,
            format!("`{}` not found; the built-in template will be used", template.display()),
        )
    }
}

fn check_pdf_converter() -> DoctorCheck {
    match which::which("wkhtmltopdf") {
        Ok(path) => DoctorCheck::new(
            "pdf_converter",
            CheckStatus::Pass,
            format!("wkhtmltopdf found at `{}`", path.display()),
        ),
        Err(_) => DoctorCheck::new(
            "pdf_converter",
            CheckStatus::Warn,
            "wkhtmltopdf not installed; permit documents will be served as HTML",
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{check_templates, CheckStatus};

    #[test]
    fn missing_template_directory_is_only_a_warning() {
        let check = check_templates("definitely/not/a/template/dir");
        assert_eq!(check.status, CheckStatus::Warn);
        assert!(check.details.contains("built-in template"));
    }

    #[test]
    fn present_template_passes() {
        let dir = tempfile::tempdir().expect("temp dir");
        std::fs::write(dir.path().join("permit.html.tera"), "<html></html>").expect("write");

        let check = check_templates(dir.path().to_str().expect("utf-8 path"));
        assert_eq!(check.status, CheckStatus::Pass);
    }
}
