//! Permit document rendering.
//!
//! Pages produced by [`crate::document`] are rendered to HTML with Tera and converted to PDF
//! with `wkhtmltopdf` when it is installed. Without it, or when conversion fails, the HTML is
//! returned for browser printing.

use std::path::Path;
use std::process::Stdio;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use tera::{Context, Tera};
use tokio::process::Command;
use tracing::{error, info, warn};

use permitdesk_core::config::DocumentConfig;

use crate::document::PermitDocument;

pub const PERMIT_TEMPLATE: &str = "permit.html.tera";

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("template error: {0}")]
    Template(String),
    #[error("conversion error: {0}")]
    Conversion(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug)]
pub struct PdfGenerator {
    tera: Tera,
    company_name: String,
    wkhtmltopdf_path: Option<String>,
}

fn locate_wkhtmltopdf() -> Option<String> {
    let path = which::which("wkhtmltopdf").ok().map(|path| path.to_string_lossy().to_string());
    match &path {
        Some(found) => {
            info!(event_name = "system.pdf.converter_found", path = %found, "wkhtmltopdf found")
        }
        None => warn!(
            event_name = "system.pdf.converter_missing",
            "wkhtmltopdf not found in PATH - permit documents will be served as HTML"
        ),
    }
    path
}

impl PdfGenerator {
    /// Loads every template under `template_dir`.
    pub fn new(template_dir: &str, company_name: &str) -> Result<Self, PdfError> {
        let mut tera = Tera::new(&format!("{template_dir}/**/*"))
            .map_err(|error| PdfError::Template(error.to_string()))?;
        tera.autoescape_on(vec![".html.tera", ".html"]);
        if !tera.get_template_names().any(|name| name == PERMIT_TEMPLATE) {
            return Err(PdfError::Template(format!(
                "`{PERMIT_TEMPLATE}` not found in `{template_dir}`"
            )));
        }

        Ok(Self {
            tera,
            company_name: company_name.to_string(),
            wkhtmltopdf_path: locate_wkhtmltopdf(),
        })
    }

    /// Uses the template compiled into the binary.
    pub fn with_embedded_templates(company_name: &str) -> Result<Self, PdfError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html.tera", ".html"]);
        tera.add_raw_template(
            PERMIT_TEMPLATE,
            include_str!("../../../templates/permits/permit.html.tera"),
        )
        .map_err(|error| PdfError::Template(error.to_string()))?;

        Ok(Self {
            tera,
            company_name: company_name.to_string(),
            wkhtmltopdf_path: locate_wkhtmltopdf(),
        })
    }

    /// Prefers an on-disk template directory so deployments can restyle the document.
    pub fn from_config(config: &DocumentConfig) -> Result<Self, PdfError> {
        if Path::new(&config.template_dir).is_dir() {
            Self::new(&config.template_dir, &config.company_name)
        } else {
            info!(
                event_name = "system.pdf.embedded_templates",
                template_dir = %config.template_dir,
                "template directory missing, using embedded permit template"
            );
            Self::with_embedded_templates(&config.company_name)
        }
    }

    pub fn company_name(&self) -> &str {
        &self.company_name
    }

    pub fn render_html(&self, document: &PermitDocument) -> Result<String, PdfError> {
        let mut context = Context::new();
        context.insert("document", document);
        context.insert("company_name", &self.company_name);
        self.tera
            .render(PERMIT_TEMPLATE, &context)
            .map_err(|error| PdfError::Template(error.to_string()))
    }

    pub async fn render_permit(&self, document: &PermitDocument) -> Result<PdfResult, PdfError> {
        let html = self.render_html(document)?;

        let Some(wkhtmltopdf) = &self.wkhtmltopdf_path else {
            return Ok(PdfResult::Html(html));
        };
        match convert_html_to_pdf(&html, wkhtmltopdf).await {
            Ok(bytes) => Ok(PdfResult::Pdf(bytes)),
            Err(error) => {
                warn!(
                    event_name = "permit.pdf.conversion_failed",
                    permit_id = %document.permit_id,
                    error = %error,
                    "PDF conversion failed, falling back to HTML"
                );
                Ok(PdfResult::Html(html))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn without_converter(mut self) -> Self {
        self.wkhtmltopdf_path = None;
        self
    }
}

async fn convert_html_to_pdf(html: &str, wkhtmltopdf_path: &str) -> Result<Vec<u8>, PdfError> {
    let temp_dir = std::env::temp_dir();
    let stem = uuid::Uuid::new_v4().simple().to_string();
    let html_path = temp_dir.join(format!("permit_{stem}.html"));
    let pdf_path = temp_dir.join(format!("permit_{stem}.pdf"));

    tokio::fs::write(&html_path, html).await?;

    let output = Command::new(wkhtmltopdf_path)
        .args(["--page-size", "A4", "--encoding", "utf-8", "--quiet"])
        .args(["--margin-top", "10mm", "--margin-bottom", "10mm"])
        .args(["--margin-left", "10mm", "--margin-right", "10mm"])
        .arg(&html_path)
        .arg(&pdf_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let result = match output {
        Ok(output) if output.status.success() => {
            tokio::fs::read(&pdf_path).await.map_err(PdfError::from)
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            error!(
                event_name = "permit.pdf.wkhtmltopdf_failed",
                stderr = %stderr,
                "wkhtmltopdf failed"
            );
            Err(PdfError::Conversion(stderr))
        }
        Err(error) => Err(PdfError::Io(error)),
    };

    let _ = tokio::fs::remove_file(&html_path).await;
    let _ = tokio::fs::remove_file(&pdf_path).await;

    if let Ok(bytes) = &result {
        info!(event_name = "permit.pdf.generated", size = bytes.len(), "PDF generated");
    }
    result
}

pub enum PdfResult {
    Pdf(Vec<u8>),
    Html(String),
}

impl PdfResult {
    /// `stem` names the download without extension, e.g. `permit-<id>`.
    pub fn into_response(self, stem: &str) -> Response {
        match self {
            PdfResult::Pdf(bytes) => (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{stem}.pdf\"")),
                ],
                bytes,
            )
                .into_response(),
            PdfResult::Html(html) => (
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, format!("inline; filename=\"{stem}.html\"")),
                ],
                html,
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header;
    use chrono::{Duration, Utc};

    use permitdesk_core::domain::approval::PermitApproval;
    use permitdesk_core::domain::permit::{PermitDraft, Priority, WorkType};
    use permitdesk_core::domain::user::UserId;

    use super::{PdfGenerator, PdfResult};
    use crate::document::{layout, DocumentContext};

    fn document() -> crate::document::PermitDocument {
        let now = Utc::now();
        let permit = PermitDraft {
            title: "Boiler <inspection> & repair".to_string(),
            description: None,
            location: Some("Boiler house".to_string()),
            work_type: WorkType::ConfinedSpace,
            start_date: now,
            end_date: now + Duration::hours(4),
            priority: Priority::Critical,
            hazards: vec!["Oxygen deficiency".to_string()],
            precautions: Vec::new(),
            equipment: vec!["Gas detector".to_string()],
            company_name: None,
            contractor_name: None,
            contractor_phone: None,
            workers: Vec::new(),
            safety_checklist: Vec::new(),
        }
        .into_permit(UserId::new(), now);
        let approvals = vec![PermitApproval::pending_for(permit.id.clone(), now)];
        let context = DocumentContext {
            company_name: "Acme Refinery",
            public_base_url: "http://localhost:8080",
            generated_at: now,
        };
        layout(&context, &permit, &approvals, &[])
    }

    #[test]
    fn embedded_template_renders_every_block_and_escapes_input() {
        let generator = PdfGenerator::with_embedded_templates("Acme Refinery").expect("template");
        let html = generator.render_html(&document()).expect("render");

        assert!(html.contains("Acme Refinery"));
        assert!(html.contains("Boiler &lt;inspection&gt; &amp; repair"));
        assert!(html.contains("Oxygen deficiency"));
        assert!(html.contains("Gas detector"));
        assert!(html.contains("Confined Space Entry"));
        assert!(html.contains("Verify:"));
        assert!(html.contains("Page 1"));
    }

    #[tokio::test]
    async fn falls_back_to_html_without_converter() {
        let generator =
            PdfGenerator::with_embedded_templates("Acme").expect("template").without_converter();
        let result = generator.render_permit(&document()).await.expect("render");
        assert!(matches!(result, PdfResult::Html(_)));

        let response = result.into_response("permit-123");
        let content_type = response.headers().get(header::CONTENT_TYPE).expect("content type");
        assert_eq!(content_type.to_str().expect("ascii"), "text/html; charset=utf-8");
    }

    #[test]
    fn pdf_response_is_an_attachment() {
        let response = PdfResult::Pdf(b"%PDF-1.4".to_vec()).into_response("permit-abc");
        let disposition =
            response.headers().get(header::CONTENT_DISPOSITION).expect("disposition");
        assert_eq!(
            disposition.to_str().expect("ascii"),
            "attachment; filename=\"permit-abc.pdf\""
        );
    }

    #[test]
    fn missing_template_directory_is_an_error() {
        assert!(PdfGenerator::new("/definitely/not/here", "Acme").is_err());
    }
}
