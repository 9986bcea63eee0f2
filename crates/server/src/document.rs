//! Layout model for the printable permit document.
//!
//! A permit is broken into blocks with estimated heights in points. Blocks are laid out
//! top to bottom; a block that would push the cursor past [`PAGE_BREAK_Y`] starts a new
//! page. The resulting pages are handed to the template in [`crate::pdf`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use permitdesk_core::domain::approval::PermitApproval;
use permitdesk_core::domain::permit::{ChecklistItem, PermitRequest};
use permitdesk_core::domain::worker::Worker;

pub const PAGE_START_Y: f32 = 50.0;
pub const PAGE_BREAK_Y: f32 = 700.0;

const HEADER_HEIGHT: f32 = 120.0;
const SUMMARY_HEIGHT: f32 = 140.0;
const LOCATION_HEIGHT: f32 = 80.0;
const SIGNATURE_HEIGHT: f32 = 90.0;
const TABLE_BASE_HEIGHT: f32 = 40.0;
const WORKER_ROW_HEIGHT: f32 = 20.0;
const CHECKLIST_ROW_HEIGHT: f32 = 18.0;
const LIST_BASE_HEIGHT: f32 = 30.0;
const LIST_ROW_HEIGHT: f32 = 16.0;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRow {
    pub name: String,
    pub phone: String,
    pub company: String,
    pub trade: String,
    pub badge_number: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureLine {
    pub role: String,
    pub decision: String,
    pub approver_name: String,
    pub comment: String,
    pub signature: String,
    pub signed_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Header { company_name: String, verification_url: String, status: String },
    Summary {
        permit_id: String,
        title: String,
        work_type: String,
        priority: String,
        description: String,
        contractor: String,
    },
    Workers { rows: Vec<WorkerRow> },
    LocationDuration { location: String, start: String, end: String, duration_hours: i64 },
    Checklist { items: Vec<ChecklistItem> },
    BulletList { title: String, items: Vec<String> },
    Signature(SignatureLine),
}

impl Block {
    pub fn estimated_height(&self) -> f32 {
        match self {
            Self::Header { .. } => HEADER_HEIGHT,
            Self::Summary { .. } => SUMMARY_HEIGHT,
            Self::Workers { rows } => TABLE_BASE_HEIGHT + WORKER_ROW_HEIGHT * rows.len() as f32,
            Self::LocationDuration { .. } => LOCATION_HEIGHT,
            Self::Checklist { items } => {
                TABLE_BASE_HEIGHT + CHECKLIST_ROW_HEIGHT * items.len() as f32
            }
            Self::BulletList { items, .. } => {
                LIST_BASE_HEIGHT + LIST_ROW_HEIGHT * items.len() as f32
            }
            Self::Signature(_) => SIGNATURE_HEIGHT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub number: usize,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitDocument {
    pub permit_id: String,
    pub title: String,
    pub generated_at: String,
    pub pages: Vec<Page>,
}

impl PermitDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Inputs that do not come from the permit rows themselves.
#[derive(Clone, Debug)]
pub struct DocumentContext<'a> {
    pub company_name: &'a str,
    pub public_base_url: &'a str,
    pub generated_at: DateTime<Utc>,
}

fn text(value: Option<&str>) -> String {
    value.map(str::trim).filter(|value| !value.is_empty()).unwrap_or("-").to_string()
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn verification_url(public_base_url: &str, permit: &PermitRequest) -> String {
    format!("{}/api/permits/{}/public", public_base_url.trim_end_matches('/'), permit.id)
}

/// Builds the ordered block list for a permit. Registered workers take precedence over the
/// crew listed on the permit itself.
pub fn blocks_for(
    context: &DocumentContext<'_>,
    permit: &PermitRequest,
    approvals: &[PermitApproval],
    workers: &[Worker],
) -> Vec<Block> {
    let mut blocks = vec![
        Block::Header {
            company_name: permit
                .company_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| context.company_name.to_string()),
            verification_url: verification_url(context.public_base_url, permit),
            status: permit.status.as_str().to_string(),
        },
        Block::Summary {
            permit_id: permit.id.0.clone(),
            title: permit.title.clone(),
            work_type: permit.work_type.label().to_string(),
            priority: permit.priority.as_str().to_string(),
            description: text(permit.description.as_deref()),
            contractor: match (&permit.contractor_name, &permit.contractor_phone) {
                (Some(name), Some(phone)) => format!("{name} ({phone})"),
                (Some(name), None) => name.clone(),
                _ => "-".to_string(),
            },
        },
    ];

    let crew: Vec<WorkerRow> = if workers.is_empty() {
        permit
            .workers
            .iter()
            .map(|entry| WorkerRow {
                name: entry.name.clone(),
                phone: text(entry.phone.as_deref()),
                company: text(entry.company.as_deref()),
                trade: text(entry.trade.as_deref()),
                badge_number: text(entry.badge_number.as_deref()),
            })
            .collect()
    } else {
        workers
            .iter()
            .map(|worker| WorkerRow {
                name: worker.name.clone(),
                phone: text(worker.phone.as_deref()),
                company: text(worker.company.as_deref()),
                trade: text(worker.trade.as_deref()),
                badge_number: text(worker.badge_number.as_deref()),
            })
            .collect()
    };
    blocks.push(Block::Workers { rows: crew });

    blocks.push(Block::LocationDuration {
        location: text(permit.location.as_deref()),
        start: stamp(permit.start_date),
        end: stamp(permit.end_date),
        duration_hours: permit.duration_hours(),
    });
    blocks.push(Block::Checklist { items: permit.effective_checklist() });

    for (title, items) in [
        ("Hazards", &permit.hazards),
        ("Precautions", &permit.precautions),
        ("Equipment", &permit.equipment),
    ] {
        if !items.is_empty() {
            blocks.push(Block::BulletList { title: title.to_string(), items: items.clone() });
        }
    }

    blocks.extend(approvals.iter().map(|approval| {
        Block::Signature(SignatureLine {
            role: approval.approver_role.label().to_string(),
            decision: approval.decision.as_str().to_string(),
            approver_name: text(approval.approver_name.as_deref()),
            comment: text(approval.comment.as_deref()),
            signature: text(approval.signature.as_deref()),
            signed_at: approval.approved_at.map(stamp).unwrap_or_else(|| "-".to_string()),
        })
    }));

    blocks
}

pub fn paginate(blocks: Vec<Block>) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut current = Vec::new();
    let mut cursor = PAGE_START_Y;

    for block in blocks {
        let height = block.estimated_height();
        if cursor + height > PAGE_BREAK_Y && !current.is_empty() {
            pages.push(Page { number: pages.len() + 1, blocks: std::mem::take(&mut current) });
            cursor = PAGE_START_Y;
        }
        cursor += height;
        current.push(block);
    }
    if !current.is_empty() {
        pages.push(Page { number: pages.len() + 1, blocks: current });
    }
    pages
}

pub fn layout(
    context: &DocumentContext<'_>,
    permit: &PermitRequest,
    approvals: &[PermitApproval],
    workers: &[Worker],
) -> PermitDocument {
    PermitDocument {
        permit_id: permit.id.0.clone(),
        title: permit.title.clone(),
        generated_at: stamp(context.generated_at),
        pages: paginate(blocks_for(context, permit, approvals, workers)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use permitdesk_core::domain::approval::PermitApproval;
    use permitdesk_core::domain::permit::{
        ChecklistAnswer, ChecklistItem, PermitDraft, PermitRequest, Priority, WorkType,
        WorkerEntry, DEFAULT_SAFETY_MEASURES,
    };
    use permitdesk_core::domain::user::UserId;

    use super::{layout, paginate, Block, DocumentContext, PAGE_BREAK_Y, PAGE_START_Y};

    fn permit(workers: usize) -> PermitRequest {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).single().expect("date");
        PermitDraft {
            title: "Weld pipe rack".to_string(),
            description: Some("Replace flange on line 4".to_string()),
            location: Some("Unit 2".to_string()),
            work_type: WorkType::HotWork,
            start_date: start,
            end_date: start + Duration::hours(10),
            priority: Priority::High,
            hazards: vec!["Fire".to_string(), "Fumes".to_string()],
            precautions: vec!["Fire watch".to_string()],
            equipment: Vec::new(),
            company_name: None,
            contractor_name: Some("Acme Welding".to_string()),
            contractor_phone: None,
            workers: (0..workers)
                .map(|index| WorkerEntry {
                    name: format!("Worker {index}"),
                    ..WorkerEntry::default()
                })
                .collect(),
            safety_checklist: Vec::new(),
        }
        .into_permit(UserId::new(), start)
    }

    fn context() -> DocumentContext<'static> {
        DocumentContext {
            company_name: "PermitDesk",
            public_base_url: "https://permits.example.com/",
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn small_permit_fits_two_pages_with_default_checklist() {
        let permit = permit(2);
        let approvals = vec![PermitApproval::pending_for(permit.id.clone(), Utc::now())];
        let document = layout(&context(), &permit, &approvals, &[]);
        assert_eq!(document.page_count(), 2);

        let blocks: Vec<&Block> = document.pages.iter().flat_map(|page| &page.blocks).collect();
        let Some(Block::Header { verification_url, company_name, status }) = blocks.first() else {
            panic!("first block should be the header");
        };
        assert_eq!(
            verification_url,
            &format!("https://permits.example.com/api/permits/{}/public", permit.id)
        );
        assert_eq!(company_name, "PermitDesk");
        assert_eq!(status, "PENDING");

        let checklist = blocks
            .iter()
            .find_map(|block| match block {
                Block::Checklist { items } => Some(items),
                _ => None,
            })
            .expect("checklist block");
        assert_eq!(checklist.len(), DEFAULT_SAFETY_MEASURES.len());
        assert!(checklist.iter().all(|item| item.answer == ChecklistAnswer::NotApplicable));

        // Empty equipment list is omitted.
        let lists = blocks.iter().filter(|block| matches!(block, Block::BulletList { .. })).count();
        assert_eq!(lists, 2);
        assert!(matches!(blocks.last(), Some(Block::Signature(_))));
    }

    #[test]
    fn custom_checklist_replaces_default() {
        let mut permit = permit(0);
        permit.safety_checklist =
            vec![ChecklistItem { item: "Gas test done".to_string(), answer: ChecklistAnswer::Yes }];
        let document = layout(&context(), &permit, &[], &[]);

        let items = document
            .pages
            .iter()
            .flat_map(|page| &page.blocks)
            .find_map(|block| match block {
                Block::Checklist { items } => Some(items.clone()),
                _ => None,
            })
            .expect("checklist");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item, "Gas test done");
    }

    #[test]
    fn no_page_overflows_unless_a_single_block_is_taller_than_a_page() {
        let permit = permit(40);
        let document = layout(&context(), &permit, &[], &[]);
        assert!(document.page_count() >= 2);

        for page in &document.pages {
            let used: f32 = page.blocks.iter().map(Block::estimated_height).sum();
            assert!(page.blocks.len() == 1 || PAGE_START_Y + used <= PAGE_BREAK_Y);
        }
        let numbers: Vec<usize> = document.pages.iter().map(|page| page.number).collect();
        assert_eq!(numbers, (1..=document.page_count()).collect::<Vec<_>>());
    }

    #[test]
    fn paginate_breaks_exactly_at_threshold() {
        // 50 + 120 + 140 + 80 + 90 + 90 + 90 = 660; the next 90 would reach 750.
        let mut blocks = vec![
            Block::Header {
                company_name: String::new(),
                verification_url: String::new(),
                status: String::new(),
            },
            Block::Summary {
                permit_id: String::new(),
                title: String::new(),
                work_type: String::new(),
                priority: String::new(),
                description: String::new(),
                contractor: String::new(),
            },
            Block::LocationDuration {
                location: String::new(),
                start: String::new(),
                end: String::new(),
                duration_hours: 0,
            },
        ];
        let signature = super::SignatureLine {
            role: String::new(),
            decision: String::new(),
            approver_name: String::new(),
            comment: String::new(),
            signature: String::new(),
            signed_at: String::new(),
        };
        for _ in 0..4 {
            blocks.push(Block::Signature(signature.clone()));
        }

        let pages = paginate(blocks);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].blocks.len(), 6);
        assert_eq!(pages[1].blocks.len(), 1);
        assert!(paginate(Vec::new()).is_empty());
    }
}
