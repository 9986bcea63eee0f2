//! JSON-text storage for list columns (hazards, precautions, equipment, workers, checklists,
//! role permissions).
//!
//! Reads never fail: absent, `null`, malformed or non-array text decodes to an empty list.

use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn encode_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_list<T: DeserializeOwned>(raw: Option<&str>) -> Vec<T> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(values)) => values
            .into_iter()
            .filter_map(|value| serde_json::from_value::<T>(value).ok())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_list, encode_list};
    use crate::domain::permit::{ChecklistAnswer, ChecklistItem, WorkerEntry};

    #[test]
    fn string_lists_keep_order_and_blank_items() {
        let hazards = vec!["Fire".to_string(), String::new(), "Smoke".to_string()];
        let encoded = encode_list(&hazards);
        assert_eq!(encoded, r#"["Fire","","Smoke"]"#);
        assert_eq!(decode_list::<String>(Some(&encoded)), hazards);
    }

    #[test]
    fn degraded_inputs_decode_to_empty() {
        assert!(decode_list::<String>(None).is_empty());
        assert!(decode_list::<String>(Some("")).is_empty());
        assert!(decode_list::<String>(Some("null")).is_empty());
        assert!(decode_list::<String>(Some("{\"a\":1}")).is_empty());
        assert!(decode_list::<String>(Some("[\"unterminated")).is_empty());
    }

    #[test]
    fn structured_items_use_camel_case_keys() {
        let workers = vec![WorkerEntry {
            name: "Ana".to_string(),
            badge_number: Some("B-1".to_string()),
            ..WorkerEntry::default()
        }];
        let encoded = encode_list(&workers);
        assert!(encoded.contains("\"badgeNumber\":\"B-1\""));

        let checklist: Vec<ChecklistItem> =
            decode_list(Some(r#"[{"item":"Gas test","answer":"N/A"}]"#));
        assert_eq!(checklist[0].answer, ChecklistAnswer::NotApplicable);
    }
}
