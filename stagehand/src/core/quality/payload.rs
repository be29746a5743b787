//! Size and shape limits for submitted idea batches.
//!
//! Oversized input is rejected with every violation listed; nothing is truncated.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bullets;

/// One submitted idea.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeaPayload {
    pub title: String,
    pub description: String,
    pub success_criteria: Vec<String>,
    pub technical_constraints: Vec<String>,
    pub scope_in: Vec<String>,
    pub scope_out: Vec<String>,
}

impl IdeaPayload {
    fn lists(&self) -> [(&'static str, &[String]); 4] {
        [
            ("success_criteria", &self.success_criteria),
            ("technical_constraints", &self.technical_constraints),
            ("scope_in", &self.scope_in),
            ("scope_out", &self.scope_out),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadLimits {
    pub max_ideas: usize,
    pub max_title_length: usize,
    pub max_description_length: usize,
    pub max_list_items: usize,
    pub max_total_bytes: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_ideas: 50,
            max_title_length: 120,
            max_description_length: 2000,
            max_list_items: 20,
            max_total_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadValidationResult {
    pub valid: bool,
    pub idea_count: usize,
    pub total_bytes: usize,
    pub errors: Vec<String>,
}

/// Aggregated rejection raised by [`assert_payload_limits`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("idea payload rejected ({} violations):\n{}", .errors.len(), bullets(.errors))]
pub struct PayloadValidationError {
    pub errors: Vec<String>,
}

/// Check every limit and collect all violations.
pub fn validate_payload_limits(
    ideas: &[IdeaPayload],
    limits: &PayloadLimits,
) -> PayloadValidationResult {
    let mut errors = Vec::new();

    if ideas.len() > limits.max_ideas {
        errors.push(format!(
            "too many ideas: {} (max {})",
            ideas.len(),
            limits.max_ideas
        ));
    }

    for (idx, idea) in ideas.iter().enumerate() {
        let n = idx + 1;
        let title_len = idea.title.chars().count();
        if title_len > limits.max_title_length {
            errors.push(format!(
                "idea {n}: title is {title_len} characters (max {})",
                limits.max_title_length
            ));
        }
        let description_len = idea.description.chars().count();
        if description_len > limits.max_description_length {
            errors.push(format!(
                "idea {n}: description is {description_len} characters (max {})",
                limits.max_description_length
            ));
        }
        for (field, items) in idea.lists() {
            if items.len() > limits.max_list_items {
                errors.push(format!(
                    "idea {n}: {field} has {} items (max {})",
                    items.len(),
                    limits.max_list_items
                ));
            }
        }
    }

    // Serializing plain strings and lists cannot fail.
    let total_bytes = serde_json::to_vec(ideas).map_or(0, |raw| raw.len());
    if total_bytes > limits.max_total_bytes {
        errors.push(format!(
            "payload is {total_bytes} bytes (max {})",
            limits.max_total_bytes
        ));
    }

    PayloadValidationResult {
        valid: errors.is_empty(),
        idea_count: ideas.len(),
        total_bytes,
        errors,
    }
}

/// Like [`validate_payload_limits`] but fails with every violation at once.
pub fn assert_payload_limits(
    ideas: &[IdeaPayload],
    limits: &PayloadLimits,
) -> Result<(), PayloadValidationError> {
    let result = validate_payload_limits(ideas, limits);
    if result.valid {
        return Ok(());
    }
    Err(PayloadValidationError {
        errors: result.errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idea(title: &str) -> IdeaPayload {
        IdeaPayload {
            title: title.to_string(),
            description: "A description".to_string(),
            ..IdeaPayload::default()
        }
    }

    #[test]
    fn accepts_payload_within_limits() {
        let result =
            validate_payload_limits(&[idea("One"), idea("Two")], &PayloadLimits::default());
        assert!(result.valid);
        assert_eq!(result.idea_count, 2);
        assert!(result.total_bytes > 0);
    }

    #[test]
    fn collects_every_violation_with_one_based_index() {
        let limits = PayloadLimits {
            max_ideas: 1,
            max_title_length: 5,
            max_description_length: 5,
            max_list_items: 1,
            max_total_bytes: 100_000,
        };
        let mut second = idea("Far too long");
        second.scope_out = vec!["a".to_string(), "b".to_string()];

        let result = validate_payload_limits(&[idea("Ok"), second], &limits);

        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.starts_with("too many ideas: 2")));
        assert!(result.errors.iter().any(|e| e.starts_with("idea 2: title")));
        assert!(result.errors.iter().any(|e| e.starts_with("idea 1: description")));
        assert!(result.errors.iter().any(|e| e.starts_with("idea 2: scope_out")));
    }

    #[test]
    fn rejects_oversized_payload() {
        let limits = PayloadLimits {
            max_total_bytes: 10,
            ..PayloadLimits::default()
        };
        let result = validate_payload_limits(&[idea("One")], &limits);
        assert!(result.errors.iter().any(|e| e.contains("bytes")));
    }

    #[test]
    fn assert_lists_all_violations_as_bullets() {
        let limits = PayloadLimits {
            max_title_length: 1,
            ..PayloadLimits::default()
        };
        let err = assert_payload_limits(&[idea("abc"), idea("def")], &limits).expect_err("reject");
        let message = err.to_string();
        assert!(message.contains("2 violations"));
        assert!(message.contains("\n- idea 1: title"));
        assert!(message.contains("\n- idea 2: title"));
    }
}
