//! Turning submitted idea batches into `idea` items.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::core::quality::payload::{IdeaPayload, PayloadLimits, assert_payload_limits};
use crate::io::paths::StagehandPaths;
use crate::io::store::{item_exists, list_items, save_item, validate_id};
use crate::item::Item;

const MAX_SLUG_LEN: usize = 40;

/// Parse a JSON array of idea payloads.
pub fn read_ideas(path: &Path) -> Result<Vec<IdeaPayload>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse ideas from {}", path.display()))
}

/// Validate the whole batch, then create one item per idea with ids continuing after
/// the highest existing numeric prefix.
///
/// Nothing is written unless every idea passes; oversized input is rejected, never
/// truncated.
pub fn ingest_ideas(
    paths: &StagehandPaths,
    limits: &PayloadLimits,
    ideas: &[IdeaPayload],
    now: DateTime<Utc>,
) -> Result<Vec<Item>> {
    assert_payload_limits(ideas, limits)?;
    if let Some(idx) = ideas.iter().position(|idea| idea.title.trim().is_empty()) {
        bail!("idea {}: title is empty", idx + 1);
    }

    let mut next = next_number(paths)?;
    let mut items = Vec::with_capacity(ideas.len());
    for idea in ideas {
        let id = format!("{next:03}-{}", slugify(&idea.title));
        validate_id(&id)?;
        if item_exists(paths, &id) {
            bail!("item {id} already exists");
        }
        items.push(Item::new(
            id,
            idea.title.trim(),
            render_overview(idea),
            now,
        ));
        next += 1;
    }

    for item in &items {
        save_item(paths, item)?;
        info!(item = %item.id, "ingested idea");
    }
    Ok(items)
}

fn next_number(paths: &StagehandPaths) -> Result<u32> {
    let highest = list_items(paths)?
        .iter()
        .filter_map(|item| {
            let digits: String = item.id.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        })
        .max();
    Ok(highest.map_or(1, |n| n + 1))
}

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "item".to_string()
    } else {
        slug.to_string()
    }
}

fn render_overview(idea: &IdeaPayload) -> String {
    let mut out = idea.description.trim().to_string();
    for (heading, entries) in [
        ("Success criteria", &idea.success_criteria),
        ("Technical constraints", &idea.technical_constraints),
        ("In scope", &idea.scope_in),
        ("Out of scope", &idea.scope_out),
    ] {
        if entries.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        let _ = write!(out, "{heading}:");
        for entry in entries {
            let _ = write!(out, "\n- {}", entry.trim());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::load_item;
    use crate::item::WorkflowState;
    use crate::test_support::{fixed_time, item_in};

    fn idea(title: &str) -> IdeaPayload {
        IdeaPayload {
            title: title.to_string(),
            description: "Let users pick a theme.".to_string(),
            success_criteria: vec!["toggle persists".to_string()],
            ..IdeaPayload::default()
        }
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Add dark mode!"), "add-dark-mode");
        assert_eq!(slugify("  --Fix: the (CLI) -- "), "fix-the-cli");
        assert_eq!(slugify("???"), "item");
        assert!(slugify(&"word ".repeat(30)).len() <= MAX_SLUG_LEN);
        assert!(!slugify(&"word ".repeat(30)).ends_with('-'));
    }

    #[test]
    fn ingest_numbers_after_existing_items() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StagehandPaths::new(temp.path());
        save_item(&paths, &item_in("004-old-thing", WorkflowState::Done)).expect("save");

        let items = ingest_ideas(
            &paths,
            &PayloadLimits::default(),
            &[idea("Add dark mode"), idea("Faster startup")],
            fixed_time(),
        )
        .expect("ingest");

        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, ["005-add-dark-mode", "006-faster-startup"]);
        let stored = load_item(&paths, "005-add-dark-mode").expect("load");
        assert_eq!(stored.state, WorkflowState::Idea);
        assert!(stored.overview.contains("Success criteria:\n- toggle persists"));
    }

    #[test]
    fn oversized_batch_writes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StagehandPaths::new(temp.path());
        let limits = PayloadLimits {
            max_title_length: 5,
            ..PayloadLimits::default()
        };

        let err = ingest_ideas(&paths, &limits, &[idea("ok"), idea("far too long")], fixed_time())
            .expect_err("rejected");

        assert!(err.to_string().contains("idea 2: title"));
        assert!(list_items(&paths).expect("list").is_empty());
    }

    #[test]
    fn empty_title_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StagehandPaths::new(temp.path());
        let err = ingest_ideas(&paths, &PayloadLimits::default(), &[idea("  ")], fixed_time())
            .expect_err("empty");
        assert!(err.to_string().contains("title is empty"));
    }
}
