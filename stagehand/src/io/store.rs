//! Item and requirements-document persistence with schema validation.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::paths::StagehandPaths;
use super::write_atomic;
use crate::item::Item;
use crate::prd::Prd;

const PRD_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/prd.schema.json"
));

static PRD_VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(PRD_SCHEMA).map_err(|err| format!("parse prd schema: {err}"))?;
    jsonschema::validator_for(&schema).map_err(|err| format!("compile prd schema: {err}"))
});

/// Validate that an id is safe for use in branch names and paths.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("id must not be empty"));
    }
    if id == "." || id == ".." {
        return Err(anyhow!("id must not be '.' or '..'"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}

pub fn item_exists(paths: &StagehandPaths, id: &str) -> bool {
    paths.item(id).item_path.is_file()
}

pub fn load_item(paths: &StagehandPaths, id: &str) -> Result<Item> {
    validate_id(id)?;
    let path = paths.item(id).item_path;
    debug!(path = %path.display(), "loading item");
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read item {}", path.display()))?;
    let item: Item = serde_json::from_str(&contents)
        .with_context(|| format!("parse item {}", path.display()))?;
    if item.id != id {
        bail!(
            "item {} declares id '{}' (expected '{id}')",
            path.display(),
            item.id
        );
    }
    Ok(item)
}

/// Atomically write `item.json` (temp file + rename).
pub fn save_item(paths: &StagehandPaths, item: &Item) -> Result<()> {
    validate_id(&item.id)?;
    let path = paths.item(&item.id).item_path;
    debug!(path = %path.display(), state = %item.state, "writing item");
    write_json(&path, item)
}

/// Every item under `.stagehand/items/`, sorted by id.
pub fn list_items(paths: &StagehandPaths) -> Result<Vec<Item>> {
    if !paths.items_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(&paths.items_dir)
        .with_context(|| format!("read {}", paths.items_dir.display()))?
    {
        let entry = entry.with_context(|| format!("read {}", paths.items_dir.display()))?;
        if !entry.path().join("item.json").is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            ids.push(name.to_string());
        }
    }
    ids.sort();
    ids.iter().map(|id| load_item(paths, id)).collect()
}

/// Load `prd.json`, validating it against the embedded schema first.
pub fn load_prd(path: &Path) -> Result<Prd> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read prd {}", path.display()))?;
    parse_prd(&contents).with_context(|| format!("load prd {}", path.display()))
}

/// Parse and schema-check requirements JSON.
pub fn parse_prd(raw: &str) -> Result<Prd> {
    let value: Value = serde_json::from_str(raw).context("parse prd json")?;
    let validator = PRD_VALIDATOR.as_ref().map_err(|err| anyhow!("{err}"))?;
    let messages: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    let prd: Prd = serde_json::from_value(value).context("deserialize prd")?;
    Ok(prd)
}

/// Like [`load_prd`] but absence or invalid content yields `None`.
pub fn try_load_prd(path: &Path) -> Option<Prd> {
    if !path.is_file() {
        return None;
    }
    match load_prd(path) {
        Ok(prd) => Some(prd),
        Err(err) => {
            debug!(path = %path.display(), err = %format!("{err:#}"), "prd unreadable");
            None
        }
    }
}

pub fn save_prd(path: &Path, prd: &Prd) -> Result<()> {
    write_json(path, prd)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_atomic(path, &buf)
}
