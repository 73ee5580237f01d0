//! Revision scripts: one SQL file per revision with a comment header and upgrade/downgrade
//! sections.
//!
//! ```text
//! -- Revision ID: 3b937294d244
//! -- Revises: ed09fc88935e
//! -- Create Date: 2024-06-25 15:27:09.172006
//! -- Message: Add_table_Fff
//!
//! -- +upgrade
//! CREATE TABLE "fff" (...);
//!
//! -- +downgrade
//! DROP TABLE "fff";
//! ```

use crate::error::AppError;
use serde::Serialize;
use std::path::{Path, PathBuf};

const REVISION_ID: &str = "-- Revision ID:";
const REVISES: &str = "-- Revises:";
const CREATE_DATE: &str = "-- Create Date:";
const MESSAGE: &str = "-- Message:";
const UPGRADE_MARKER: &str = "-- +upgrade";
const DOWNGRADE_MARKER: &str = "-- +downgrade";

pub const CREATE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionScript {
    pub id: String,
    pub parents: Vec<String>,
    pub message: String,
    pub create_date: String,
    pub upgrade_sql: String,
    pub downgrade_sql: String,
    pub path: PathBuf,
}

/// Read-only view of a revision as listed by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RevisionRecord {
    pub revision_id: String,
    pub parent: Option<String>,
    pub path: String,
    pub message: String,
    pub create_date: String,
}

impl From<&RevisionScript> for RevisionRecord {
    fn from(script: &RevisionScript) -> Self {
        RevisionRecord {
            revision_id: script.id.clone(),
            parent: if script.parents.is_empty() {
                None
            } else {
                Some(script.parents.join(", "))
            },
            path: script.path.display().to_string(),
            message: script.message.clone(),
            create_date: script.create_date.clone(),
        }
    }
}

#[derive(PartialEq)]
enum Section {
    Header,
    Upgrade,
    Downgrade,
}

impl RevisionScript {
    /// Twelve hex characters taken from a random UUID.
    pub fn new_id() -> String {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        hex[hex.len() - 12..].to_string()
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self, AppError> {
        let mut id = None;
        let mut parents = Vec::new();
        let mut message = String::new();
        let mut create_date = String::new();
        let mut upgrade = Vec::new();
        let mut downgrade = Vec::new();
        let mut section = Section::Header;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed == UPGRADE_MARKER {
                section = Section::Upgrade;
                continue;
            }
            if trimmed == DOWNGRADE_MARKER {
                section = Section::Downgrade;
                continue;
            }
            match section {
                Section::Header => {
                    if let Some(v) = trimmed.strip_prefix(REVISION_ID) {
                        id = Some(v.trim().to_string());
                    } else if let Some(v) = trimmed.strip_prefix(REVISES) {
                        parents = v
                            .split(',')
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(String::from)
                            .collect();
                    } else if let Some(v) = trimmed.strip_prefix(CREATE_DATE) {
                        create_date = v.trim().to_string();
                    } else if let Some(v) = trimmed.strip_prefix(MESSAGE) {
                        message = v.trim().to_string();
                    }
                }
                Section::Upgrade => upgrade.push(line),
                Section::Downgrade => downgrade.push(line),
            }
        }

        let id = id.filter(|i| !i.is_empty()).ok_or_else(|| {
            AppError::Migration(format!("{}: missing '{}' header", path.display(), REVISION_ID))
        })?;
        Ok(RevisionScript {
            id,
            parents,
            message,
            create_date,
            upgrade_sql: upgrade.join("\n").trim().to_string(),
            downgrade_sql: downgrade.join("\n").trim().to_string(),
            path: path.to_path_buf(),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "{} {}\n{} {}\n{} {}\n{} {}\n\n{}\n{}\n\n{}\n{}\n",
            REVISION_ID,
            self.id,
            REVISES,
            self.parents.join(", "),
            CREATE_DATE,
            self.create_date,
            MESSAGE,
            self.message,
            UPGRADE_MARKER,
            self.upgrade_sql,
            DOWNGRADE_MARKER,
            self.downgrade_sql,
        )
    }
}

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_message(message: &str) -> String {
    message
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// File name slug: lowercase words joined by `_`, at most 40 characters.
pub fn slugify(message: &str) -> String {
    let words: Vec<String> = message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    let mut slug = String::new();
    for word in words {
        let extra = if slug.is_empty() { word.len() } else { word.len() + 1 };
        if slug.len() + extra > 40 {
            break;
        }
        if !slug.is_empty() {
            slug.push('_');
        }
        slug.push_str(&word);
    }
    slug
}

pub fn file_name(id: &str, message: &str) -> String {
    let slug = slugify(message);
    if slug.is_empty() {
        format!("{}.sql", id)
    } else {
        format!("{}_{}.sql", id, slug)
    }
}
