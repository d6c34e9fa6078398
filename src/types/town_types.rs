use super::identifiers::{RigId, TownId};
use crate::error::{GastownError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BRANCH: &str = "main";

/// A user's workspace: a set of rigs sharing one execution sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Town {
    pub id: TownId,
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One tracked repository. Only the name changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rig {
    pub id: RigId,
    pub town_id: TownId,
    pub name: String,
    pub git_url: String,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRig {
    pub town_id: TownId,
    pub name: String,
    pub git_url: String,
    pub default_branch: Option<String>,
}

impl NewRig {
    #[must_use]
    pub fn new(town_id: TownId, name: impl Into<String>, git_url: impl Into<String>) -> Self {
        Self {
            town_id,
            name: name.into(),
            git_url: git_url.into(),
            default_branch: None,
        }
    }

    #[must_use]
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }

    #[must_use]
    pub fn default_branch(&self) -> &str {
        self.default_branch
            .as_deref()
            .filter(|branch| !branch.trim().is_empty())
            .unwrap_or(DEFAULT_BRANCH)
    }

    /// # Errors
    /// Returns `Validation` for a blank name, an unusable git URL or a bad branch.
    pub fn validate(&self) -> Result<()> {
        validate_rig_name(&self.name)?;
        validate_git_url(&self.git_url)?;
        super::review_queue::validate_branch(self.default_branch())
    }
}

/// # Errors
/// Returns `Validation` for a blank name.
pub fn validate_rig_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GastownError::Validation(
            "rig name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Accepts absolute URLs (`https://`, `ssh://`, `file://`) and scp-like
/// `user@host:path` remotes.
///
/// # Errors
/// Returns `Validation` when neither form matches.
pub fn validate_git_url(git_url: &str) -> Result<()> {
    let trimmed = git_url.trim();
    if url::Url::parse(trimmed).is_ok_and(|parsed| parsed.has_host() || parsed.scheme() == "file")
    {
        return Ok(());
    }

    let scp_like = trimmed
        .split_once(':')
        .filter(|(authority, path)| {
            authority.contains('@') && !authority.contains('/') && !path.is_empty()
        })
        .is_some();
    if scp_like {
        Ok(())
    } else {
        Err(GastownError::Validation(format!(
            "git url '{git_url}' is neither a URL nor a user@host:path remote"
        )))
    }
}
