use super::{validate_team_name, Validator};
use crate::{error::Error, store::version::Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type TeamId = i64;

/// The team an account belongs to, as seen from the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRef {
    pub id: TeamId,
    pub name: String,
}

/// Deployment metadata stored next to a team and updated with it.
#[derive(ToSchema, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMeta {
    #[serde(default)]
    pub git_url: String,
    #[serde(default)]
    pub server_url: String,
}

#[derive(Debug, Clone)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub meta: TeamMeta,
    pub num_members: i64,
    pub version: Version,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTeam {
    name: String,
    meta: TeamMeta,
}

impl NewTeam {
    /// # Errors
    /// `Error::Validation` when the name is blank.
    pub fn build(name: &str, meta: TeamMeta) -> Result<Self, Error> {
        let name = name.trim();

        let mut v = Validator::new();
        validate_team_name(&mut v, name);
        v.finish()?;

        Ok(Self {
            name: name.to_string(),
            meta,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn meta(&self) -> &TeamMeta {
        &self.meta
    }

    #[must_use]
    pub fn into_team(self, id: TeamId, created_at: DateTime<Utc>) -> Team {
        Team {
            id,
            name: self.name,
            meta: self.meta,
            num_members: 0,
            version: Version::INITIAL,
            created_at,
        }
    }
}
