//! Project + embedding storage for Crowdspace.
//!
//! Holds creators, projects (with their financials and cached embedding),
//! backers and pledges in SQLite.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod sqlite;

pub use sqlite::SqliteStore;

/// Raised when a platform or status string is not one of the known values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Crowdfunding platform hosting a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Kickstarter,
    Indiegogo,
    Gofundme,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Kickstarter, Platform::Indiegogo, Platform::Gofundme];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Kickstarter => "kickstarter",
            Platform::Indiegogo => "indiegogo",
            Platform::Gofundme => "gofundme",
        }
    }
}

impl FromStr for Platform {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseEnumError { kind: "platform", value: s.to_string() })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campaign lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Going,
    Completed,
    Upcoming,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Going, Status::Completed, Status::Upcoming];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Going => "going",
            Status::Completed => "completed",
            Status::Upcoming => "upcoming",
        }
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ParseEnumError { kind: "status", value: s.to_string() })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A campaign as returned by every read path (creator name and financials joined in).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub creator_id: i64,
    pub creator_name: String,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub platform: Platform,
    pub status: Status,
    pub url: String,
    pub launch_date: Option<String>,
    pub end_date: Option<String>,
    pub goal_amount: Option<f64>,
    pub currency: String,
    pub created_at: String,
    pub total_pledged: f64,
    pub backer_count: i64,
    pub average_pledge: Option<f64>,
}

/// A project together with its cached embedding, if one is stored and parses.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub project: Project,
    pub embedding: Option<Vec<f32>>,
}

/// Exact-match filters, AND-combined. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    pub status: Option<Status>,
    pub platform: Option<Platform>,
    pub category: Option<String>,
}

/// Validated input for inserting a project.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub creator_id: i64,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub platform: Platform,
    pub status: Status,
    pub url: String,
    pub launch_date: Option<String>,
    pub end_date: Option<String>,
    pub goal_amount: Option<f64>,
    pub currency: String,
    pub total_pledged: f64,
    pub backer_count: i64,
}

/// Validated input for updating a project. Creator and financials are left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectUpdate {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub platform: Platform,
    pub status: Status,
    pub url: String,
    pub launch_date: Option<String>,
    pub end_date: Option<String>,
    pub goal_amount: Option<f64>,
}

/// A backer's pledge as listed on a project page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBacker {
    pub id: i64,
    pub name: String,
    pub country: Option<String>,
    pub amount_pledged: f64,
    pub pledged_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetail {
    pub project: Project,
    pub backers: Vec<ProjectBacker>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub id: i64,
    pub name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub created_at: String,
    pub project_count: i64,
    pub total_raised: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCreator {
    pub name: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorDetail {
    pub creator: Creator,
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backer {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub country: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBacker {
    pub name: String,
    pub email: Option<String>,
    pub country: Option<String>,
}

/// One entry of a backer's pledge history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pledge {
    pub project_id: i64,
    pub title: String,
    pub platform: Platform,
    pub status: Status,
    pub amount_pledged: f64,
    pub pledged_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackerDetail {
    pub backer: Backer,
    pub projects: Vec<Pledge>,
}

/// What the search pipeline needs from storage: filtered candidates with
/// their cached vectors, and a way to write a vector back.
#[async_trait]
pub trait ProjectCorpus: Send + Sync {
    async fn list_candidates(&self, filter: &ProjectFilter) -> Result<Vec<Candidate>>;
    async fn set_embedding(&self, project_id: i64, embedding: &[f32]) -> Result<()>;
}
