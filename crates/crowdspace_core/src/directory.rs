//! Write paths of the directory and the embedding maintenance around them.

use std::sync::Arc;
use std::time::Duration;

use embed::Embedder;
use log::{debug, info, warn};
use search::project_text;
use serde::Deserialize;
use store::{
	Backer, Creator, NewBacker, NewCreator, NewProject, Platform, Project, ProjectCorpus, ProjectFilter,
	ProjectUpdate, SqliteStore, Status,
};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Default pause between provider calls during a bulk re-embed.
pub const DEFAULT_REEMBED_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum DirectoryError {
	/// Rejected input; the message is safe to show to clients.
	#[error("{0}")]
	Validation(String),
	#[error("{0} not found")]
	NotFound(&'static str),
	#[error(transparent)]
	Storage(#[from] anyhow::Error),
}

fn invalid(message: &str) -> DirectoryError {
	DirectoryError::Validation(message.to_string())
}

/// Trimmed, non-empty value or `None`.
fn clean(value: Option<&str>) -> Option<String> {
	value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn required(value: Option<&str>, message: &str) -> Result<String, DirectoryError> {
	clean(value).ok_or_else(|| invalid(message))
}

/// Project fields as submitted by a client, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectInput {
	pub creator_id: Option<i64>,
	pub title: Option<String>,
	pub description: Option<String>,
	pub category: Option<String>,
	pub platform: Option<String>,
	pub status: Option<String>,
	pub url: Option<String>,
	pub launch_date: Option<String>,
	pub end_date: Option<String>,
	pub goal_amount: Option<f64>,
	pub currency: Option<String>,
	pub total_pledged: Option<f64>,
	pub backer_count: Option<i64>,
}

/// Fields shared by create and update once validated.
struct ValidProject {
	title: String,
	description: String,
	category: Option<String>,
	platform: Platform,
	status: Status,
	url: String,
	launch_date: Option<String>,
	end_date: Option<String>,
	goal_amount: Option<f64>,
}

impl ProjectInput {
	fn validate(&self) -> Result<ValidProject, DirectoryError> {
		let title = required(self.title.as_deref(), "title is required")?;
		let description = required(self.description.as_deref(), "description is required")?;
		let platform = clean(self.platform.as_deref())
			.and_then(|p| p.parse::<Platform>().ok())
			.ok_or_else(|| invalid("platform must be kickstarter, indiegogo, or gofundme"))?;
		let status = clean(self.status.as_deref())
			.and_then(|s| s.parse::<Status>().ok())
			.ok_or_else(|| invalid("status must be going, completed, or upcoming"))?;
		let url = required(self.url.as_deref(), "url is required")?;

		if self.goal_amount.is_some_and(|g| !g.is_finite() || g < 0.0) {
			return Err(invalid("goal_amount must be a non-negative number"));
		}

		Ok(ValidProject {
			title,
			description,
			category: clean(self.category.as_deref()),
			platform,
			status,
			url,
			launch_date: clean(self.launch_date.as_deref()),
			end_date: clean(self.end_date.as_deref()),
			goal_amount: self.goal_amount,
		})
	}

	fn into_new_project(self) -> Result<NewProject, DirectoryError> {
		let creator_id = self.creator_id.ok_or_else(|| invalid("creator_id is required"))?;
		let valid = self.validate()?;

		let total_pledged = self.total_pledged.unwrap_or(0.0);
		let backer_count = self.backer_count.unwrap_or(0);
		if !total_pledged.is_finite() || total_pledged < 0.0 {
			return Err(invalid("total_pledged must be a non-negative number"));
		}
		if backer_count < 0 {
			return Err(invalid("backer_count must be a non-negative number"));
		}

		Ok(NewProject {
			creator_id,
			title: valid.title,
			description: valid.description,
			category: valid.category,
			platform: valid.platform,
			status: valid.status,
			url: valid.url,
			launch_date: valid.launch_date,
			end_date: valid.end_date,
			goal_amount: valid.goal_amount,
			currency: clean(self.currency.as_deref()).unwrap_or_else(|| "USD".to_string()),
			total_pledged,
			backer_count,
		})
	}

	fn into_update(self) -> Result<ProjectUpdate, DirectoryError> {
		let valid = self.validate()?;
		Ok(ProjectUpdate {
			title: valid.title,
			description: valid.description,
			category: valid.category,
			platform: valid.platform,
			status: valid.status,
			url: valid.url,
			launch_date: valid.launch_date,
			end_date: valid.end_date,
			goal_amount: valid.goal_amount,
		})
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreatorInput {
	pub name: Option<String>,
	pub bio: Option<String>,
	pub location: Option<String>,
	pub website: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackerInput {
	pub name: Option<String>,
	pub email: Option<String>,
	pub country: Option<String>,
}

impl BackerInput {
	fn into_new_backer(self) -> Result<NewBacker, DirectoryError> {
		Ok(NewBacker {
			name: required(self.name.as_deref(), "Backer name is required")?,
			email: clean(self.email.as_deref()),
			country: clean(self.country.as_deref()),
		})
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PledgeInput {
	pub backer_id: Option<i64>,
	pub amount: Option<f64>,
}

/// Events emitted while re-embedding the whole corpus.
#[derive(Debug, Clone, PartialEq)]
pub enum ReembedEvent {
	Started(usize),
	Updated(i64, usize), // project id, dimensions
	Failed(i64, String),
	Done,
}

/// Summary of a bulk re-embed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReembedReport {
	pub updated: usize,
	pub failed: usize,
}

/// Directory writes plus the embedding upkeep they trigger.
#[derive(Clone)]
pub struct DirectoryService {
	store: Arc<SqliteStore>,
	embedder: Arc<dyn Embedder>,
}

impl DirectoryService {
	pub fn new(store: Arc<SqliteStore>, embedder: Arc<dyn Embedder>) -> Self {
		Self { store, embedder }
	}

	pub fn store(&self) -> &Arc<SqliteStore> {
		&self.store
	}

	/// Validate and insert a project, then refresh its embedding in the
	/// background. The returned project does not wait for the embedding.
	pub async fn create_project(&self, input: ProjectInput) -> Result<Project, DirectoryError> {
		let new_project = input.into_new_project()?;
		if !self.store.creator_exists(new_project.creator_id)? {
			return Err(invalid("creator_id does not match an existing creator"));
		}

		let project = self.store.create_project(&new_project)?;
		info!("created project {} ({})", project.id, project.title);
		self.spawn_refresh(project.id);
		Ok(project)
	}

	/// Validate and apply an update, then refresh the embedding in the background.
	pub async fn update_project(&self, id: i64, input: ProjectInput) -> Result<Project, DirectoryError> {
		let update = input.into_update()?;
		let project = self
			.store
			.update_project(id, &update)?
			.ok_or(DirectoryError::NotFound("Project"))?;
		self.spawn_refresh(project.id);
		Ok(project)
	}

	pub async fn create_creator(&self, input: CreatorInput) -> Result<Creator, DirectoryError> {
		let creator = NewCreator {
			name: required(input.name.as_deref(), "Creator name is required")?,
			bio: clean(input.bio.as_deref()),
			location: clean(input.location.as_deref()),
			website: clean(input.website.as_deref()),
		};
		Ok(self.store.create_creator(&creator)?)
	}

	pub async fn create_backer(&self, input: BackerInput) -> Result<Backer, DirectoryError> {
		let backer = input.into_new_backer()?;
		Ok(self.store.create_backer(&backer)?)
	}

	/// Replace a backer's name, email and country.
	pub async fn update_backer(&self, id: i64, input: BackerInput) -> Result<Backer, DirectoryError> {
		let backer = input.into_new_backer()?;
		self.store
			.update_backer(id, &backer)?
			.ok_or(DirectoryError::NotFound("Backer"))
	}

	/// Record a pledge and recompute the project's financials.
	pub async fn add_pledge(&self, project_id: i64, input: PledgeInput) -> Result<Project, DirectoryError> {
		let backer_id = input.backer_id.ok_or_else(|| invalid("backer_id is required"))?;
		let amount = input
			.amount
			.filter(|a| a.is_finite() && *a > 0.0)
			.ok_or_else(|| invalid("amount must be a positive number"))?;

		if !self.store.add_pledge(project_id, backer_id, amount)? {
			return Err(DirectoryError::NotFound("Project or backer"));
		}
		let detail = self
			.store
			.get_project(project_id)?
			.ok_or(DirectoryError::NotFound("Project"))?;
		Ok(detail.project)
	}

	/// Fire-and-forget embedding refresh. Failures are logged only.
	pub fn spawn_refresh(&self, project_id: i64) -> JoinHandle<()> {
		let service = self.clone();
		tokio::spawn(async move {
			match service.refresh_embedding(project_id).await {
				Ok(true) => debug!("refreshed embedding for project {}", project_id),
				Ok(false) => debug!("project {} vanished before its embedding was refreshed", project_id),
				Err(e) => warn!("failed to refresh embedding for project {}: {:#}", project_id, e),
			}
		})
	}

	/// Recompute and store one project's embedding. Returns `false` when the
	/// project no longer exists.
	pub async fn refresh_embedding(&self, project_id: i64) -> anyhow::Result<bool> {
		let Some(detail) = self.store.get_project(project_id)? else {
			return Ok(false);
		};
		let vector = self.embedder.embed_project(&project_text(&detail.project)).await?;
		self.store.set_embedding(project_id, &vector).await?;
		Ok(true)
	}

	/// Re-embed every project (no progress reporting).
	pub async fn reembed_all(&self, delay: Duration) -> anyhow::Result<ReembedReport> {
		self.reembed_all_with_progress(delay, |_| ()).await
	}

	/// Re-embed every project in id order, one provider call at a time with
	/// `delay` between calls. Individual failures are counted, not fatal.
	pub async fn reembed_all_with_progress<F>(&self, delay: Duration, mut cb: F) -> anyhow::Result<ReembedReport>
	where
		F: FnMut(ReembedEvent) + Send,
	{
		let candidates = self.store.list_candidates(&ProjectFilter::default()).await?;
		cb(ReembedEvent::Started(candidates.len()));

		let mut report = ReembedReport::default();
		let last = candidates.len().saturating_sub(1);
		for (i, candidate) in candidates.into_iter().enumerate() {
			let project = candidate.project;
			let outcome = match self.embedder.embed_project(&project_text(&project)).await {
				Ok(vector) => self.store.set_embedding(project.id, &vector).await.map(|_| vector.len()),
				Err(e) => Err(e.into()),
			};

			match outcome {
				Ok(dims) => {
					report.updated += 1;
					cb(ReembedEvent::Updated(project.id, dims));
				}
				Err(e) => {
					report.failed += 1;
					warn!("re-embedding project {} failed: {:#}", project.id, e);
					cb(ReembedEvent::Failed(project.id, format!("{:#}", e)));
				}
			}

			if i < last && !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}
		}

		cb(ReembedEvent::Done);
		info!("re-embed finished: {} updated, {} failed", report.updated, report.failed);
		Ok(report)
	}
}
