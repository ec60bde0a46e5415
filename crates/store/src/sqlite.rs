//! SQLite-backed directory store.
//!
//! Embeddings live in the `projects.embedding` column as a JSON array so a
//! row and its vector are deleted together.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::{
    Backer, BackerDetail, Candidate, Creator, CreatorDetail, NewBacker, NewCreator, NewProject,
    ParseEnumError, Pledge, Project, ProjectBacker, ProjectCorpus, ProjectDetail, ProjectFilter,
    ProjectUpdate,
};

const DB_FILE: &str = "crowdspace.db";

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS creators (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        bio TEXT,
        location TEXT,
        website TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        creator_id INTEGER NOT NULL REFERENCES creators(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        category TEXT,
        platform TEXT NOT NULL CHECK (platform IN ('kickstarter', 'indiegogo', 'gofundme')),
        status TEXT NOT NULL CHECK (status IN ('going', 'completed', 'upcoming')),
        url TEXT NOT NULL,
        launch_date TEXT,
        end_date TEXT,
        goal_amount REAL,
        currency TEXT NOT NULL DEFAULT 'USD',
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        embedding TEXT
    );

    CREATE TABLE IF NOT EXISTS financials (
        project_id INTEGER PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
        total_pledged REAL NOT NULL DEFAULT 0,
        backer_count INTEGER NOT NULL DEFAULT 0,
        average_pledge REAL,
        last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS backers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT,
        country TEXT,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS backer_projects (
        backer_id INTEGER NOT NULL REFERENCES backers(id) ON DELETE CASCADE,
        project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        amount_pledged REAL NOT NULL,
        pledged_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        PRIMARY KEY (backer_id, project_id)
    );

    CREATE INDEX IF NOT EXISTS idx_projects_creator ON projects(creator_id);
    CREATE INDEX IF NOT EXISTS idx_backer_projects_project ON backer_projects(project_id);
"#;

// Column 17 (embedding) is only read by the candidate path.
const PROJECT_SELECT: &str = r#"
    SELECT
        p.id, p.creator_id, c.name, p.title, p.description, p.category,
        p.platform, p.status, p.url, p.launch_date, p.end_date, p.goal_amount,
        p.currency, p.created_at,
        COALESCE(f.total_pledged, 0.0), COALESCE(f.backer_count, 0), f.average_pledge,
        p.embedding
    FROM projects p
    JOIN creators c ON p.creator_id = c.id
    LEFT JOIN financials f ON f.project_id = p.id
"#;

const CREATOR_SELECT: &str = r#"
    SELECT
        c.id, c.name, c.bio, c.location, c.website, c.created_at,
        COUNT(p.id), COALESCE(SUM(f.total_pledged), 0.0)
    FROM creators c
    LEFT JOIN projects p ON p.creator_id = c.id
    LEFT JOIN financials f ON f.project_id = p.id
"#;

/// SQLite store for the whole directory.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open the database inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        let conn = Connection::open(data_dir.join(DB_FILE))
            .context("Failed to open directory database")?;
        Self::with_connection(conn)
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("Failed to create tables")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("directory database lock poisoned"))
    }

    // ---------- creators ----------

    pub fn create_creator(&self, creator: &NewCreator) -> Result<Creator> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO creators (name, bio, location, website) VALUES (?1, ?2, ?3, ?4)",
            params![creator.name, creator.bio, creator.location, creator.website],
        )?;
        let id = conn.last_insert_rowid();
        fetch_creator(&conn, id)?.ok_or_else(|| anyhow!("creator {} vanished after insert", id))
    }

    pub fn creator_exists(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row("SELECT id FROM creators WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_creators(&self) -> Result<Vec<Creator>> {
        let conn = self.conn()?;
        let sql = format!("{CREATOR_SELECT} GROUP BY c.id ORDER BY c.created_at DESC, c.id DESC");
        let mut stmt = conn.prepare(&sql)?;
        let creators = stmt
            .query_map([], creator_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(creators)
    }

    pub fn get_creator(&self, id: i64) -> Result<Option<CreatorDetail>> {
        let conn = self.conn()?;
        let Some(creator) = fetch_creator(&conn, id)? else {
            return Ok(None);
        };

        let sql = format!("{PROJECT_SELECT} WHERE p.creator_id = ?1 ORDER BY p.created_at DESC, p.id DESC");
        let mut stmt = conn.prepare(&sql)?;
        let projects = stmt
            .query_map(params![id], project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(CreatorDetail { creator, projects }))
    }

    /// Delete a creator together with their projects, financials and pledges.
    pub fn delete_creator(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM creators WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    // ---------- projects ----------

    /// Insert a project and its financials in one transaction.
    pub fn create_project(&self, project: &NewProject) -> Result<Project> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO projects (
                creator_id, title, description, category, platform, status, url,
                launch_date, end_date, goal_amount, currency
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                project.creator_id,
                project.title,
                project.description,
                project.category,
                project.platform.as_str(),
                project.status.as_str(),
                project.url,
                project.launch_date,
                project.end_date,
                project.goal_amount,
                project.currency,
            ],
        )
        .context("Failed to insert project")?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO financials (project_id, total_pledged, backer_count, average_pledge)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                project.total_pledged,
                project.backer_count,
                average_pledge(project.total_pledged, project.backer_count),
            ],
        )
        .context("Failed to insert financials")?;

        tx.commit()?;
        fetch_project(&conn, id)?.ok_or_else(|| anyhow!("project {} vanished after insert", id))
    }

    /// List projects newest first. `q` is a case-insensitive substring match
    /// on title or description.
    pub fn list_projects(&self, filter: &ProjectFilter, q: Option<&str>) -> Result<Vec<Project>> {
        let mut values = Vec::new();
        let mut clauses = filter_clauses(filter, &mut values);

        if let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) {
            values.push(format!("%{}%", q));
            let n = values.len();
            clauses.push(format!("(p.title LIKE ?{n} OR p.description LIKE ?{n})"));
        }

        let sql = format!(
            "{PROJECT_SELECT} {} ORDER BY p.created_at DESC, p.id DESC",
            where_clause(&clauses)
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let projects = stmt
            .query_map(params_from_iter(values.iter()), project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<ProjectDetail>> {
        let conn = self.conn()?;
        let Some(project) = fetch_project(&conn, id)? else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT b.id, b.name, b.country, bp.amount_pledged, bp.pledged_at
             FROM backer_projects bp
             JOIN backers b ON b.id = bp.backer_id
             WHERE bp.project_id = ?1
             ORDER BY bp.amount_pledged DESC",
        )?;
        let backers = stmt
            .query_map(params![id], |row| {
                Ok(ProjectBacker {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    country: row.get(2)?,
                    amount_pledged: row.get(3)?,
                    pledged_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(ProjectDetail { project, backers }))
    }

    /// Returns `None` when no project has this id.
    pub fn update_project(&self, id: i64, update: &ProjectUpdate) -> Result<Option<Project>> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE projects SET
                    title = ?1, description = ?2, category = ?3, platform = ?4, status = ?5,
                    url = ?6, launch_date = ?7, end_date = ?8, goal_amount = ?9
                 WHERE id = ?10",
                params![
                    update.title,
                    update.description,
                    update.category,
                    update.platform.as_str(),
                    update.status.as_str(),
                    update.url,
                    update.launch_date,
                    update.end_date,
                    update.goal_amount,
                    id,
                ],
            )
            .context("Failed to update project")?;

        if changed == 0 {
            return Ok(None);
        }
        fetch_project(&conn, id)
    }

    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    // ---------- backers ----------

    pub fn create_backer(&self, backer: &NewBacker) -> Result<Backer> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO backers (name, email, country) VALUES (?1, ?2, ?3)",
            params![backer.name, backer.email, backer.country],
        )?;
        let id = conn.last_insert_rowid();
        fetch_backer(&conn, id)?.ok_or_else(|| anyhow!("backer {} vanished after insert", id))
    }

    pub fn list_backers(&self) -> Result<Vec<Backer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, email, country, created_at FROM backers
             ORDER BY created_at DESC, id DESC",
        )?;
        let backers = stmt
            .query_map([], backer_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(backers)
    }

    pub fn get_backer(&self, id: i64) -> Result<Option<BackerDetail>> {
        let conn = self.conn()?;
        let Some(backer) = fetch_backer(&conn, id)? else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.platform, p.status, bp.amount_pledged, bp.pledged_at
             FROM backer_projects bp
             JOIN projects p ON p.id = bp.project_id
             WHERE bp.backer_id = ?1
             ORDER BY bp.pledged_at DESC",
        )?;
        let projects = stmt
            .query_map(params![id], |row| {
                Ok(Pledge {
                    project_id: row.get(0)?,
                    title: row.get(1)?,
                    platform: parse_column(row, 2)?,
                    status: parse_column(row, 3)?,
                    amount_pledged: row.get(4)?,
                    pledged_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(BackerDetail { backer, projects }))
    }

    /// Returns `None` when no backer has this id.
    pub fn update_backer(&self, id: i64, backer: &NewBacker) -> Result<Option<Backer>> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE backers SET name = ?1, email = ?2, country = ?3 WHERE id = ?4",
                params![backer.name, backer.email, backer.country, id],
            )
            .context("Failed to update backer")?;
        if changed == 0 {
            return Ok(None);
        }
        fetch_backer(&conn, id)
    }

    pub fn delete_backer(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM backers WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Record (or replace) a backer's pledge and fold the change into the
    /// project's financials. Funding that did not come from recorded pledges
    /// is kept: the total moves by the difference in the pledge sum and the
    /// backer count never drops below its current value. Returns `false` if
    /// the project or backer does not exist.
    pub fn add_pledge(&self, project_id: i64, backer_id: i64, amount: f64) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let both_exist: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)
                AND EXISTS(SELECT 1 FROM backers WHERE id = ?2)",
            params![project_id, backer_id],
            |row| row.get(0),
        )?;
        if !both_exist {
            return Ok(false);
        }

        let (current_total, current_count): (f64, i64) = tx
            .query_row(
                "SELECT total_pledged, backer_count FROM financials WHERE project_id = ?1",
                params![project_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .unwrap_or((0.0, 0));
        let (old_sum, _) = pledge_totals(&tx, project_id)?;

        tx.execute(
            "INSERT INTO backer_projects (backer_id, project_id, amount_pledged) VALUES (?1, ?2, ?3)
             ON CONFLICT(backer_id, project_id) DO UPDATE SET amount_pledged = excluded.amount_pledged",
            params![backer_id, project_id, amount],
        )?;

        let (new_sum, pledge_count) = pledge_totals(&tx, project_id)?;
        let total = current_total + (new_sum - old_sum);
        let count = current_count.max(pledge_count);

        tx.execute(
            "INSERT INTO financials (project_id, total_pledged, backer_count, average_pledge)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_id) DO UPDATE SET
                total_pledged = excluded.total_pledged,
                backer_count = excluded.backer_count,
                average_pledge = excluded.average_pledge,
                last_updated = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![project_id, total, count, average_pledge(total, count)],
        )?;

        tx.commit()?;
        Ok(true)
    }

    // ---------- stats ----------

    pub fn project_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of projects with a stored embedding (parseable or not).
    pub fn embedded_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ProjectCorpus for SqliteStore {
    async fn list_candidates(&self, filter: &ProjectFilter) -> Result<Vec<Candidate>> {
        let mut values = Vec::new();
        let clauses = filter_clauses(filter, &mut values);
        let sql = format!("{PROJECT_SELECT} {} ORDER BY p.id", where_clause(&clauses));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let candidates = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let project = project_from_row(row)?;
                let raw: Option<String> = row.get(17)?;
                let embedding = parse_embedding(project.id, raw);
                Ok(Candidate { project, embedding })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    async fn set_embedding(&self, project_id: i64, embedding: &[f32]) -> Result<()> {
        let json = serde_json::to_string(embedding)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE projects SET embedding = ?1 WHERE id = ?2",
            params![json, project_id],
        )
        .with_context(|| format!("Failed to store embedding for project {}", project_id))?;
        Ok(())
    }
}

fn filter_clauses(filter: &ProjectFilter, values: &mut Vec<String>) -> Vec<String> {
    let mut clauses = Vec::new();

    if let Some(status) = filter.status {
        values.push(status.as_str().to_string());
        clauses.push(format!("p.status = ?{}", values.len()));
    }

    if let Some(platform) = filter.platform {
        values.push(platform.as_str().to_string());
        clauses.push(format!("p.platform = ?{}", values.len()));
    }

    if let Some(category) = &filter.category {
        values.push(category.clone());
        clauses.push(format!("p.category = ?{}", values.len()));
    }

    clauses
}

fn where_clause(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    }
}

/// Sum and count of recorded pledges for a project.
fn pledge_totals(conn: &Connection, project_id: i64) -> rusqlite::Result<(f64, i64)> {
    conn.query_row(
        "SELECT COALESCE(SUM(amount_pledged), 0.0), COUNT(*) FROM backer_projects WHERE project_id = ?1",
        params![project_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

/// Average pledge rounded to one decimal, or `None` without backers.
fn average_pledge(total: f64, backers: i64) -> Option<f64> {
    if backers > 0 {
        Some((total / backers as f64 * 10.0).round() / 10.0)
    } else {
        None
    }
}

fn parse_embedding(project_id: i64, raw: Option<String>) -> Option<Vec<f32>> {
    let raw = raw?;
    match serde_json::from_str::<Vec<f32>>(&raw) {
        Ok(vector) => Some(vector),
        Err(e) => {
            debug!("ignoring unparseable embedding for project {}: {}", project_id, e);
            None
        }
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = ParseEnumError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: ParseEnumError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        creator_name: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        platform: parse_column(row, 6)?,
        status: parse_column(row, 7)?,
        url: row.get(8)?,
        launch_date: row.get(9)?,
        end_date: row.get(10)?,
        goal_amount: row.get(11)?,
        currency: row.get(12)?,
        created_at: row.get(13)?,
        total_pledged: row.get(14)?,
        backer_count: row.get(15)?,
        average_pledge: row.get(16)?,
    })
}

fn creator_from_row(row: &Row<'_>) -> rusqlite::Result<Creator> {
    Ok(Creator {
        id: row.get(0)?,
        name: row.get(1)?,
        bio: row.get(2)?,
        location: row.get(3)?,
        website: row.get(4)?,
        created_at: row.get(5)?,
        project_count: row.get(6)?,
        total_raised: row.get(7)?,
    })
}

fn backer_from_row(row: &Row<'_>) -> rusqlite::Result<Backer> {
    Ok(Backer {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        country: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn fetch_project(conn: &Connection, id: i64) -> Result<Option<Project>> {
    let sql = format!("{PROJECT_SELECT} WHERE p.id = ?1");
    Ok(conn.query_row(&sql, params![id], project_from_row).optional()?)
}

fn fetch_creator(conn: &Connection, id: i64) -> Result<Option<Creator>> {
    let sql = format!("{CREATOR_SELECT} WHERE c.id = ?1 GROUP BY c.id");
    Ok(conn.query_row(&sql, params![id], creator_from_row).optional()?)
}

fn fetch_backer(conn: &Connection, id: i64) -> Result<Option<Backer>> {
    Ok(conn
        .query_row(
            "SELECT id, name, email, country, created_at FROM backers WHERE id = ?1",
            params![id],
            backer_from_row,
        )
        .optional()?)
}
