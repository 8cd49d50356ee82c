use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{Task, TaskList, ThemePreference};

/// Fixed namespace for per-user task records; the record key is this plus the
/// sanitized user id.
const RECORD_NAMESPACE: &str = "dayline_tasks_v1";
const THEME_FILE: &str = "theme.data";
const SESSION_FILE: &str = "session.data";
const SELECTION_FILE: &str = "selection.data";

/// Local record store for per-user task collections plus the global theme
/// preference and CLI session markers.
///
/// Writes are whole-record replacements; there are no partial updates and no
/// migrations beyond default-filling absent optional fields at load.
#[derive(Debug)]
pub struct TaskStore {
    pub data_dir: PathBuf,
    theme_path: PathBuf,
    session_path: PathBuf,
    selection_path: PathBuf,
}

impl TaskStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let theme_path = data_dir.join(THEME_FILE);
        let session_path = data_dir.join(SESSION_FILE);
        let selection_path = data_dir.join(SELECTION_FILE);

        if !theme_path.exists() {
            fs::write(&theme_path, "")?;
        }
        if !session_path.exists() {
            fs::write(&session_path, "")?;
        }
        if !selection_path.exists() {
            fs::write(&selection_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            theme = %theme_path.display(),
            session = %session_path.display(),
            "opened task store"
        );

        Ok(Self {
            data_dir,
            theme_path,
            session_path,
            selection_path,
        })
    }

    fn record_path(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(format!(
            "{RECORD_NAMESPACE}_{}.json",
            sanitize_user_id(user_id)
        ))
    }

    /// Loads a user's task lists.
    ///
    /// A missing, unreadable, or malformed record never surfaces as an error:
    /// the built-in sample collection is returned instead, stamped at `now`.
    #[tracing::instrument(skip(self, now))]
    pub fn load(&self, user_id: &str, now: DateTime<Utc>) -> Vec<TaskList> {
        let path = self.record_path(user_id);
        if !path.exists() {
            debug!(file = %path.display(), "no record for user; using sample collection");
            return sample_task_lists(now);
        }

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    file = %path.display(),
                    error = %err,
                    "failed reading user record; using sample collection"
                );
                return sample_task_lists(now);
            }
        };

        match serde_json::from_str::<Vec<TaskList>>(&raw) {
            Ok(lists) => {
                debug!(count = lists.len(), "loaded task lists");
                lists
            }
            Err(err) => {
                warn!(
                    file = %path.display(),
                    error = %err,
                    "user record failed to parse; using sample collection"
                );
                sample_task_lists(now)
            }
        }
    }

    /// Serializes and atomically replaces the user's entire collection.
    #[tracing::instrument(skip(self, lists))]
    pub fn save(&self, user_id: &str, lists: &[TaskList]) -> anyhow::Result<()> {
        let path = self.record_path(user_id);
        debug!(file = %path.display(), count = lists.len(), "saving task lists");

        let serialized =
            serde_json::to_string(lists).context("failed to serialize task lists")?;
        atomic_replace(&path, serialized.as_bytes())
            .with_context(|| format!("failed to save {}", path.display()))
    }

    /// Returns the global theme preference, defaulting to light on a missing
    /// or unrecognized value.
    #[tracing::instrument(skip(self))]
    pub fn load_theme(&self) -> ThemePreference {
        match fs::read_to_string(&self.theme_path) {
            Ok(raw) => ThemePreference::parse(&raw).unwrap_or_default(),
            Err(err) => {
                warn!(
                    file = %self.theme_path.display(),
                    error = %err,
                    "failed reading theme preference; defaulting to light"
                );
                ThemePreference::default()
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn save_theme(&self, pref: ThemePreference) -> anyhow::Result<()> {
        fs::write(&self.theme_path, pref.as_str())
            .with_context(|| format!("failed writing {}", self.theme_path.display()))
    }

    /// Returns the signed-in user id recorded by the last `login`, if any.
    #[tracing::instrument(skip(self))]
    pub fn current_user_id(&self) -> anyhow::Result<Option<String>> {
        let raw = fs::read_to_string(&self.session_path)
            .with_context(|| format!("failed reading {}", self.session_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_current_user_id(&self, user_id: Option<&str>) -> anyhow::Result<()> {
        let payload = user_id.unwrap_or_default();
        fs::write(&self.session_path, payload)
            .with_context(|| format!("failed writing {}", self.session_path.display()))?;
        Ok(())
    }

    /// Returns the persisted active-list selection. Stale ids are fine here;
    /// the aggregate applies its fallback when the id no longer exists.
    #[tracing::instrument(skip(self))]
    pub fn active_selection(&self) -> anyhow::Result<Option<Uuid>> {
        let raw = fs::read_to_string(&self.selection_path)
            .with_context(|| format!("failed reading {}", self.selection_path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match Uuid::parse_str(trimmed) {
            Ok(id) => Ok(Some(id)),
            Err(err) => {
                warn!(value = %trimmed, error = %err, "invalid selection marker; ignoring");
                Ok(None)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn set_active_selection(&self, list_id: Option<Uuid>) -> anyhow::Result<()> {
        let payload = list_id.map(|id| id.to_string()).unwrap_or_default();
        fs::write(&self.selection_path, payload)
            .with_context(|| format!("failed writing {}", self.selection_path.display()))?;
        Ok(())
    }
}

/// The collection handed to users with no stored record yet. Ids are stable
/// for the lifetime of the process so repeated loads of a record-less user
/// agree; timestamps are stamped from `now`.
pub fn sample_task_lists(now: DateTime<Utc>) -> Vec<TaskList> {
    let (list_id, shell_id, plan_id) = *sample_ids();

    let mut focus = TaskList::new(
        "Today Focus".to_string(),
        Some(now + Duration::hours(24)),
        now,
    );
    focus.id = list_id;

    let mut shell = Task::new("Finish app shell".to_string(), now);
    shell.id = shell_id;
    let mut plan = Task::new("Plan Firebase migration".to_string(), now);
    plan.id = plan_id;
    plan.completed = true;

    focus.tasks = vec![shell, plan];
    vec![focus]
}

fn sample_ids() -> &'static (Uuid, Uuid, Uuid) {
    static SAMPLE_IDS: OnceLock<(Uuid, Uuid, Uuid)> = OnceLock::new();
    SAMPLE_IDS.get_or_init(|| (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()))
}

fn atomic_replace(path: &Path, payload: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(payload)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

/// Maps a user id to a filesystem-safe record key. Replacing unsafe
/// characters alone could collide distinct ids (`a/b` vs `a-b`), so a short
/// digest of the raw id is appended to keep records per-user.
fn sanitize_user_id(user_id: &str) -> String {
    let safe: String = user_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '-'
            }
        })
        .collect();

    let digest = format!("{:x}", Sha256::digest(user_id.as_bytes()));
    format!("{safe}-{}", &digest[..8])
}

#[cfg(test)]
mod tests {
    use super::sanitize_user_id;

    #[test]
    fn sanitize_keeps_safe_characters_and_stays_stable() {
        assert!(sanitize_user_id("alice").starts_with("alice-"));
        assert!(sanitize_user_id("u_1-2.3").starts_with("u_1-2.3-"));
        assert!(sanitize_user_id("../evil id").starts_with("..-evil-id-"));
        assert_eq!(sanitize_user_id("alice"), sanitize_user_id("alice"));
    }

    #[test]
    fn distinct_user_ids_never_share_a_record_key() {
        assert_ne!(sanitize_user_id("a/b"), sanitize_user_id("a-b"));
        assert_ne!(sanitize_user_id("a b"), sanitize_user_id("a_b"));
    }
}
