use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::datetime::millis_floor;
use crate::model::{Task, TaskList};
use crate::store::TaskStore;
use crate::views;

/// In-memory aggregate of one user's task lists plus the active selection.
///
/// Every mutating operation bumps the relevant `updated_at` values and
/// immediately persists the full collection; there is exactly one mutator per
/// process, so each operation is atomic with respect to the record store.
/// Missing ids and empty input are silent no-ops, never errors — the UI may
/// act on stale state and that is fine.
#[derive(Debug)]
pub struct TaskBoard<'store> {
    store: &'store TaskStore,
    user_id: String,
    lists: Vec<TaskList>,
    active_id: Option<Uuid>,
}

impl<'store> TaskBoard<'store> {
    /// Loads the user's collection, restoring any persisted selection. A
    /// stale selection falls back per [`views::active_list`].
    #[instrument(skip(store, now))]
    pub fn load(store: &'store TaskStore, user_id: &str, now: DateTime<Utc>) -> Self {
        let lists = store.load(user_id, now);
        let persisted = match store.active_selection() {
            Ok(selection) => selection,
            Err(err) => {
                warn!(error = %err, "failed reading selection marker; ignoring");
                None
            }
        };
        let active_id = views::active_list(&lists, persisted).map(|list| list.id);
        debug!(count = lists.len(), active = ?active_id, "loaded task board");
        Self {
            store,
            user_id: user_id.to_string(),
            lists,
            active_id,
        }
    }

    pub fn lists(&self) -> &[TaskList] {
        &self.lists
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Effective active list, with the stale-selection fallback recomputed on
    /// every call rather than cached.
    pub fn active_list(&self) -> Option<&TaskList> {
        views::active_list(&self.lists, self.active_id)
    }

    /// Selects an existing list. Returns false (and changes nothing) for an
    /// unknown id.
    pub fn select_list(&mut self, list_id: Uuid) -> anyhow::Result<bool> {
        if !self.lists.iter().any(|list| list.id == list_id) {
            return Ok(false);
        }
        self.active_id = Some(list_id);
        self.store.set_active_selection(self.active_id)?;
        Ok(true)
    }

    /// Creates a list and makes it the active selection. A title that trims
    /// to empty leaves the collection unchanged and returns `None`.
    #[instrument(skip(self, now))]
    pub fn create_list(
        &mut self,
        title: &str,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Uuid>> {
        let title = title.trim();
        if title.is_empty() {
            debug!("ignoring create with empty title");
            return Ok(None);
        }

        let list = TaskList::new(title.to_string(), deadline, now);
        let id = list.id;
        self.lists.insert(0, list);
        self.active_id = Some(id);
        self.persist()?;
        self.store.set_active_selection(self.active_id)?;
        Ok(Some(id))
    }

    /// Sets the title verbatim — rename intentionally skips the trim/empty
    /// validation that creation applies.
    #[instrument(skip(self, now))]
    pub fn rename_list(
        &mut self,
        list_id: Uuid,
        title: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let Some(list) = self.lists.iter_mut().find(|list| list.id == list_id) else {
            return Ok(false);
        };
        list.title = title.to_string();
        list.touch(now);
        self.persist()?;
        Ok(true)
    }

    #[instrument(skip(self, now))]
    pub fn set_list_deadline(
        &mut self,
        list_id: Uuid,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let Some(list) = self.lists.iter_mut().find(|list| list.id == list_id) else {
            return Ok(false);
        };
        list.deadline_at = deadline.map(millis_floor);
        list.touch(now);
        self.persist()?;
        Ok(true)
    }

    #[instrument(skip(self))]
    pub fn delete_list(&mut self, list_id: Uuid) -> anyhow::Result<bool> {
        let before = self.lists.len();
        self.lists.retain(|list| list.id != list_id);
        if self.lists.len() == before {
            return Ok(false);
        }

        self.active_id = views::active_list(&self.lists, self.active_id).map(|list| list.id);
        self.persist()?;
        self.store.set_active_selection(self.active_id)?;
        Ok(true)
    }

    /// Prepends a task to the given list. Empty text or an unknown list id is
    /// a no-op returning `None`.
    #[instrument(skip(self, now))]
    pub fn add_task(
        &mut self,
        list_id: Uuid,
        text: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Uuid>> {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring add with empty text");
            return Ok(None);
        }
        let Some(list) = self.lists.iter_mut().find(|list| list.id == list_id) else {
            return Ok(None);
        };

        let task = Task::new(text.to_string(), now);
        let id = task.id;
        list.tasks.insert(0, task);
        list.touch(now);
        self.persist()?;
        Ok(Some(id))
    }

    /// Flips `completed` on the task with this id, bumping both the task and
    /// its owning list. Ownership is found by a linear scan across lists.
    #[instrument(skip(self, now))]
    pub fn toggle_task(&mut self, task_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let Some(list) = self
            .lists
            .iter_mut()
            .find(|list| list.contains_task(task_id))
        else {
            return Ok(false);
        };

        if let Some(task) = list.tasks.iter_mut().find(|task| task.id == task_id) {
            task.completed = !task.completed;
            task.updated_at = millis_floor(now);
        }
        list.touch(now);
        self.persist()?;
        Ok(true)
    }

    #[instrument(skip(self, now))]
    pub fn delete_task(&mut self, task_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let Some(list) = self
            .lists
            .iter_mut()
            .find(|list| list.contains_task(task_id))
        else {
            return Ok(false);
        };

        list.tasks.retain(|task| task.id != task_id);
        list.touch(now);
        self.persist()?;
        Ok(true)
    }

    fn persist(&self) -> anyhow::Result<()> {
        self.store.save(&self.user_id, &self.lists)
    }
}
