use crate::timer::{self, calculate_ends_at};
use chrono::{Duration, NaiveDateTime};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type TaskId = String;
pub type PageId = String;

pub const DEFAULT_PAGE: &str = "default";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Task {
    #[serde(default)]
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    timer_minutes: Option<u32>,
    #[serde(default)]
    pub reward: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "timer::wall_clock")]
    started_at: Option<NaiveDateTime>,
    #[serde(default, with = "timer::wall_clock")]
    ends_at: Option<NaiveDateTime>,
    #[serde(default, with = "timer::wall_clock")]
    pub scheduled_start: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Page {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Every page plus the pointer to the active one. The `"default"` page is
/// always present and `current_page` always names an existing page.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PageStore {
    #[serde(default = "default_page_id")]
    current_page: PageId,
    #[serde(default)]
    pages: BTreeMap<PageId, Page>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Scheduled,
    Running,
    Expired,
    Completed,
}

/// Whether starting a task that already has a start time is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    Reject,
    Allow,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no task at position {index} (page has {len})")]
    TaskIndexOutOfRange { index: usize, len: usize },
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("page not found: {0}")]
    PageNotFound(String),
    #[error("page already exists: {0}")]
    PageExists(String),
    #[error("task at position {0} was already started")]
    AlreadyStarted(usize),
    #[error("timer of {0} minutes runs past the calendar")]
    TimerOutOfRange(u32),
}

pub fn generate_id() -> TaskId {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

fn default_page_id() -> PageId {
    DEFAULT_PAGE.to_string()
}

impl Task {
    pub fn new(name: impl Into<String>, timer_minutes: Option<u32>, reward: Option<String>) -> Self {
        Task {
            id: generate_id(),
            name: name.into(),
            timer_minutes,
            reward,
            completed: false,
            started_at: None,
            ends_at: None,
            scheduled_start: None,
            extra: Map::new(),
        }
    }

    pub fn with_scheduled_start(mut self, at: Option<NaiveDateTime>) -> Self {
        self.scheduled_start = at;
        self
    }

    pub fn timer_minutes(&self) -> Option<u32> {
        self.timer_minutes
    }

    pub fn started_at(&self) -> Option<NaiveDateTime> {
        self.started_at
    }

    pub fn ends_at(&self) -> Option<NaiveDateTime> {
        self.ends_at
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Stamps the start time, derives `ends_at` and clears `completed`.
    pub fn start(&mut self, now: NaiveDateTime) -> Result<(), StoreError> {
        let ends_at = calculate_ends_at(now, self.timer_minutes);
        if let (Some(minutes), None) = (self.timer_minutes, ends_at) {
            return Err(StoreError::TimerOutOfRange(minutes));
        }
        self.started_at = Some(now);
        self.ends_at = ends_at;
        self.completed = false;
        Ok(())
    }

    pub fn mark_done(&mut self) {
        self.completed = true;
    }

    /// Recomputes `ends_at` from the start time and timer. Returns whether
    /// the stored value changed.
    pub fn resync_ends_at(&mut self) -> bool {
        let derived = self
            .started_at
            .and_then(|start| calculate_ends_at(start, self.timer_minutes));
        let changed = derived != self.ends_at;
        self.ends_at = derived;
        changed
    }

    pub fn state(&self, now: NaiveDateTime) -> TaskState {
        if self.completed {
            return TaskState::Completed;
        }
        match (self.started_at, self.ends_at) {
            (Some(_), Some(end)) if end <= now => TaskState::Expired,
            (Some(_), _) => TaskState::Running,
            (None, _) if self.scheduled_start.is_some() => TaskState::Scheduled,
            (None, _) => TaskState::Pending,
        }
    }

    pub fn remaining(&self, now: NaiveDateTime) -> Option<Duration> {
        self.ends_at.map(|end| timer::remaining(end, now))
    }
}

impl Page {
    pub fn new(title: impl Into<String>) -> Self {
        Page {
            title: title.into(),
            tasks: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Load-time backfill for one page: a title when it is missing, ids for
    /// tasks written without one, and re-derived `ends_at` values. Returns
    /// the number of corrections; a second call always returns zero.
    pub fn upgrade(&mut self, fallback_title: &str) -> usize {
        let mut fixes = 0;
        if self.title.trim().is_empty() {
            self.title = fallback_title.to_string();
            fixes += 1;
        }
        for task in &mut self.tasks {
            if task.id.is_empty() {
                task.id = generate_id();
                fixes += 1;
            }
            if task.resync_ends_at() {
                fixes += 1;
            }
        }
        fixes
    }

    pub fn task(&self, index: usize) -> Result<&Task, StoreError> {
        self.tasks.get(index).ok_or(StoreError::TaskIndexOutOfRange {
            index,
            len: self.tasks.len(),
        })
    }

    fn task_mut(&mut self, index: usize) -> Result<&mut Task, StoreError> {
        let len = self.tasks.len();
        self.tasks
            .get_mut(index)
            .ok_or(StoreError::TaskIndexOutOfRange { index, len })
    }

    pub fn position_of(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == task_id)
    }

    pub fn start_task(
        &mut self,
        index: usize,
        now: NaiveDateTime,
        policy: RestartPolicy,
    ) -> Result<(), StoreError> {
        let task = self.task_mut(index)?;
        if policy == RestartPolicy::Reject && task.is_started() {
            return Err(StoreError::AlreadyStarted(index));
        }
        task.start(now)
    }

    pub fn mark_task_done(&mut self, index: usize) -> Result<(), StoreError> {
        self.task_mut(index)?.mark_done();
        Ok(())
    }

    pub fn delete_task(&mut self, index: usize) -> Result<Task, StoreError> {
        self.task(index)?;
        Ok(self.tasks.remove(index))
    }
}

impl Default for PageStore {
    fn default() -> Self {
        PageStore::new()
    }
}

impl PageStore {
    pub fn new() -> Self {
        let mut pages = BTreeMap::new();
        pages.insert(default_page_id(), Page::new(DEFAULT_PAGE));
        PageStore {
            current_page: default_page_id(),
            pages,
            extra: Map::new(),
        }
    }

    /// Wraps a single-page document as the `"default"` page of a new store.
    pub fn from_single_page(page: Page) -> Self {
        let mut store = PageStore::new();
        store.pages.insert(default_page_id(), page);
        store
    }

    pub fn current_page_id(&self) -> &str {
        &self.current_page
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.pages.get(&self.current_page)
    }

    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.pages.get(page_id)
    }

    pub fn pages(&self) -> impl Iterator<Item = (&PageId, &Page)> {
        self.pages.iter()
    }

    /// Restores the store invariants: `"default"` exists and `current_page`
    /// resolves. Returns whether anything had to change.
    pub fn heal(&mut self) -> bool {
        let mut changed = false;
        if !self.pages.contains_key(DEFAULT_PAGE) {
            self.pages.insert(default_page_id(), Page::new(DEFAULT_PAGE));
            changed = true;
        }
        if !self.pages.contains_key(&self.current_page) {
            self.current_page = default_page_id();
            changed = true;
        }
        changed
    }

    /// Load-time migration: repairs the page invariants and upgrades every
    /// page, titling untitled pages after their id. Returns the number of
    /// corrections; a second call always returns zero.
    pub fn upgrade(&mut self) -> usize {
        let mut fixes = usize::from(self.heal());
        for (page_id, page) in self.pages.iter_mut() {
            fixes += page.upgrade(page_id);
        }
        fixes
    }

    fn current_page_mut(&mut self) -> &mut Page {
        self.heal();
        self.pages
            .entry(self.current_page.clone())
            .or_insert_with(|| Page::new(DEFAULT_PAGE))
    }

    pub fn set_current_page(&mut self, page_id: &str) -> Result<(), StoreError> {
        if !self.pages.contains_key(page_id) {
            return Err(StoreError::PageNotFound(page_id.to_string()));
        }
        self.current_page = page_id.to_string();
        Ok(())
    }

    pub fn add_task(&mut self, task: Task) {
        self.current_page_mut().add_task(task);
    }

    pub fn add_task_to(&mut self, page_id: &str, task: Task) -> Result<(), StoreError> {
        let page = self
            .pages
            .get_mut(page_id)
            .ok_or_else(|| StoreError::PageNotFound(page_id.to_string()))?;
        page.add_task(task);
        Ok(())
    }

    pub fn start_task(&mut self, index: usize, now: NaiveDateTime) -> Result<(), StoreError> {
        self.current_page_mut()
            .start_task(index, now, RestartPolicy::Allow)
    }

    pub fn mark_task_done(&mut self, index: usize) -> Result<(), StoreError> {
        self.current_page_mut().mark_task_done(index)
    }

    pub fn delete_task(&mut self, index: usize) -> Result<Task, StoreError> {
        self.current_page_mut().delete_task(index)
    }

    /// First page (in key order) and position holding a task with this id.
    pub fn find_task(&self, task_id: &str) -> Option<(&str, usize)> {
        self.pages.iter().find_map(|(page_id, page)| {
            page.position_of(task_id)
                .map(|index| (page_id.as_str(), index))
        })
    }

    pub fn task_by_id(&self, task_id: &str) -> Option<&Task> {
        let (page_id, index) = self.find_task(task_id)?;
        self.pages.get(page_id).and_then(|p| p.tasks.get(index))
    }

    fn task_by_id_mut(&mut self, task_id: &str) -> Result<&mut Task, StoreError> {
        self.pages
            .values_mut()
            .flat_map(|page| page.tasks.iter_mut())
            .find(|t| t.id == task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    pub fn start_task_by_id(&mut self, task_id: &str, now: NaiveDateTime) -> Result<(), StoreError> {
        self.task_by_id_mut(task_id)?.start(now)
    }

    pub fn mark_task_done_by_id(&mut self, task_id: &str) -> Result<(), StoreError> {
        self.task_by_id_mut(task_id)?.mark_done();
        Ok(())
    }

    pub fn delete_task_by_id(&mut self, task_id: &str) -> Result<Task, StoreError> {
        let (page_id, index) = self
            .find_task(task_id)
            .map(|(page_id, index)| (page_id.to_string(), index))
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        let page = self
            .pages
            .get_mut(&page_id)
            .ok_or_else(|| StoreError::PageNotFound(page_id.clone()))?;
        page.delete_task(index)
    }

    pub fn add_page(&mut self, page_id: &str, title: impl Into<String>) -> Result<(), StoreError> {
        if self.pages.contains_key(page_id) {
            return Err(StoreError::PageExists(page_id.to_string()));
        }
        self.pages.insert(page_id.to_string(), Page::new(title));
        Ok(())
    }

    pub fn retitle_page(&mut self, page_id: &str, title: impl Into<String>) -> Result<(), StoreError> {
        let page = self
            .pages
            .get_mut(page_id)
            .ok_or_else(|| StoreError::PageNotFound(page_id.to_string()))?;
        page.title = title.into();
        Ok(())
    }

    /// Moves a page to a new key. Renaming `"default"` leaves a fresh empty
    /// `"default"` behind.
    pub fn rename_page(&mut self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        if self.pages.contains_key(new_id) {
            return Err(StoreError::PageExists(new_id.to_string()));
        }
        let page = self
            .pages
            .remove(old_id)
            .ok_or_else(|| StoreError::PageNotFound(old_id.to_string()))?;
        self.pages.insert(new_id.to_string(), page);
        if self.current_page == old_id {
            self.current_page = new_id.to_string();
        }
        self.heal();
        Ok(())
    }

    /// Removes a page. `"default"` is never removed, only emptied.
    pub fn delete_page(&mut self, page_id: &str) {
        if page_id == DEFAULT_PAGE {
            self.pages
                .entry(default_page_id())
                .or_insert_with(|| Page::new(DEFAULT_PAGE))
                .tasks
                .clear();
            return;
        }
        self.pages.remove(page_id);
        if self.current_page == page_id {
            self.current_page = default_page_id();
        }
        self.heal();
    }

    /// Starts every never-started, unfinished task whose scheduled start has
    /// passed. Returns the ids started.
    pub fn start_due_scheduled(&mut self, now: NaiveDateTime) -> Vec<TaskId> {
        let mut started = Vec::new();
        for task in self.pages.values_mut().flat_map(|p| p.tasks.iter_mut()) {
            let due = matches!(task.scheduled_start, Some(at) if at <= now);
            if due && !task.is_started() && !task.completed && task.start(now).is_ok() {
                started.push(task.id.clone());
            }
        }
        started
    }

    /// Completes every task whose timer has run out. Returns the ids finished.
    pub fn finish_expired(&mut self, now: NaiveDateTime) -> Vec<TaskId> {
        let mut finished = Vec::new();
        for task in self.pages.values_mut().flat_map(|p| p.tasks.iter_mut()) {
            if task.state(now) == TaskState::Expired {
                task.mark_done();
                finished.push(task.id.clone());
            }
        }
        finished
    }
}
