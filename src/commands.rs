use crate::cli::{PageCommand, SingleCommand, StateFilter, TaskTarget};
use crate::config::Config;
use crate::model::{Page, PageStore, RestartPolicy, StoreError, Task, TaskState, DEFAULT_PAGE};
use crate::storage::{
    init_project_store, init_store_at, load_page, load_store, locate_store, save_page, save_store,
    StoreLocation, StoreScope,
};
use crate::timer::{self, format_remaining, format_timestamp, Precision};
use anyhow::{anyhow, Result};
use chrono::NaiveDateTime;
use std::env;
use std::path::PathBuf;

enum Selector<'a> {
    Index(usize),
    Id(&'a str),
}

impl TaskTarget {
    fn selector(&self) -> Selector<'_> {
        match (&self.id, self.position) {
            (Some(id), _) => Selector::Id(id),
            // position 0 wraps to an index no page can hold
            (None, Some(position)) => Selector::Index(position.wrapping_sub(1)),
            (None, None) => Selector::Index(usize::MAX),
        }
    }
}

pub fn init(config: &Config, title: Option<String>) -> Result<()> {
    let location = match &config.store_path {
        Some(path) => init_store_at(path.clone(), StoreScope::Explicit)?,
        None => init_project_store()?,
    };
    if let Some(title) = title {
        let mut store = load_store(&location.path)?;
        if store.retitle_page(DEFAULT_PAGE, title).is_ok() {
            save_store(&location.path, &store)?;
        }
    }
    println!("Initialized page store at {}", location.path.display());
    Ok(())
}

pub fn list(config: &Config, page: Option<String>, filter: StateFilter) -> Result<()> {
    let (store, location) = load_current_store(config)?;
    let page_id = page.unwrap_or_else(|| store.current_page_id().to_string());
    let Some(shown) = store.page(&page_id) else {
        report(StoreError::PageNotFound(page_id));
        return Ok(());
    };
    let now = timer::now(config.precision);
    println!(
        "{} [{}] ({})",
        shown.title,
        page_id,
        match location.scope {
            StoreScope::Explicit => "explicit",
            StoreScope::Project => "project",
            StoreScope::Global => "global",
        }
    );
    let mut any = false;
    for (index, task) in shown.tasks.iter().enumerate() {
        if !filter.matches(task.state(now)) {
            continue;
        }
        any = true;
        print_task(index + 1, task, now);
    }
    if !any {
        println!("  No tasks yet");
    }
    Ok(())
}

pub fn pages(config: &Config) -> Result<()> {
    let (store, _) = load_current_store(config)?;
    for (id, page) in store.pages() {
        let marker = if id == store.current_page_id() { "*" } else { " " };
        println!("{} {} ({}, {} tasks)", marker, id, page.title, page.tasks.len());
    }
    Ok(())
}

pub fn add(
    config: &Config,
    name: String,
    timer_minutes: Option<u32>,
    reward: Option<String>,
    at: Option<String>,
    page: Option<String>,
) -> Result<()> {
    let (mut store, location) = load_current_store(config)?;
    let scheduled = parse_start_time(at.as_deref())?;
    let task = Task::new(name, timer_minutes, reward).with_scheduled_start(scheduled);
    let id = task.id.clone();
    let outcome = match page.as_deref() {
        Some(page_id) => store.add_task_to(page_id, task),
        None => {
            store.add_task(task);
            Ok(())
        }
    };
    if commit(outcome, &location, &store)?.is_some() {
        println!("Added task {}", id);
    }
    Ok(())
}

pub fn start(config: &Config, target: TaskTarget) -> Result<()> {
    let (mut store, location) = load_current_store(config)?;
    let now = timer::now(config.precision);
    let outcome = match target.selector() {
        Selector::Index(index) => store.start_task(index, now),
        Selector::Id(id) => store.start_task_by_id(id, now),
    };
    if commit(outcome, &location, &store)?.is_some() {
        let task = match target.selector() {
            Selector::Index(index) => store.current_page().and_then(|p| p.tasks.get(index)),
            Selector::Id(id) => store.task_by_id(id),
        };
        if let Some(task) = task {
            match task.ends_at() {
                Some(end) => println!("Started {}, ends at {}", task.name, format_timestamp(&end)),
                None => println!("Started {}", task.name),
            }
        }
    }
    Ok(())
}

pub fn done(config: &Config, target: TaskTarget) -> Result<()> {
    let (mut store, location) = load_current_store(config)?;
    let outcome = match target.selector() {
        Selector::Index(index) => store.mark_task_done(index),
        Selector::Id(id) => store.mark_task_done_by_id(id),
    };
    if commit(outcome, &location, &store)?.is_some() {
        let task = match target.selector() {
            Selector::Index(index) => store.current_page().and_then(|p| p.tasks.get(index)),
            Selector::Id(id) => store.task_by_id(id),
        };
        if let Some(task) = task {
            print_completion(task);
        }
    }
    Ok(())
}

pub fn delete(config: &Config, target: TaskTarget) -> Result<()> {
    let (mut store, location) = load_current_store(config)?;
    let outcome = match target.selector() {
        Selector::Index(index) => store.delete_task(index),
        Selector::Id(id) => store.delete_task_by_id(id),
    };
    if let Some(task) = commit(outcome, &location, &store)? {
        println!("Deleted {} ({})", task.name, task.id);
    }
    Ok(())
}

pub fn page(config: &Config, action: PageCommand) -> Result<()> {
    let (mut store, location) = load_current_store(config)?;
    match action {
        PageCommand::Add { id, title } => {
            let title = title.unwrap_or_else(|| id.clone());
            if commit(store.add_page(&id, title), &location, &store)?.is_some() {
                println!("Added page {}", id);
            }
        }
        PageCommand::Rename { old_id, new_id } => {
            let outcome = store.rename_page(&old_id, &new_id);
            if commit(outcome, &location, &store)?.is_some() {
                println!("Renamed page {} to {}", old_id, new_id);
            }
        }
        PageCommand::Delete { id } => {
            store.delete_page(&id);
            save_store(&location.path, &store)?;
            if id == DEFAULT_PAGE {
                println!("Cleared page {}", id);
            } else {
                println!("Deleted page {}", id);
            }
        }
        PageCommand::Switch { id } => {
            if commit(store.set_current_page(&id), &location, &store)?.is_some() {
                println!("Current page is now {}", id);
            }
        }
    }
    Ok(())
}

pub fn tick(config: &Config) -> Result<()> {
    let (mut store, location) = load_current_store(config)?;
    let now = timer::now(config.precision);
    let started = store.start_due_scheduled(now);
    let finished = store.finish_expired(now);
    if started.is_empty() && finished.is_empty() {
        println!("Nothing due");
        return Ok(());
    }
    save_store(&location.path, &store)?;
    for id in &started {
        if let Some(task) = store.task_by_id(id) {
            println!("Started scheduled task {}", task.name);
        }
    }
    for id in &finished {
        if let Some(task) = store.task_by_id(id) {
            println!("Timer finished for {}", task.name);
            print_completion(task);
        }
    }
    tracing::info!(started = started.len(), finished = finished.len(), "tick");
    Ok(())
}

pub fn single(config: &Config, file: Option<PathBuf>, action: SingleCommand) -> Result<()> {
    let path = file.unwrap_or_else(|| config.page_path.clone());
    let title = match &action {
        SingleCommand::Init { title: Some(title) } => title.clone(),
        _ => config.default_title.clone(),
    };
    let mut page = load_page(&path, &title)?;
    let outcome: Result<(), StoreError> = match action {
        SingleCommand::Init { .. } => {
            println!("Page {} at {}", page.title, path.display());
            return Ok(());
        }
        SingleCommand::List => {
            print_page(&page);
            return Ok(());
        }
        SingleCommand::Add {
            name,
            timer,
            reward,
        } => {
            page.add_task(Task::new(name, timer, reward));
            Ok(())
        }
        SingleCommand::Start { position } => {
            let now = timer::now(Precision::Second);
            page.start_task(position.wrapping_sub(1), now, RestartPolicy::Reject)
        }
        SingleCommand::Done { position } => {
            let index = position.wrapping_sub(1);
            page.mark_task_done(index).map(|()| {
                if let Ok(task) = page.task(index) {
                    print_completion(task);
                }
            })
        }
        SingleCommand::Delete { position } => page.delete_task(position.wrapping_sub(1)).map(|_| ()),
    };
    match outcome {
        Ok(()) => {
            save_page(&path, &page)?;
            print_page(&page);
        }
        Err(err) => report(err),
    }
    Ok(())
}

impl StateFilter {
    fn matches(self, state: TaskState) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::Running => matches!(state, TaskState::Running | TaskState::Expired),
            StateFilter::Scheduled => state == TaskState::Scheduled,
            StateFilter::Completed => state == TaskState::Completed,
        }
    }
}

fn load_current_store(config: &Config) -> Result<(PageStore, StoreLocation)> {
    let cwd = env::current_dir()?;
    let location = locate_store(&cwd, config)?;
    let store = load_store(&location.path)?;
    Ok((store, location))
}

/// Saves after a successful mutation; a refused one is reported and nothing
/// is written.
fn commit<T>(
    outcome: Result<T, StoreError>,
    location: &StoreLocation,
    store: &PageStore,
) -> Result<Option<T>> {
    match outcome {
        Ok(value) => {
            save_store(&location.path, store)?;
            Ok(Some(value))
        }
        Err(err) => {
            report(err);
            Ok(None)
        }
    }
}

fn report(err: StoreError) {
    tracing::warn!(error = %err, "operation left data unchanged");
    match err {
        StoreError::TaskIndexOutOfRange { index, len } => {
            println!("No task #{} (page has {})", index.wrapping_add(1), len)
        }
        StoreError::AlreadyStarted(index) => {
            println!("Task #{} was already started", index.wrapping_add(1))
        }
        other => println!("Nothing changed: {}", other),
    }
}

fn parse_start_time(input: Option<&str>) -> Result<Option<NaiveDateTime>> {
    let raw = match input {
        Some(r) => r.trim(),
        None => return Ok(None),
    };
    if raw.is_empty() {
        return Ok(None);
    }
    timer::parse_timestamp(raw)
        .map(Some)
        .map_err(|_| anyhow!("invalid time (use YYYY-MM-DD HH:MM): {}", raw))
}

fn status_text(completed: bool) -> &'static str {
    if completed {
        "Done"
    } else {
        "Not Done"
    }
}

fn print_page(page: &Page) {
    println!("{}", page.title);
    if page.tasks.is_empty() {
        println!("  No tasks yet");
    }
    for (index, task) in page.tasks.iter().enumerate() {
        println!("  {}. {} [{}]", index + 1, task.name, status_text(task.completed));
        if let Some(minutes) = task.timer_minutes() {
            println!("     timer: {} min", minutes);
        }
        if let Some(started) = task.started_at() {
            println!("     started: {}", format_timestamp(&started));
        }
    }
}

fn print_task(position: usize, task: &Task, now: NaiveDateTime) {
    let mark = if task.completed { "x" } else { " " };
    println!("  {}. [{}] {} ({})", position, mark, task.name, task.id);
    if let Some(minutes) = task.timer_minutes() {
        println!("     timer: {} min", minutes);
    }
    if let Some(reward) = &task.reward {
        println!("     reward: {}", reward);
    }
    if let Some(at) = task.scheduled_start {
        println!("     scheduled: {}", format_timestamp(&at));
    }
    if let Some(started) = task.started_at() {
        println!("     started: {}", format_timestamp(&started));
    }
    match (task.state(now), task.remaining(now)) {
        (TaskState::Running, Some(left)) => println!("     {}", format_remaining(left)),
        (TaskState::Expired, _) => println!("     time is up"),
        _ => {}
    }
}

fn print_completion(task: &Task) {
    match &task.reward {
        Some(reward) => println!("Done: {}. Reward: {}", task.name, reward),
        None => println!("Done: {}", task.name),
    }
}
