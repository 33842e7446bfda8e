use crate::config::Config;
use crate::model::{Page, PageStore};
use crate::timer::{format_timestamp_with, Precision};
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::Serialize;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const PROJECT_DIR: &str = ".taskpages";
const STORE_FILE: &str = "pages.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Explicit,
    Project,
    Global,
}

#[derive(Debug, Clone)]
pub struct StoreLocation {
    pub path: PathBuf,
    pub scope: StoreScope,
}

/// The two on-disk layouts the tracker has written over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaGeneration {
    SinglePage,
    MultiPage,
}

impl SchemaGeneration {
    fn detect(doc: &Value) -> Option<Self> {
        let obj = doc.as_object()?;
        if obj.contains_key("pages") || obj.contains_key("current_page") {
            Some(SchemaGeneration::MultiPage)
        } else if obj.contains_key("tasks") || obj.contains_key("title") {
            Some(SchemaGeneration::SinglePage)
        } else {
            None
        }
    }
}

pub fn init_project_store() -> Result<StoreLocation> {
    let cwd = env::current_dir()?;
    let dir = cwd.join(PROJECT_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", PROJECT_DIR))?;
    init_store_at(dir.join(STORE_FILE), StoreScope::Project)
}

/// Creates an empty store at `path` unless one is already there.
pub fn init_store_at(path: PathBuf, scope: StoreScope) -> Result<StoreLocation> {
    if !path.exists() {
        save_store(&path, &PageStore::new())?;
    }
    Ok(StoreLocation { path, scope })
}

pub fn locate_store(start: &Path, config: &Config) -> Result<StoreLocation> {
    if let Some(path) = &config.store_path {
        return Ok(StoreLocation {
            path: path.clone(),
            scope: StoreScope::Explicit,
        });
    }
    if let Some(project_path) = find_project_store(start) {
        return Ok(StoreLocation {
            path: project_path,
            scope: StoreScope::Project,
        });
    }
    Ok(StoreLocation {
        path: global_store_path()?,
        scope: StoreScope::Global,
    })
}

/// Reads the page store, bootstrapping and persisting an empty one on first
/// run. Older documents are upgraded and written back straight away, so
/// backfilled ids stay the same from one run to the next.
pub fn load_store(path: &Path) -> Result<PageStore> {
    if !path.exists() {
        let store = PageStore::new();
        save_store(path, &store)?;
        tracing::info!(path = %path.display(), "created new page store");
        return Ok(store);
    }
    let doc = read_document(path)?;
    let generation = SchemaGeneration::detect(&doc);
    let mut store = match generation {
        Some(SchemaGeneration::MultiPage) => {
            serde_json::from_value::<PageStore>(doc).context("parsing page store")?
        }
        Some(SchemaGeneration::SinglePage) => {
            tracing::info!(path = %path.display(), "upgrading single-page document");
            PageStore::from_single_page(serde_json::from_value(doc).context("parsing page")?)
        }
        None => bail!("{} is not a task page document", path.display()),
    };
    let fixes = store.upgrade();
    tracing::debug!(path = %path.display(), fixes, "loaded page store");
    if fixes > 0 || generation == Some(SchemaGeneration::SinglePage) {
        save_store(path, &store)?;
    }
    Ok(store)
}

pub fn save_store(path: &Path, store: &PageStore) -> Result<()> {
    let serialized = serde_json::to_string_pretty(store).context("serializing page store")?;
    write_replacing(path, serialized.as_bytes())?;
    tracing::debug!(path = %path.display(), "saved page store");
    Ok(())
}

/// Single-page flavour: reads one page, creating it with `title` if the file
/// does not exist yet.
pub fn load_page(path: &Path, title: &str) -> Result<Page> {
    if !path.exists() {
        let page = Page::new(title);
        save_page(path, &page)?;
        tracing::info!(path = %path.display(), "created new page");
        return Ok(page);
    }
    let doc = read_document(path)?;
    let mut page: Page = match SchemaGeneration::detect(&doc) {
        Some(SchemaGeneration::SinglePage) => serde_json::from_value(doc).context("parsing page")?,
        Some(SchemaGeneration::MultiPage) => {
            bail!("{} holds several pages; use the page store commands", path.display())
        }
        None => bail!("{} is not a task page document", path.display()),
    };
    let fixes = page.upgrade(title);
    tracing::debug!(path = %path.display(), fixes, "loaded page");
    if fixes > 0 {
        save_page(path, &page)?;
    }
    Ok(page)
}

/// Writes the single-page file the way the console tracker did: 4-space
/// indentation and timestamps always to the second.
pub fn save_page(path: &Path, page: &Page) -> Result<()> {
    let mut doc = serde_json::to_value(page).context("serializing page")?;
    if let Some(tasks) = doc.get_mut("tasks").and_then(Value::as_array_mut) {
        for (task, entry) in page.tasks.iter().zip(tasks.iter_mut()) {
            for (key, at) in [("started_at", task.started_at()), ("ends_at", task.ends_at())] {
                if let Some(at) = at {
                    entry[key] = Value::String(format_timestamp_with(&at, Precision::Second));
                }
            }
        }
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser).context("serializing page")?;
    write_replacing(path, &buf)?;
    tracing::debug!(path = %path.display(), "saved page");
    Ok(())
}

fn read_document(path: &Path) -> Result<Value> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {:?}", path))
}

/// Writes a sibling temp file and renames it over `path`, so readers never
/// observe a half-written document.
fn write_replacing(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents).with_context(|| format!("writing {:?}", tmp_path))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replacing {:?}", path))?;
    Ok(())
}

fn find_project_store(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(PROJECT_DIR).join(STORE_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn global_store_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "taskpages").context("locating data directory")?;
    Ok(dirs.data_dir().join(STORE_FILE))
}
