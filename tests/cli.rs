use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn taskpages(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("taskpages").unwrap();
    cmd.current_dir(dir.path())
        .env("TASKPAGES_CONFIG", dir.path().join("no-config.yml"))
        .env_remove("TASKPAGES_STORE")
        .env_remove("TASKPAGES_PAGE");
    cmd
}

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("pages.json")
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn add_start_done_delete_flow() {
    let dir = TempDir::new().unwrap();
    let store = store_path(&dir);
    let store_arg = store.to_str().unwrap();

    taskpages(&dir)
        .args(["--store", store_arg, "add", "Read", "--timer", "10", "--reward", "tea"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added task"));

    taskpages(&dir)
        .args(["--store", store_arg, "start", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Started Read, ends at"));

    let doc = read_json(&store);
    let task = &doc["pages"]["default"]["tasks"][0];
    assert!(task["started_at"].is_string());
    assert!(task["ends_at"].is_string());
    assert_eq!(task["completed"], json!(false));

    taskpages(&dir)
        .args(["--store", store_arg, "done", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reward: tea"));
    assert_eq!(read_json(&store)["pages"]["default"]["tasks"][0]["completed"], json!(true));

    taskpages(&dir)
        .args(["--store", store_arg, "delete", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted Read"));
    assert_eq!(read_json(&store)["pages"]["default"]["tasks"], json!([]));
}

#[test]
fn missing_task_is_reported_without_failing() {
    let dir = TempDir::new().unwrap();
    let store = store_path(&dir);
    let store_arg = store.to_str().unwrap();
    taskpages(&dir)
        .args(["--store", store_arg, "add", "Only"])
        .assert()
        .success();
    let before = fs::read_to_string(&store).unwrap();

    taskpages(&dir)
        .args(["--store", store_arg, "done", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No task #5 (page has 1)"));
    taskpages(&dir)
        .args(["--store", store_arg, "start", "--id", "nope"])
        .assert()
        .success()
        .stdout(predicate::str::contains("task not found: nope"));

    assert_eq!(fs::read_to_string(&store).unwrap(), before);
}

#[test]
fn tasks_can_be_addressed_by_id_across_pages() {
    let dir = TempDir::new().unwrap();
    let store = store_path(&dir);
    let store_arg = store.to_str().unwrap();
    taskpages(&dir)
        .args(["--store", store_arg, "page", "add", "work", "--title", "Work"])
        .assert()
        .success();
    taskpages(&dir)
        .args(["--store", store_arg, "add", "Deck", "--page", "work", "--timer", "25"])
        .assert()
        .success();

    let id = read_json(&store)["pages"]["work"]["tasks"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    taskpages(&dir)
        .args(["--store", store_arg, "done", "--id", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Done: Deck"));
    assert_eq!(read_json(&store)["pages"]["work"]["tasks"][0]["completed"], json!(true));
}

#[test]
fn page_management_protects_default() {
    let dir = TempDir::new().unwrap();
    let store = store_path(&dir);
    let store_arg = store.to_str().unwrap();

    taskpages(&dir)
        .args(["--store", store_arg, "page", "add", "gym"])
        .assert()
        .success();
    taskpages(&dir)
        .args(["--store", store_arg, "page", "switch", "gym"])
        .assert()
        .success();
    taskpages(&dir)
        .args(["--store", store_arg, "page", "rename", "gym", "default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("page already exists: default"));
    taskpages(&dir)
        .args(["--store", store_arg, "page", "rename", "gym", "fitness"])
        .assert()
        .success();
    assert_eq!(read_json(&store)["current_page"], json!("fitness"));

    taskpages(&dir)
        .args(["--store", store_arg, "page", "delete", "fitness"])
        .assert()
        .success();
    taskpages(&dir)
        .args(["--store", store_arg, "page", "delete", "default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared page default"));

    let doc = read_json(&store);
    assert_eq!(doc["current_page"], json!("default"));
    assert!(doc["pages"]["default"].is_object());
    assert!(doc["pages"].get("fitness").is_none());

    taskpages(&dir)
        .args(["--store", store_arg, "pages"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* default"));
}

#[test]
fn tick_starts_due_tasks_and_finishes_timers() {
    let dir = TempDir::new().unwrap();
    let store = store_path(&dir);
    fs::write(
        &store,
        serde_json::to_string_pretty(&json!({
            "current_page": "default",
            "pages": {"default": {"title": "default", "tasks": [
                {"id": "due", "name": "Stretch", "timer_minutes": null, "reward": null,
                 "scheduled_start": "2000-01-01 06:00", "started_at": null, "completed": false},
                {"id": "old", "name": "Boil", "timer_minutes": 3, "reward": "tea",
                 "started_at": "2000-01-01 09:00", "completed": false}
            ]}}
        }))
        .unwrap(),
    )
    .unwrap();

    taskpages(&dir)
        .args(["--store", store.to_str().unwrap(), "tick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Started scheduled task Stretch"))
        .stdout(predicate::str::contains("Timer finished for Boil"));

    let doc = read_json(&store);
    let tasks = &doc["pages"]["default"]["tasks"];
    assert!(tasks[0]["started_at"].is_string());
    assert_eq!(tasks[0]["ends_at"], Value::Null);
    assert_eq!(tasks[1]["completed"], json!(true));
    assert_eq!(tasks[1]["ends_at"], json!("2000-01-01 09:03"));
}

#[test]
fn single_page_rejects_second_start() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("data").join("page.json");
    let file_arg = file.to_str().unwrap();

    taskpages(&dir)
        .args(["single", "--file", file_arg, "init", "--title", "Chores"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Page Chores"));
    taskpages(&dir)
        .args(["single", "--file", file_arg, "add", "Dishes", "--timer", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Dishes [Not Done]"));
    taskpages(&dir)
        .args(["single", "--file", file_arg, "start", "1"])
        .assert()
        .success();
    let first = fs::read_to_string(&file).unwrap();

    taskpages(&dir)
        .args(["single", "--file", file_arg, "start", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Task #1 was already started"));
    assert_eq!(fs::read_to_string(&file).unwrap(), first);

    taskpages(&dir)
        .args(["single", "--file", file_arg, "done", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Dishes [Done]"));
    assert_eq!(read_json(&file)["title"], json!("Chores"));
}

#[test]
fn legacy_page_file_opens_as_store() {
    let dir = TempDir::new().unwrap();
    let store = store_path(&dir);
    fs::write(
        &store,
        r#"{"title": "Old list", "tasks": [{"name": "Water plants", "timer_minutes": null, "reward": null, "completed": false}]}"#,
    )
    .unwrap();

    taskpages(&dir)
        .args(["--store", store.to_str().unwrap(), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Old list [default]"))
        .stdout(predicate::str::contains("Water plants"));
}

#[test]
fn rejects_empty_names_and_bad_times() {
    let dir = TempDir::new().unwrap();
    let store = store_path(&dir);
    let store_arg = store.to_str().unwrap();
    taskpages(&dir)
        .args(["--store", store_arg, "add", ""])
        .assert()
        .failure();
    taskpages(&dir)
        .args(["--store", store_arg, "add", "Later", "--at", "someday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid time"));
    taskpages(&dir)
        .args(["--store", store_arg, "add", "Later", "--timer", "ten"])
        .assert()
        .failure();
}

#[test]
fn init_creates_project_store_found_from_subdirectories() {
    let dir = TempDir::new().unwrap();
    taskpages(&dir)
        .args(["init", "--title", "Home"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized page store"));
    let project_store = dir.path().join(".taskpages").join("pages.json");
    assert_eq!(read_json(&project_store)["pages"]["default"]["title"], json!("Home"));

    let nested = dir.path().join("src").join("deep");
    fs::create_dir_all(&nested).unwrap();
    Command::cargo_bin("taskpages")
        .unwrap()
        .current_dir(&nested)
        .env("TASKPAGES_CONFIG", dir.path().join("no-config.yml"))
        .env_remove("TASKPAGES_STORE")
        .args(["add", "Sweep"])
        .assert()
        .success();
    assert_eq!(
        read_json(&project_store)["pages"]["default"]["tasks"][0]["name"],
        json!("Sweep")
    );
}

#[test]
fn init_honours_explicit_store_path() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("custom").join("tasks.json");
    taskpages(&dir)
        .args(["--store", store.to_str().unwrap(), "init", "--title", "Errands"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tasks.json"));

    assert_eq!(read_json(&store)["pages"]["default"]["title"], json!("Errands"));
    assert!(!dir.path().join(".taskpages").exists());
}

#[test]
fn listed_ids_of_legacy_tasks_can_be_used_later() {
    let dir = TempDir::new().unwrap();
    let store = store_path(&dir);
    let store_arg = store.to_str().unwrap();
    fs::write(
        &store,
        r#"{"current_page": "default", "pages": {"default": {"title": "default", "tasks": [{"name": "Mop", "completed": false}]}}}"#,
    )
    .unwrap();

    taskpages(&dir)
        .args(["--store", store_arg, "list"])
        .assert()
        .success();
    let id = read_json(&store)["pages"]["default"]["tasks"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    taskpages(&dir)
        .args(["--store", store_arg, "done", "--id", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Done: Mop"));
}
