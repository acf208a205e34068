use std::path::Path;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use tasko_core::config::Config;
use tasko_core::storage::{LocalBackend, PersistenceAdapter, StorageKey};
use tasko_core::surface::{Profile, Surface, SurfaceKind};
use tasko_core::sync_area::SyncArea;
use tasko_core::task::{Task, TaskId};
use tasko_shared::{Priority, Recurrence, StatusFilter, TaskDraft, TaskQuery};
use tempfile::tempdir;

fn config_in(dir: &Path) -> Config {
    Config {
        data_dir: Some(dir.to_path_buf()),
        ..Config::default()
    }
}

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

async fn open_page(cfg: &Config) -> Surface {
    let profile = Profile::open(cfg).expect("open profile");
    profile.open_surface(SurfaceKind::FullPage).await
}

fn all() -> TaskQuery {
    TaskQuery::default()
}

#[tokio::test]
async fn newest_task_goes_first() {
    let temp = tempdir().expect("tempdir");
    let mut page = open_page(&config_in(temp.path())).await;
    let now = at(2026, 3, 10, 9);

    let before = page.store().filter(&all()).len();
    page.store_mut()
        .add(TaskDraft::titled("A"), now)
        .await
        .expect("add A");
    let b = page
        .store_mut()
        .add(TaskDraft::titled("B"), now)
        .await
        .expect("add B");

    let listed = page.store().filter(&all());
    assert_eq!(listed.len(), before + 2);
    assert_eq!(listed[0].id, b);
    let titles: Vec<&str> = listed.iter().map(|task| task.title.as_str()).collect();
    assert_eq!(titles, vec!["B", "A"]);

    assert!(page.store_mut().add(TaskDraft::titled("   "), now).await.is_none());
    assert_eq!(page.store().tasks().len(), 2);
}

#[tokio::test]
async fn toggling_twice_restores_the_task() {
    let temp = tempdir().expect("tempdir");
    let mut page = open_page(&config_in(temp.path())).await;
    let now = at(2026, 3, 10, 9);

    let id = page
        .store_mut()
        .add(TaskDraft::titled("Water plants"), now)
        .await
        .expect("add");

    assert_eq!(page.store_mut().toggle_complete(&id, now).await, Some(true));
    assert!(page.store().get(&id).and_then(|task| task.completed_at).is_some());

    assert_eq!(page.store_mut().toggle_complete(&id, now).await, Some(false));
    let task = page.store().get(&id).expect("task");
    assert!(!task.completed);
    assert_eq!(task.completed_at, None);
    assert_eq!(page.store().tasks().len(), 1);
}

#[tokio::test]
async fn daily_task_due_today_spawns_tomorrow() {
    let temp = tempdir().expect("tempdir");
    let mut page = open_page(&config_in(temp.path())).await;
    let now = at(2026, 3, 10, 12);

    let draft = TaskDraft {
        due_date: Some("2026-03-10".to_string()),
        recurrence: Recurrence::Daily,
        priority: Priority::High,
        category: "Home".to_string(),
        ..TaskDraft::titled("Stretch")
    };
    let id = page.store_mut().add(draft, now).await.expect("add");
    page.store_mut().toggle_complete(&id, now).await;

    let tasks = page.store().tasks();
    assert_eq!(tasks.len(), 2);
    let successor = &tasks[0];
    assert_ne!(successor.id, id);
    assert!(!successor.completed);
    assert_eq!(successor.due_date, Some(date(2026, 3, 11)));
    assert_eq!(successor.title, "Stretch");
    assert_eq!(successor.priority, Priority::High);
    assert_eq!(successor.category.as_deref(), Some("Home"));
    assert_eq!(successor.recurrence, Recurrence::Daily);
    assert!(tasks[1].completed);
}

#[tokio::test]
async fn monthly_task_with_stale_due_date_counts_from_today() {
    let temp = tempdir().expect("tempdir");
    let mut page = open_page(&config_in(temp.path())).await;
    let now = at(2026, 3, 10, 12);

    let draft = TaskDraft {
        due_date: Some("2026-01-15".to_string()),
        recurrence: Recurrence::Monthly,
        ..TaskDraft::titled("Pay rent")
    };
    let id = page.store_mut().add(draft, now).await.expect("add");
    page.store_mut().toggle_complete(&id, now).await;

    assert_eq!(page.store().tasks()[0].due_date, Some(date(2026, 4, 10)));
}

#[tokio::test]
async fn today_follows_the_configured_timezone() {
    let temp = tempdir().expect("tempdir");
    let cfg = Config {
        timezone: "Pacific/Auckland".to_string(),
        ..config_in(temp.path())
    };
    let mut page = open_page(&cfg).await;
    // Already March 11th in Auckland.
    let now = at(2026, 3, 10, 12);

    let draft = TaskDraft {
        recurrence: Recurrence::Daily,
        ..TaskDraft::titled("Journal")
    };
    let id = page.store_mut().add(draft, now).await.expect("add");
    page.store_mut().toggle_complete(&id, now).await;

    assert_eq!(page.store().tasks()[0].due_date, Some(date(2026, 3, 12)));
}

#[tokio::test]
async fn removing_twice_is_harmless() {
    let temp = tempdir().expect("tempdir");
    let mut page = open_page(&config_in(temp.path())).await;
    let now = at(2026, 3, 10, 9);

    let id = page
        .store_mut()
        .add(TaskDraft::titled("Call mom"), now)
        .await
        .expect("add");

    assert!(page.store_mut().remove(&id).await);
    assert!(page.store().filter(&all()).iter().all(|task| task.id != id));
    assert!(!page.store_mut().remove(&id).await);
}

#[tokio::test]
async fn buy_milk_lifecycle() {
    let temp = tempdir().expect("tempdir");
    let mut page = open_page(&config_in(temp.path())).await;
    let now = at(2026, 3, 10, 9);
    assert!(page.store().tasks().is_empty());

    let draft = TaskDraft {
        priority: Priority::Low,
        ..TaskDraft::titled("Buy milk")
    };
    let id = page.store_mut().add(draft, now).await.expect("add");

    let active = page
        .store()
        .filter(&TaskQuery::with_status(StatusFilter::Active));
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].title, "Buy milk");
    assert!(!active[0].completed);

    page.store_mut().toggle_complete(&id, now).await;
    let done = page
        .store()
        .filter(&TaskQuery::with_status(StatusFilter::Completed));
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].id, id);

    assert_eq!(page.store_mut().clear_completed().await, 1);
    assert!(page.store().filter(&all()).is_empty());
}

#[tokio::test]
async fn saved_tasks_load_back_unchanged() {
    let temp = tempdir().expect("tempdir");
    let local = LocalBackend::open(temp.path()).expect("open local");
    let adapter: PersistenceAdapter<SyncArea, LocalBackend> = PersistenceAdapter::new(None, local);
    let now = at(2026, 3, 10, 9);

    let mut done = Task::new_active("Ship release".to_string(), now);
    done.description = Some("tag and publish".to_string());
    done.priority = Priority::High;
    done.category = Some("Work".to_string());
    done.due_date = Some(date(2026, 3, 12));
    done.recurrence = Recurrence::Weekly;
    done.set_completed(true, at(2026, 3, 11, 17));
    done.extra.insert("dueTime".to_string(), json!("17:30"));
    let plain = Task::new_active("Read".to_string(), now);
    let tasks = vec![done, plain];

    adapter.save_tasks(&tasks).await;
    assert_eq!(adapter.load_tasks().await, tasks);

    let raw = std::fs::read_to_string(temp.path().join("todos.json")).expect("read todos file");
    let stored: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(stored, serde_json::to_value(&tasks).expect("encode"));
    assert_eq!(stored[0]["dueDate"], json!("2026-03-12"));
    assert_eq!(stored[0]["dueTime"], json!("17:30"));

    adapter
        .save_categories(&["Work".to_string(), "Home".to_string()])
        .await;
    assert_eq!(adapter.load_categories().await, vec!["Work", "Home"]);
}

#[tokio::test]
async fn data_survives_reopening_the_profile() {
    let temp = tempdir().expect("tempdir");
    let cfg = config_in(temp.path());
    let now = at(2026, 3, 10, 9);

    let id = {
        let mut page = open_page(&cfg).await;
        let draft = TaskDraft {
            category: "Errands".to_string(),
            ..TaskDraft::titled("Post office")
        };
        page.store_mut().add(draft, now).await.expect("add")
    };

    let page = open_page(&cfg).await;
    assert_eq!(page.store().get(&id).map(|task| task.title.as_str()), Some("Post office"));
    assert_eq!(page.store().categories(), ["Errands".to_string()]);
}

#[tokio::test]
async fn blobs_with_numeric_ids_and_blank_fields_load() {
    let temp = tempdir().expect("tempdir");
    let cfg = config_in(temp.path());
    let profile = Profile::open(&cfg).expect("open profile");

    let blob = json!([{
        "id": 1700000000000u64,
        "title": "From the popup",
        "description": "",
        "priority": "medium",
        "category": "",
        "dueDate": "",
        "dueTime": "",
        "completed": false,
        "createdAt": "2026-03-01T08:00:00.000Z"
    }]);
    std::fs::write(
        temp.path().join("sync").join(format!("{}.json", StorageKey::Todos)),
        blob.to_string(),
    )
    .expect("seed todos");

    let mut page = profile.open_surface(SurfaceKind::FullPage).await;
    let task = &page.store().tasks()[0];
    assert_eq!(task.id.as_str(), "1700000000000");
    assert_eq!(task.description, None);
    assert_eq!(task.category, None);
    assert_eq!(task.due_date, None);
    assert_eq!(task.extra.get("dueTime"), Some(&json!("")));

    let id = TaskId::from("1700000000000");
    assert_eq!(
        page.store_mut().toggle_complete(&id, at(2026, 3, 10, 9)).await,
        Some(true)
    );
}

#[tokio::test]
async fn reorder_moves_to_the_target_slot() {
    let temp = tempdir().expect("tempdir");
    let mut page = open_page(&config_in(temp.path())).await;
    let now = at(2026, 3, 10, 9);

    let mut ids = Vec::new();
    for title in ["D", "C", "B", "A"] {
        let id = page
            .store_mut()
            .add(TaskDraft::titled(title), now)
            .await
            .expect("add");
        ids.push(id);
    }
    let titles = |page: &Surface| -> Vec<String> {
        page.store()
            .tasks()
            .iter()
            .map(|task| task.title.clone())
            .collect()
    };
    assert_eq!(titles(&page), vec!["A", "B", "C", "D"]);

    // A (index 0) dropped on C (index 2).
    assert!(page.store_mut().reorder(&ids[3], &ids[1]).await);
    assert_eq!(titles(&page), vec!["B", "C", "A", "D"]);

    // D (index 3) dropped on B (index 0).
    assert!(page.store_mut().reorder(&ids[0], &ids[2]).await);
    assert_eq!(titles(&page), vec!["D", "B", "C", "A"]);

    assert!(!page.store_mut().reorder(&ids[0], &TaskId::from("missing")).await);
}

#[tokio::test]
async fn one_bad_record_does_not_wipe_stored_tasks() {
    let temp = tempdir().expect("tempdir");
    let profile = Profile::open(&config_in(temp.path())).expect("open profile");
    let todos = temp.path().join("sync").join(format!("{}.json", StorageKey::Todos));
    let blob = json!([
        {"id": "a1", "title": "Keep me", "createdAt": "2026-03-01T08:00:00Z"},
        {"id": "a2", "title": "Odd priority", "priority": "urgent", "createdAt": "2026-03-01T09:00:00Z"},
        {"id": "a3", "title": "Bad completion", "completed": true, "completedAt": "last week", "createdAt": "2026-03-01T10:00:00Z"},
        {"id": "a4", "title": "No creation time"}
    ]);
    std::fs::write(&todos, blob.to_string()).expect("seed todos");

    let mut page = profile.open_surface(SurfaceKind::FullPage).await;
    let ids: Vec<&str> = page.store().tasks().iter().map(|task| task.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2", "a3"]);
    assert_eq!(page.store().tasks()[1].priority, Priority::Medium);
    assert_eq!(
        page.store().tasks()[2].completed_at,
        Some(at(2026, 3, 1, 10))
    );

    page.store_mut()
        .quick_add("New", at(2026, 3, 10, 9))
        .await
        .expect("add");

    let raw = std::fs::read_to_string(&todos).expect("read todos");
    let stored: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let titles: Vec<&str> = stored
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|task| task["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["New", "Keep me", "Odd priority", "Bad completion"]);
}
