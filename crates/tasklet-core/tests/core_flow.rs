use chrono::{Duration, TimeZone, Utc};
use tasklet_core::config::TaskletConfig;
use tasklet_core::editor::BufferEditor;
use tasklet_core::render::HtmlRenderer;
use tasklet_core::storage::{JsonFileBackend, StorageBackend};
use tasklet_core::view::{ActiveFilter, ActiveView};
use tasklet_core::{ToggleOutcome, open_native};
use tempfile::tempdir;

fn config_for(path: &std::path::Path, delay_ms: u64) -> TaskletConfig {
    let mut cfg = TaskletConfig::default();
    cfg.storage.path = Some(path.to_path_buf());
    cfg.completion.commit_delay_ms = delay_ms;
    cfg
}

#[test]
fn tasks_survive_a_restart() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("data").join("snapshot.json");
    let cfg = config_for(&path, 200);
    let now = Utc
        .with_ymd_and_hms(2026, 9, 1, 10, 0, 0)
        .single()
        .expect("valid instant");

    let mut app = open_native(&cfg, HtmlRenderer::new(), BufferEditor::new()).expect("open");
    app.set_draft_template(Some("Work"));
    app.editor_mut().set_raw("<div>Plan <em>sprint</em></div>");
    let planned = app.submit(now).expect("submit").id;
    app.editor_mut().set_raw("Buy milk");
    let milk = app.submit(now).expect("submit").id;

    assert_eq!(
        app.request_toggle(&planned, now).expect("toggle"),
        ToggleOutcome::Scheduled
    );
    assert_eq!(app.tick(now + Duration::milliseconds(250)), 1);
    app.set_filter(ActiveFilter::NoTemplate);
    assert!(!app.is_dirty());
    drop(app);

    let reopened = open_native(&cfg, HtmlRenderer::new(), BufferEditor::new()).expect("reopen");
    let store = reopened.store();
    assert_eq!(store.tasks().len(), 2);
    assert_eq!(store.templates().iter().collect::<Vec<_>>(), vec!["Work"]);
    assert_eq!(store.view().active_filter, ActiveFilter::NoTemplate);

    let planned = store.task(&planned).expect("planned task");
    assert_eq!(planned.content_html, "<p>Plan <i>sprint</i></p>");
    assert!(planned.completed);
    assert!(planned.completed_at.is_some());

    let visible = store.visible_tasks();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, milk);
    assert!(reopened.renderer().markup().contains("Buy milk"));
}

#[test]
fn corrupt_file_starts_empty_and_is_repaired_by_next_save() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("snapshot.json");
    std::fs::write(&path, "{ definitely not json").expect("seed corrupt file");
    let cfg = config_for(&path, 0);

    let mut app = open_native(&cfg, HtmlRenderer::new(), BufferEditor::new()).expect("open");
    assert!(app.store().tasks().is_empty());
    assert!(app.renderer().markup().contains("No tasks yet"));

    app.set_view(ActiveView::Completed);

    let raw = JsonFileBackend::new(&path)
        .read()
        .expect("read")
        .expect("file exists");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json now");
    assert_eq!(value["activeView"], "completed");
    assert_eq!(value["version"], 2);
}

#[test]
fn legacy_file_is_migrated_on_open() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("snapshot.json");
    let legacy = serde_json::json!({
        "version": 1,
        "templates": ["General", "Errands"],
        "tasks": [
            {
                "id": "t-1",
                "contentHtml": "<p>old</p>",
                "template": "General",
                "createdAt": "2025-01-01T00:00:00Z",
                "completed": false,
                "completedAt": null
            },
            { "id": "t-2", "contentHtml": "<p></p>" }
        ],
        "activeFilter": "General",
        "activeView": "tasks"
    });
    std::fs::write(&path, legacy.to_string()).expect("seed legacy file");

    let app = open_native(&config_for(&path, 0), HtmlRenderer::new(), BufferEditor::new())
        .expect("open");
    let store = app.store();

    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.tasks()[0].template, None);
    assert_eq!(store.templates().iter().collect::<Vec<_>>(), vec!["Errands"]);
    assert_eq!(store.view().active_filter, ActiveFilter::All);
}
