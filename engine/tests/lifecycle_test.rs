//! End-to-end engine lifecycle tests over the public API.

use std::sync::Arc;

use chrono::Utc;
use taskpulse_engine::{
    EngineConfig, GitCommitInfo, Orchestrator, Partition, Priority, StaticVcs, SuggestedAction,
    Todo, TodoStatus,
};

fn test_config(dir: &std::path::Path) -> EngineConfig {
    EngineConfig {
        repo_dir: dir.to_path_buf(),
        data_dir: dir.join("data"),
        backlog_path: dir.join("BACKLOG.md"),
        backups: true,
        git_timeout_secs: 5,
        default_category: "general".to_string(),
        detect_on_init: false,
    }
}

fn session_todo(id: &str, content: &str) -> Todo {
    Todo::with_id(id, content, Priority::Medium)
}

fn commit(hash: &str, message: &str, files: &[&str]) -> GitCommitInfo {
    GitCommitInfo {
        hash: hash.to_string(),
        message: message.to_string(),
        author: "Ada".to_string(),
        timestamp: Utc::now(),
        changed_files: files.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test]
async fn sync_detect_complete_report_flow() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let vcs = StaticVcs::new()
        .with_tracked("src/components/PricingCalculator.tsx")
        .with_commit(commit(
            "abc123",
            "add pricing calculator component",
            &["src/components/PricingCalculator.tsx"],
        ));

    let orch = Orchestrator::new(config.clone(), Arc::new(vcs));
    orch.initialize().await.unwrap();

    // a session pushes two work items
    let result = orch
        .sync_session_todos(vec![
            session_todo("t1", "create PricingCalculator component"),
            session_todo("t2", "investigate cache stampede"),
        ])
        .await
        .unwrap();
    assert_eq!(result.added.len(), 2);

    // detection surfaces the pattern match for t1 and nothing for t2
    let detections = orch.run_completion_detection().await.unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].todo_id, "t1");
    assert_eq!(detections[0].suggested_action, SuggestedAction::MarkCompleted);

    // the unattended threshold applies it
    let applied = orch
        .try_run_completion_detection(0.8)
        .await
        .unwrap()
        .expect("guard free");
    assert_eq!(applied.len(), 1);

    let archived = orch.list_todos(Some(Partition::Archived)).await;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].1.id, "t1");
    assert_eq!(archived[0].1.status, TodoStatus::Completed);

    let report = orch.generate_progress_report().await;
    assert_eq!(report.total, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.velocity, 1);
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    {
        let orch = Orchestrator::new(config.clone(), Arc::new(StaticVcs::new()));
        orch.initialize().await.unwrap();
        orch.sync_session_todos(vec![
            session_todo("keep", "durable work"),
            session_todo("done", "finished work"),
        ])
        .await
        .unwrap();
        orch.mark_todo_completed("done", Some("verified by hand".to_string()))
            .await
            .unwrap();
        orch.shutdown().await.unwrap();
    }

    let orch = Orchestrator::new(config, Arc::new(StaticVcs::new()));
    orch.initialize().await.unwrap();

    let project = orch.list_todos(Some(Partition::Project)).await;
    assert_eq!(project.len(), 1);
    assert_eq!(project[0].1.id, "keep");

    let archived = orch.list_todos(Some(Partition::Archived)).await;
    assert_eq!(archived.len(), 1);
    assert!(archived[0]
        .1
        .tags
        .iter()
        .any(|t| t == "completed: verified by hand"));
}

#[tokio::test]
async fn dependency_chain_unblocks_through_the_orchestrator() {
    let dir = tempfile::tempdir().unwrap();
    let orch = Orchestrator::new(test_config(dir.path()), Arc::new(StaticVcs::new()));
    orch.initialize().await.unwrap();

    let mut dependent = session_todo("child", "depends on the base");
    dependent.status = TodoStatus::Blocked;
    dependent.depends_on = vec!["base".to_string()];
    orch.sync_session_todos(vec![session_todo("base", "base work"), dependent])
        .await
        .unwrap();

    orch.mark_todo_completed("base", None).await.unwrap();

    let project = orch.list_todos(Some(Partition::Project)).await;
    let child = project.iter().find(|(_, t)| t.id == "child").unwrap();
    assert_eq!(child.1.status, TodoStatus::Pending);
}

#[tokio::test]
async fn backlog_document_round_trips_through_completion() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::write(
        &config.backlog_path,
        "## High Priority\n\n- [ ] Wire the billing webhooks\n\n## Notes\n\nkeep me\n",
    )
    .unwrap();

    let orch = Orchestrator::new(config.clone(), Arc::new(StaticVcs::new()));
    orch.initialize().await.unwrap();

    let future = orch.list_todos(Some(Partition::Future)).await;
    assert_eq!(future.len(), 1);
    let future_id = future[0].1.id.clone();

    // promote the backlog item and complete it
    orch.promote_todo(&future_id, Some("billing".to_string()))
        .await
        .unwrap();
    orch.mark_todo_completed(&future_id, None).await.unwrap();

    // the rewritten document keeps the hand-written section and drops the
    // promoted item from the future sections
    let rewritten = std::fs::read_to_string(&config.backlog_path).unwrap();
    assert!(rewritten.contains("## Notes"));
    assert!(rewritten.contains("keep me"));
    assert!(!rewritten.contains("Wire the billing webhooks"));
}

#[tokio::test]
async fn vcs_unavailable_degrades_to_no_detections() {
    let dir = tempfile::tempdir().unwrap();
    // GitCli over a plain temp directory: every query degrades to empty
    let vcs = taskpulse_engine::GitCli::new(dir.path(), std::time::Duration::from_secs(5));

    let orch = Orchestrator::new(test_config(dir.path()), Arc::new(vcs));
    orch.initialize().await.unwrap();
    orch.sync_session_todos(vec![session_todo("t1", "implement the payment retries")])
        .await
        .unwrap();

    let detections = orch.run_completion_detection().await.unwrap();
    assert!(detections.is_empty(), "no repository means no activity");
}

#[tokio::test]
async fn backups_accumulate_per_save_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let orch = Orchestrator::new(config.clone(), Arc::new(StaticVcs::new()));
    orch.initialize().await.unwrap();
    orch.sync_session_todos(vec![session_todo("t1", "first")])
        .await
        .unwrap();
    orch.sync_session_todos(vec![session_todo("t2", "second")])
        .await
        .unwrap();

    let backups = std::fs::read_dir(config.data_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        .count();
    assert!(backups >= 1, "timestamped backups written before overwrite");
}
