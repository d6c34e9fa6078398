#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::uninlined_format_args
)]

use super::{spawn_rig_actor, RigHandle};
use crate::config::SchedulerSettings;
use crate::db::RigStore;
use crate::error::GastownError;
use crate::testing::{rig_fixture, FakeGit, FakeSandbox, GitMode, SandboxMode};
use crate::types::{
    AgentRole, AgentStatus, BeadPriority, BeadStatus, BeadType, EscalationRequest, MergeResult,
    NewAgent, NewBead, NewReviewEntry, ReviewStatus, SOURCE_AGENT_KEY,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn spawn(store: &RigStore, sandbox: &FakeSandbox, git: &FakeGit, settings: SchedulerSettings) -> RigHandle {
    let (handle, _task) = spawn_rig_actor(
        store.clone(),
        Arc::new(sandbox.clone()),
        Arc::new(git.clone()),
        settings,
    );
    handle
}

fn quiet_settings() -> SchedulerSettings {
    SchedulerSettings {
        external_call_timeout_ms: 100,
        ..SchedulerSettings::default()
    }
}

async fn polecat(handle: &RigHandle, name: &str) -> crate::types::AgentId {
    handle
        .register_agent(NewAgent::new(AgentRole::Polecat, name, format!("{name}@test")))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn hook_arms_timer_soon_and_heartbeat_never_delays_it() {
    let (_db, store) = rig_fixture().await;
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());
    assert_eq!(handle.alarm().await.unwrap(), None);

    let agent_id = polecat(&handle, "toast").await;
    let bead = handle.create_bead(NewBead::issue("fix bug")).await.unwrap();
    let before = Utc::now();
    let hooked = handle.hook_bead(agent_id.clone(), bead.id).await.unwrap();
    assert_eq!(hooked.status, BeadStatus::InProgress);

    let armed = handle.alarm().await.unwrap().unwrap();
    assert!(armed >= before + Duration::seconds(4));
    assert!(armed <= Utc::now() + Duration::seconds(6));
    assert_eq!(store.alarm().await.unwrap(), Some(armed));

    handle.touch_heartbeat(agent_id).await.unwrap();
    assert_eq!(handle.alarm().await.unwrap(), Some(armed));
}

#[tokio::test]
async fn heartbeat_for_unknown_agent_is_a_quiet_no_op() {
    let (_db, store) = rig_fixture().await;
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());
    let touched = handle
        .touch_heartbeat(crate::types::AgentId::new("ag-nobody"))
        .await
        .unwrap();
    assert!(touched.is_none());
    assert_eq!(handle.alarm().await.unwrap(), None);
}

#[tokio::test]
async fn fire_rearms_active_while_agents_live_and_idle_otherwise() {
    let (_db, store) = rig_fixture().await;
    let settings = quiet_settings();
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), settings);

    let quiet = handle.fire_timer().await.unwrap();
    assert!(!quiet.activity.is_active());
    assert!(quiet.next_alarm > Utc::now() + Duration::seconds(200));

    polecat(&handle, "toast").await;
    let busy = handle.fire_timer().await.unwrap();
    assert!(busy.activity.is_active());
    assert!(busy.next_alarm < Utc::now() + Duration::seconds(31));
    assert_eq!(handle.alarm().await.unwrap(), Some(busy.next_alarm));
    assert!(busy.errors.is_empty(), "{:?}", busy.errors);
}

#[tokio::test]
async fn failed_dispatch_leaves_agent_idle_and_timer_armed() {
    let (_db, store) = rig_fixture().await;
    let sandbox = FakeSandbox::new(SandboxMode::Unavailable);
    let handle = spawn(&store, &sandbox, &FakeGit::new(GitMode::Merge), quiet_settings());
    let agent_id = polecat(&handle, "toast").await;
    let bead = handle.create_bead(NewBead::issue("fix bug")).await.unwrap();
    handle.hook_bead(agent_id.clone(), bead.id.clone()).await.unwrap();

    let report = handle.fire_timer().await.unwrap();

    assert_eq!(report.dispatch.unwrap().started(), 0);
    let agent = handle.get_agent(agent_id).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(agent.dispatch_attempts, 1);
    assert_eq!(
        handle.get_bead(bead.id).await.unwrap().status,
        BeadStatus::InProgress
    );
    assert!(report.patrol.is_some());
    assert!(handle.alarm().await.unwrap().is_some());
}

#[tokio::test]
async fn broken_merge_pass_still_lets_witness_run_and_rearms() {
    let (db, store) = rig_fixture().await;
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());
    polecat(&handle, "toast").await;
    sqlx::query("DROP TABLE review_queue")
        .execute(db.pool())
        .await
        .unwrap();
    let before = Utc::now();

    let report = handle.fire_timer().await.unwrap();

    assert!(report.dispatch.is_some());
    assert!(report.merge.is_none());
    assert!(report.patrol.is_some());
    assert!(
        report.errors.iter().any(|error| error.starts_with("merge: ")),
        "{:?}",
        report.errors
    );
    assert!(report.next_alarm > before);
    assert_eq!(handle.alarm().await.unwrap(), Some(report.next_alarm));
    assert_eq!(store.alarm().await.unwrap(), Some(report.next_alarm));
}

#[tokio::test]
async fn committed_writes_succeed_when_alarm_cannot_be_persisted() {
    let (db, store) = rig_fixture().await;
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());
    let agent_id = polecat(&handle, "toast").await;
    let bead = handle.create_bead(NewBead::issue("fix bug")).await.unwrap();
    sqlx::query("DROP TABLE rig_alarms")
        .execute(db.pool())
        .await
        .unwrap();

    let hooked = handle.hook_bead(agent_id.clone(), bead.id.clone()).await.unwrap();
    assert_eq!(hooked.status, BeadStatus::InProgress);
    assert!(handle.alarm().await.unwrap().is_some());

    let entry = handle
        .agent_done(agent_id, "fix/1".to_string(), None, None)
        .await
        .unwrap();
    assert_eq!(entry.status, ReviewStatus::Pending);
    assert_eq!(handle.list_review_queue(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn each_fire_merges_one_entry_in_submission_order() {
    let (_db, store) = rig_fixture().await;
    let git = FakeGit::new(GitMode::Merge);
    let handle = spawn(&store, &FakeSandbox::working(), &git, quiet_settings());
    let agent_id = polecat(&handle, "toast").await;
    let first = handle.create_bead(NewBead::issue("one")).await.unwrap();
    let second = handle.create_bead(NewBead::issue("two")).await.unwrap();
    let e1 = handle
        .submit_review(NewReviewEntry::new(agent_id.clone(), first.id, "fix/1"))
        .await
        .unwrap();
    let e2 = handle
        .submit_review(NewReviewEntry::new(agent_id, second.id, "fix/2"))
        .await
        .unwrap();

    let fire1 = handle.fire_timer().await.unwrap();
    assert_eq!(fire1.merge.unwrap().entry_id, e1.id);
    assert_eq!(
        handle
            .list_review_queue(Some(ReviewStatus::Pending))
            .await
            .unwrap()
            .len(),
        1
    );

    let fire2 = handle.fire_timer().await.unwrap();
    assert_eq!(fire2.merge.unwrap().entry_id, e2.id);
    let branches: Vec<String> = git
        .merges
        .lock()
        .await
        .iter()
        .map(|request| request.branch.clone())
        .collect();
    assert_eq!(branches, vec!["fix/1".to_string(), "fix/2".to_string()]);
}

#[tokio::test]
async fn timer_fires_on_its_own() {
    let (_db, store) = rig_fixture().await;
    let sandbox = FakeSandbox::working();
    let settings = SchedulerSettings {
        arm_delay_ms: 20,
        active_interval_ms: 50,
        idle_interval_ms: 100,
        external_call_timeout_ms: 100,
        ..SchedulerSettings::default()
    };
    let handle = spawn(&store, &sandbox, &FakeGit::new(GitMode::Merge), settings);
    let agent_id = polecat(&handle, "toast").await;
    let bead = handle.create_bead(NewBead::issue("fix bug")).await.unwrap();
    handle.hook_bead(agent_id.clone(), bead.id).await.unwrap();

    let mut status = AgentStatus::Idle;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        status = handle.get_agent(agent_id.clone()).await.unwrap().status;
        if status == AgentStatus::Working {
            break;
        }
    }
    assert_eq!(status, AgentStatus::Working);
    assert_eq!(sandbox.started.lock().await.len(), 1);
}

#[tokio::test]
async fn restart_requeues_interrupted_merge_and_reloads_alarm() {
    let (_db, store) = rig_fixture().await;
    let agent = store
        .register_agent(&NewAgent::new(AgentRole::Polecat, "toast", "toast@test"))
        .await
        .unwrap();
    let bead = store.create_bead(&NewBead::issue("fix bug")).await.unwrap();
    store
        .submit_review(&NewReviewEntry::new(agent.id, bead.id, "fix/1"))
        .await
        .unwrap();
    store.pop_review().await.unwrap().unwrap();
    let persisted = Utc::now() + Duration::seconds(120);
    store.set_alarm(persisted).await.unwrap();

    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());

    assert_eq!(handle.alarm().await.unwrap(), Some(persisted));
    let pending = handle
        .list_review_queue(Some(ReviewStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn overdue_persisted_alarm_fires_at_start() {
    let (_db, store) = rig_fixture().await;
    let agent = store
        .register_agent(&NewAgent::new(AgentRole::Polecat, "toast", "toast@test"))
        .await
        .unwrap();
    let bead = store.create_bead(&NewBead::issue("fix bug")).await.unwrap();
    store
        .submit_review(&NewReviewEntry::new(agent.id, bead.id.clone(), "fix/1"))
        .await
        .unwrap();
    store.set_alarm(Utc::now() - Duration::seconds(60)).await.unwrap();

    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());

    let mut merged = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if handle.get_bead(bead.id.clone()).await.unwrap().status == BeadStatus::Closed {
            merged = true;
            break;
        }
    }
    assert!(merged);
    assert!(handle.alarm().await.unwrap().unwrap() > Utc::now());
}

#[tokio::test]
async fn stopped_actor_reports_unavailable() {
    let (_db, store) = rig_fixture().await;
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());
    handle.stop().await;
    handle.stop().await;

    assert!(handle.is_closed());
    assert!(matches!(
        handle.list_agents(crate::types::AgentFilter::default()).await,
        Err(GastownError::ActorUnavailable(_))
    ));
}

#[tokio::test]
async fn concurrent_hooks_on_one_bead_admit_exactly_one() {
    let (_db, store) = rig_fixture().await;
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());
    let a = polecat(&handle, "a").await;
    let b = polecat(&handle, "b").await;
    let bead = handle.create_bead(NewBead::issue("contested")).await.unwrap();

    let (first, second) = tokio::join!(
        handle.hook_bead(a, bead.id.clone()),
        handle.hook_bead(b, bead.id.clone())
    );

    let conflicts = [&first, &second]
        .iter()
        .filter(|result| matches!(result, Err(GastownError::Conflict(_))))
        .count();
    assert_eq!(conflicts, 1);
    assert!(first.is_ok() || second.is_ok());
}

#[tokio::test]
async fn escalations_record_their_source() {
    let (_db, store) = rig_fixture().await;
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());
    let agent_id = polecat(&handle, "toast").await;

    let escalation = handle
        .create_escalation(EscalationRequest {
            title: "need a human".to_string(),
            source_agent_id: Some(agent_id.clone()),
            ..EscalationRequest::default()
        })
        .await
        .unwrap();

    assert_eq!(escalation.bead_type, BeadType::Escalation);
    assert_eq!(escalation.priority, BeadPriority::High);
    assert_eq!(
        escalation.metadata.get(SOURCE_AGENT_KEY),
        Some(&serde_json::json!(agent_id.value()))
    );
}

#[tokio::test]
async fn sandbox_pass_throughs_surface_unavailability() {
    let (_db, store) = rig_fixture().await;
    let sandbox = FakeSandbox::working();
    let handle = spawn(&store, &sandbox, &FakeGit::new(GitMode::Merge), quiet_settings());
    let agent_id = polecat(&handle, "toast").await;

    handle
        .nudge_agent(agent_id.clone(), "check your mail".to_string())
        .await
        .unwrap();
    assert_eq!(sandbox.messages.lock().await.len(), 1);
    let ticket = handle.stream_ticket(agent_id.clone()).await.unwrap();
    assert!(ticket.ticket.contains(agent_id.value()));

    sandbox.set_mode(SandboxMode::Hang).await;
    assert!(matches!(
        handle.sandbox_status(agent_id).await,
        Err(GastownError::ExternalUnavailable(_))
    ));
    assert!(matches!(
        handle
            .nudge_agent(crate::types::AgentId::new("ag-missing"), "hi".to_string())
            .await,
        Err(GastownError::NotFound(_))
    ));
}

#[tokio::test]
async fn complete_review_is_idempotent_through_the_actor() {
    let (_db, store) = rig_fixture().await;
    let handle = spawn(&store, &FakeSandbox::working(), &FakeGit::new(GitMode::Merge), quiet_settings());
    let agent_id = polecat(&handle, "toast").await;
    let bead = handle.create_bead(NewBead::issue("one")).await.unwrap();
    handle
        .submit_review(NewReviewEntry::new(agent_id, bead.id.clone(), "fix/1"))
        .await
        .unwrap();

    let popped = handle.pop_review().await.unwrap().unwrap();
    let first = handle
        .complete_review(popped.id, MergeResult::Merged)
        .await
        .unwrap();
    let second = handle
        .complete_review(popped.id, MergeResult::Merged)
        .await
        .unwrap();

    assert_eq!(first.status, ReviewStatus::Merged);
    assert_eq!(second.status, ReviewStatus::Merged);
    assert_eq!(
        handle.get_bead(bead.id).await.unwrap().status,
        BeadStatus::Closed
    );
}
