#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::uninlined_format_args
)]

use super::{Database, RigStore};
use crate::error::GastownError;
use crate::types::{
    AgentFilter, AgentId, AgentRole, AgentStatus, BeadFilter, BeadId, BeadPriority, BeadStatus,
    BeadType, MergeResult, NewAgent, NewBead, NewMail, NewReviewEntry, NewRig, ReviewStatus,
    SlingRequest,
};
use chrono::{Duration, Utc};
use serde_json::json;

async fn setup() -> (Database, RigStore) {
    let db = Database::in_memory().await.unwrap();
    let town = db.create_town("acme", "lewis").await.unwrap();
    let rig = db
        .create_rig(&NewRig::new(
            town.id,
            "widgets",
            "https://example.com/widgets.git",
        ))
        .await
        .unwrap();
    let store = db.rig_store(rig.id);
    (db, store)
}

async fn polecat(store: &RigStore, name: &str) -> AgentId {
    store
        .register_agent(&NewAgent::new(
            AgentRole::Polecat,
            name,
            format!("{name}@test"),
        ))
        .await
        .unwrap()
        .id
}

async fn issue(store: &RigStore, title: &str) -> BeadId {
    store.create_bead(&NewBead::issue(title)).await.unwrap().id
}

#[tokio::test]
async fn create_bead_defaults_to_open_medium() {
    let (_db, store) = setup().await;
    let bead = store
        .create_bead(
            &NewBead::issue("fix bug")
                .with_label("backend")
                .with_metadata("origin", json!("triage")),
        )
        .await
        .unwrap();

    assert_eq!(bead.status, BeadStatus::Open);
    assert_eq!(bead.priority, BeadPriority::Medium);
    assert_eq!(bead.bead_type, BeadType::Issue);

    let loaded = store.require_bead(&bead.id).await.unwrap();
    assert_eq!(loaded.labels, bead.labels);
    assert_eq!(loaded.metadata.get("origin"), Some(&json!("triage")));
}

#[tokio::test]
async fn create_bead_rejects_empty_title_and_unknown_assignee() {
    let (_db, store) = setup().await;
    assert!(matches!(
        store.create_bead(&NewBead::issue("  ")).await,
        Err(GastownError::Validation(_))
    ));

    let mut bead = NewBead::issue("orphan");
    bead.assignee = Some(AgentId::new("ag-missing"));
    assert!(matches!(
        store.create_bead(&bead).await,
        Err(GastownError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_beads_filters_and_pages_in_creation_order() {
    let (_db, store) = setup().await;
    let first = issue(&store, "one").await;
    let second = issue(&store, "two").await;
    store
        .create_bead(&NewBead::new(BeadType::Escalation, "help"))
        .await
        .unwrap();

    let issues = store
        .list_beads(&BeadFilter::default().with_type(BeadType::Issue))
        .await
        .unwrap();
    assert_eq!(
        issues.iter().map(|bead| bead.id.clone()).collect::<Vec<_>>(),
        vec![first, second.clone()]
    );

    let paged = store
        .list_beads(&BeadFilter {
            limit: Some(1),
            offset: Some(1),
            ..BeadFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].id, second);
}

#[tokio::test]
async fn close_bead_is_idempotent() {
    let (_db, store) = setup().await;
    let bead_id = issue(&store, "close me").await;

    let first = store.close_bead(&bead_id, None).await.unwrap();
    let second = store.close_bead(&bead_id, None).await.unwrap();

    assert_eq!(first.status, BeadStatus::Closed);
    assert!(first.closed_at.is_some());
    assert_eq!(second.closed_at, first.closed_at);
}

#[tokio::test]
async fn terminal_beads_reject_other_statuses() {
    let (_db, store) = setup().await;
    let bead_id = issue(&store, "doomed").await;
    store
        .update_bead_status(&bead_id, BeadStatus::Failed, None)
        .await
        .unwrap();

    assert!(matches!(
        store.close_bead(&bead_id, None).await,
        Err(GastownError::Conflict(_))
    ));
    assert!(matches!(
        store
            .update_bead_status(&bead_id, BeadStatus::Open, None)
            .await,
        Err(GastownError::Conflict(_))
    ));
    assert!(matches!(
        store
            .update_bead_status(&BeadId::new("bd-missing"), BeadStatus::Closed, None)
            .await,
        Err(GastownError::NotFound(_))
    ));
}

#[tokio::test]
async fn in_progress_is_only_reachable_by_hooking() {
    let (_db, store) = setup().await;
    let bead_id = issue(&store, "sneaky").await;
    assert!(matches!(
        store
            .update_bead_status(&bead_id, BeadStatus::InProgress, None)
            .await,
        Err(GastownError::Conflict(_))
    ));
}

#[tokio::test]
async fn hook_links_agent_and_bead() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "fix bug").await;

    let bead = store.hook_bead(&agent_id, &bead_id).await.unwrap();
    let agent = store.require_agent(&agent_id).await.unwrap();

    assert_eq!(bead.status, BeadStatus::InProgress);
    assert_eq!(bead.assignee_agent_id, Some(agent_id));
    assert_eq!(agent.current_hook_bead_id, Some(bead_id));
    assert!(agent.awaits_dispatch());
}

#[tokio::test]
async fn hook_conflicts_on_double_hook_held_bead_terminal_bead_and_dead_agent() {
    let (_db, store) = setup().await;
    let p1 = polecat(&store, "p1").await;
    let p2 = polecat(&store, "p2").await;
    let first = issue(&store, "first").await;
    let second = issue(&store, "second").await;
    store.hook_bead(&p1, &first).await.unwrap();

    assert!(matches!(
        store.hook_bead(&p1, &second).await,
        Err(GastownError::Conflict(_))
    ));
    assert!(matches!(
        store.hook_bead(&p2, &first).await,
        Err(GastownError::Conflict(_))
    ));

    let closed = issue(&store, "closed").await;
    store.close_bead(&closed, None).await.unwrap();
    assert!(matches!(
        store.hook_bead(&p2, &closed).await,
        Err(GastownError::Conflict(_))
    ));

    store.retire_agent(&p2).await.unwrap();
    assert!(matches!(
        store.hook_bead(&p2, &second).await,
        Err(GastownError::Conflict(_))
    ));

    let hooks = store
        .list_agents(&AgentFilter::default())
        .await
        .unwrap()
        .into_iter()
        .filter(|agent| agent.current_hook_bead_id.as_ref() == Some(&first))
        .count();
    assert_eq!(hooks, 1);
}

#[tokio::test]
async fn unhook_keeps_bead_in_progress_and_allows_rehook() {
    let (_db, store) = setup().await;
    let p1 = polecat(&store, "p1").await;
    let p2 = polecat(&store, "p2").await;
    let bead_id = issue(&store, "handoff").await;
    store.hook_bead(&p1, &bead_id).await.unwrap();

    let agent = store.unhook_bead(&p1).await.unwrap();
    assert_eq!(agent.current_hook_bead_id, None);

    let bead = store.require_bead(&bead_id).await.unwrap();
    assert_eq!(bead.status, BeadStatus::InProgress);
    assert_eq!(bead.assignee_agent_id, None);

    let rehooked = store.hook_bead(&p2, &bead_id).await.unwrap();
    assert_eq!(rehooked.assignee_agent_id, Some(p2));

    let unhooked_again = store.unhook_bead(&p1).await.unwrap();
    assert_eq!(unhooked_again.status, AgentStatus::Idle);
}

#[tokio::test]
async fn closing_a_hooked_bead_releases_its_agent() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "short").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();

    store.close_bead(&bead_id, Some(&agent_id)).await.unwrap();
    let agent = store.require_agent(&agent_id).await.unwrap();
    assert_eq!(agent.current_hook_bead_id, None);
    assert_eq!(agent.status, AgentStatus::Idle);
}

#[tokio::test]
async fn reopening_clears_hook_and_assignee() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "retry").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();

    let bead = store
        .update_bead_status(&bead_id, BeadStatus::Open, Some(&agent_id))
        .await
        .unwrap();
    assert_eq!(bead.status, BeadStatus::Open);
    assert_eq!(bead.assignee_agent_id, None);
    assert_eq!(
        store
            .require_agent(&agent_id)
            .await
            .unwrap()
            .current_hook_bead_id,
        None
    );
}

#[tokio::test]
async fn agent_done_queues_review_and_releases_hook() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "fix bug").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();

    let entry = store
        .agent_done(&agent_id, "fix/1", Some("https://example.com/pr/1".into()), None)
        .await
        .unwrap();
    assert_eq!(entry.status, ReviewStatus::Pending);
    assert_eq!(entry.bead_id, bead_id);
    assert_eq!(entry.branch, "fix/1");

    let agent = store.require_agent(&agent_id).await.unwrap();
    assert_eq!(agent.current_hook_bead_id, None);
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(
        store.require_bead(&bead_id).await.unwrap().status,
        BeadStatus::InProgress
    );

    assert!(matches!(
        store.agent_done(&agent_id, "fix/1", None, None).await,
        Err(GastownError::Conflict(_))
    ));
    assert!(matches!(
        store.agent_done(&agent_id, "  ", None, None).await,
        Err(GastownError::Validation(_))
    ));
}

#[tokio::test]
async fn heartbeat_ignores_unknown_and_revives_dead() {
    let (_db, store) = setup().await;
    assert!(store
        .touch_heartbeat(&AgentId::new("ag-ghost"))
        .await
        .unwrap()
        .is_none());

    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "work").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();
    let working = store.touch_heartbeat(&agent_id).await.unwrap().unwrap();
    assert_eq!(working.status, AgentStatus::Working);

    store.retire_agent(&agent_id).await.unwrap();
    let revived = store.touch_heartbeat(&agent_id).await.unwrap().unwrap();
    assert_eq!(revived.status, AgentStatus::Idle);
    assert_eq!(revived.current_hook_bead_id, None);
}

#[tokio::test]
async fn retire_agent_orphans_hooked_bead() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "abandoned").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();

    let released = store.retire_agent(&agent_id).await.unwrap();
    assert_eq!(released, Some(bead_id.clone()));
    assert_eq!(store.retire_agent(&agent_id).await.unwrap(), None);

    let agent = store.require_agent(&agent_id).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Dead);
    assert_eq!(agent.current_hook_bead_id, None);

    let bead = store.require_bead(&bead_id).await.unwrap();
    assert_eq!(bead.status, BeadStatus::InProgress);
    assert_eq!(bead.assignee_agent_id, None);
}

#[tokio::test]
async fn dispatch_bookkeeping_counts_attempts_and_guards_status() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "start me").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();

    assert_eq!(store.record_dispatch_attempt(&agent_id).await.unwrap(), 1);
    assert_eq!(store.record_dispatch_attempt(&agent_id).await.unwrap(), 2);
    assert!(store
        .apply_dispatch_status(&agent_id, AgentStatus::Working)
        .await
        .unwrap());
    assert!(!store
        .apply_dispatch_status(&agent_id, AgentStatus::Blocked)
        .await
        .unwrap());
    assert!(matches!(
        store.record_dispatch_attempt(&AgentId::new("ag-none")).await,
        Err(GastownError::NotFound(_))
    ));
}

#[tokio::test]
async fn mail_is_delivered_once_in_order() {
    let (_db, store) = setup().await;
    let mayor = polecat(&store, "mayor").await;
    let worker = polecat(&store, "p1").await;

    store
        .send_mail(&NewMail::new(mayor.clone(), worker.clone(), "first", "a"))
        .await
        .unwrap();
    store
        .send_mail(&NewMail::new(mayor.clone(), worker.clone(), "second", "b"))
        .await
        .unwrap();

    assert_eq!(store.peek_mail(&worker).await.unwrap().len(), 2);
    let inbox = store.check_mail(&worker).await.unwrap();
    assert_eq!(
        inbox.iter().map(|m| m.subject.as_str()).collect::<Vec<_>>(),
        vec!["first", "second"]
    );
    assert!(inbox.iter().all(|m| m.delivered && m.delivered_at.is_some()));
    assert!(store.check_mail(&worker).await.unwrap().is_empty());
    assert!(store.check_mail(&mayor).await.unwrap().is_empty());
}

#[tokio::test]
async fn mail_requires_known_agents_and_subject() {
    let (_db, store) = setup().await;
    let worker = polecat(&store, "p1").await;
    assert!(matches!(
        store
            .send_mail(&NewMail::new(AgentId::new("ag-x"), worker.clone(), "hi", ""))
            .await,
        Err(GastownError::NotFound(_))
    ));
    assert!(matches!(
        store
            .send_mail(&NewMail::new(worker.clone(), worker.clone(), " ", ""))
            .await,
        Err(GastownError::Validation(_))
    ));
    assert!(matches!(
        store.check_mail(&AgentId::new("ag-x")).await,
        Err(GastownError::NotFound(_))
    ));
}

#[tokio::test]
async fn review_queue_is_fifo_and_single_flight() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let b1 = issue(&store, "one").await;
    let b2 = issue(&store, "two").await;
    let e1 = store
        .submit_review(&NewReviewEntry::new(agent_id.clone(), b1, "fix/1"))
        .await
        .unwrap();
    let e2 = store
        .submit_review(&NewReviewEntry::new(agent_id, b2, "fix/2"))
        .await
        .unwrap();

    let popped = store.pop_review().await.unwrap().unwrap();
    assert_eq!(popped.id, e1.id);
    assert_eq!(popped.status, ReviewStatus::Merging);
    assert!(store.pop_review().await.unwrap().is_none());

    store
        .complete_review(e1.id, &MergeResult::Merged)
        .await
        .unwrap();
    assert_eq!(store.pop_review().await.unwrap().unwrap().id, e2.id);
}

#[tokio::test]
async fn complete_review_is_idempotent_and_closes_bead() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "ship").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();
    let entry = store.agent_done(&agent_id, "ship/1", None, None).await.unwrap();

    let merged = store
        .complete_review(entry.id, &MergeResult::Merged)
        .await
        .unwrap();
    let again = store
        .complete_review(entry.id, &MergeResult::Merged)
        .await
        .unwrap();
    assert_eq!(merged.status, ReviewStatus::Merged);
    assert_eq!(again.updated_at, merged.updated_at);
    assert_eq!(
        store.require_bead(&bead_id).await.unwrap().status,
        BeadStatus::Closed
    );

    assert!(matches!(
        store
            .complete_review(
                entry.id,
                &MergeResult::Failed {
                    reason: "late".into()
                }
            )
            .await,
        Err(GastownError::Conflict(_))
    ));
}

#[tokio::test]
async fn failed_review_leaves_bead_in_progress() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "conflicting").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();
    let entry = store.agent_done(&agent_id, "c/1", None, None).await.unwrap();

    let failed = store
        .complete_review(
            entry.id,
            &MergeResult::Failed {
                reason: "merge conflict".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.status, ReviewStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("merge conflict"));
    assert_eq!(
        store.require_bead(&bead_id).await.unwrap().status,
        BeadStatus::InProgress
    );
}

#[tokio::test]
async fn submit_review_rejects_terminal_and_unknown_beads() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "done").await;
    store.close_bead(&bead_id, None).await.unwrap();

    assert!(matches!(
        store
            .submit_review(&NewReviewEntry::new(agent_id.clone(), bead_id, "x"))
            .await,
        Err(GastownError::Conflict(_))
    ));
    assert!(matches!(
        store
            .submit_review(&NewReviewEntry::new(agent_id, BeadId::new("bd-x"), "x"))
            .await,
        Err(GastownError::NotFound(_))
    ));
}

#[tokio::test]
async fn interrupted_merges_are_requeued() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "crashy").await;
    let entry = store
        .submit_review(&NewReviewEntry::new(agent_id, bead_id, "c/1"))
        .await
        .unwrap();
    store.pop_review().await.unwrap();

    assert_eq!(store.requeue_merging().await.unwrap(), 1);
    assert_eq!(
        store.get_review(entry.id).await.unwrap().unwrap().status,
        ReviewStatus::Pending
    );
    assert_eq!(store.requeue_merging().await.unwrap(), 0);
}

#[tokio::test]
async fn sling_reuses_free_polecats_before_creating_new_ones() {
    let (_db, store) = setup().await;
    let created = store.sling(&SlingRequest::new("first")).await.unwrap();
    assert!(created.agent_created);
    assert_eq!(created.agent.name, "polecat-1");
    assert_eq!(created.bead.status, BeadStatus::InProgress);
    assert_eq!(
        created.agent.current_hook_bead_id,
        Some(created.bead.id.clone())
    );

    let second = store.sling(&SlingRequest::new("second")).await.unwrap();
    assert!(second.agent_created);
    assert_eq!(second.agent.name, "polecat-2");

    store.unhook_bead(&created.agent.id).await.unwrap();
    let third = store.sling(&SlingRequest::new("third")).await.unwrap();
    assert!(!third.agent_created);
    assert_eq!(third.agent.id, created.agent.id);
}

#[tokio::test]
async fn sling_to_busy_agent_conflicts_without_creating_a_bead() {
    let (_db, store) = setup().await;
    let first = store.sling(&SlingRequest::new("first")).await.unwrap();
    let before = store.list_beads(&BeadFilter::default()).await.unwrap().len();

    assert!(matches!(
        store
            .sling(&SlingRequest::new("second").to_agent(first.agent.id.clone()))
            .await,
        Err(GastownError::Conflict(_))
    ));
    assert_eq!(
        store.list_beads(&BeadFilter::default()).await.unwrap().len(),
        before
    );
}

#[tokio::test]
async fn activity_counts_drive_rearm_policy() {
    let (_db, store) = setup().await;
    assert!(!store.activity().await.unwrap().is_active());

    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "work").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();

    let activity = store.activity().await.unwrap();
    assert_eq!(activity.idle_hooked_agents, 1);
    assert_eq!(activity.live_agents, 1);

    store.agent_done(&agent_id, "w/1", None, None).await.unwrap();
    store.retire_agent(&agent_id).await.unwrap();
    let activity = store.activity().await.unwrap();
    assert_eq!(activity.pending_reviews, 1);
    assert_eq!(activity.live_agents, 0);
    assert!(activity.is_active());
}

#[tokio::test]
async fn delete_agent_unassigns_bead_and_drops_inbox() {
    let (db, store) = setup().await;
    let mayor = polecat(&store, "mayor").await;
    let agent_id = polecat(&store, "p1").await;
    let bead_id = issue(&store, "work").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();
    store
        .send_mail(&NewMail::new(mayor, agent_id.clone(), "hello", ""))
        .await
        .unwrap();

    assert_eq!(
        store.delete_agent(&agent_id).await.unwrap(),
        Some(bead_id.clone())
    );
    assert!(store.get_agent(&agent_id).await.unwrap().is_none());
    let bead = store.require_bead(&bead_id).await.unwrap();
    assert_eq!(bead.status, BeadStatus::InProgress);
    assert_eq!(bead.assignee_agent_id, None);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mail")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn checkpoints_round_trip_and_prime_bundles_context() {
    let (_db, store) = setup().await;
    let agent_id = polecat(&store, "p1").await;
    let other = polecat(&store, "p2").await;
    let bead_id = issue(&store, "resume").await;
    issue(&store, "backlog").await;
    store.hook_bead(&agent_id, &bead_id).await.unwrap();
    store
        .send_mail(&NewMail::new(other, agent_id.clone(), "note", "keep going"))
        .await
        .unwrap();

    assert_eq!(store.read_checkpoint(&agent_id).await.unwrap(), None);
    store
        .write_checkpoint(&agent_id, &json!({"step": 3}))
        .await
        .unwrap();
    assert_eq!(
        store.read_checkpoint(&agent_id).await.unwrap(),
        Some(json!({"step": 3}))
    );

    let prime = store.prime_context(&agent_id).await.unwrap();
    assert_eq!(prime.hooked_bead.map(|bead| bead.id), Some(bead_id));
    assert_eq!(prime.undelivered_mail.len(), 1);
    assert_eq!(prime.open_beads.len(), 1);
    assert_eq!(store.peek_mail(&agent_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn alarms_persist_per_rig() {
    let (db, store) = setup().await;
    assert_eq!(store.alarm().await.unwrap(), None);

    let at = Utc::now() + Duration::seconds(30);
    store.set_alarm(at).await.unwrap();
    store.set_alarm(at + Duration::seconds(5)).await.unwrap();
    assert_eq!(
        store.alarm().await.unwrap(),
        Some(at + Duration::seconds(5))
    );
    assert_eq!(db.rigs_with_alarms().await.unwrap(), vec![store.rig_id().clone()]);

    store.clear_alarm().await.unwrap();
    assert_eq!(store.alarm().await.unwrap(), None);
}

#[tokio::test]
async fn rigs_are_isolated_and_cascade_on_delete() {
    let (db, store) = setup().await;
    let town = db.create_town("other", "someone").await.unwrap();
    let other_rig = db
        .create_rig(&NewRig::new(town.id, "gadgets", "git@example.com:org/gadgets.git"))
        .await
        .unwrap();
    let other = db.rig_store(other_rig.id.clone());

    let bead_id = issue(&store, "mine").await;
    assert!(other.get_bead(&bead_id).await.unwrap().is_none());

    let renamed = db.rename_rig(&other_rig.id, "gizmos").await.unwrap();
    assert_eq!(renamed.name, "gizmos");
    assert_eq!(renamed.default_branch, "main");

    assert!(db.delete_rig(store.rig_id()).await.unwrap());
    let beads: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM beads")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(beads, 0);
    assert!(!db.delete_rig(store.rig_id()).await.unwrap());
}

#[tokio::test]
async fn rig_creation_validates_input() {
    let (db, _store) = setup().await;
    let town = db.list_towns().await.unwrap().remove(0);
    assert!(matches!(
        db.create_rig(&NewRig::new(town.id.clone(), "x", "not a url"))
            .await,
        Err(GastownError::Validation(_))
    ));
    assert!(matches!(
        db.create_rig(&NewRig::new(
            crate::types::TownId::new("town-missing"),
            "x",
            "https://example.com/x.git"
        ))
        .await,
        Err(GastownError::NotFound(_))
    ));
    assert!(matches!(
        db.create_town("", "owner").await,
        Err(GastownError::Validation(_))
    ));
}
