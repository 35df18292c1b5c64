//! End-to-end dispatcher behaviour against a scripted transport

mod support;

use std::time::Duration as StdDuration;

use chrono::Duration;
use outreach_common::{CampaignStatus, JobStatus, SessionState};
use outreach_delivery::{ErrorKind, PastDuePolicy};
use outreach_session::TransportError;
use outreach_store::CampaignStore;
use pretty_assertions::assert_eq;

use support::{Harness, now, past_steps, relative_steps, single_step};

use JobStatus::{Failed, Scheduled, Sent, Skipped};

#[tokio::test]
async fn test_nothing_is_sent_without_a_session() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", past_steps(), 2).await;

    for minute in 0..3 {
        let report = harness
            .dispatcher
            .tick_at(now() + Duration::minutes(minute))
            .await
            .unwrap();
        assert_eq!(report.due, 6);
        assert_eq!(report.sent, 0);
        assert!(report.session_unavailable);
    }

    assert_eq!(harness.statuses(&campaign).await, vec![Scheduled; 6]);
    assert_eq!(harness.transport.send_attempts(), 0);
    assert_eq!(
        harness.campaigns.campaign(&campaign.id).await.unwrap().status,
        CampaignStatus::Active
    );
}

#[tokio::test]
async fn test_session_invalid_aborts_the_tick() {
    let harness = Harness::new();
    harness
        .transport
        .fail_send(3, TransportError::SessionInvalid("Signed out".into()));
    let (campaign, _) = harness.launched("alpha", past_steps(), 2).await;
    harness.connect().await;

    let report = harness.dispatcher.tick_at(now()).await.unwrap();

    assert_eq!(report.sent, 2);
    assert!(report.aborted);
    assert_eq!(
        harness.statuses(&campaign).await,
        vec![Sent, Sent, Scheduled, Scheduled, Scheduled, Scheduled]
    );
    let session = harness.session.status();
    assert_eq!(session.state, SessionState::Disconnected);
    assert_eq!(session.last_error.as_deref(), Some("Signed out"));

    // With the session gone the next tick leaves everything alone
    let report = harness.dispatcher.tick_at(now()).await.unwrap();
    assert!(report.session_unavailable);
    assert_eq!(harness.transport.send_attempts(), 3);
}

#[tokio::test]
async fn test_transport_error_fails_only_its_job() {
    let harness = Harness::new();
    harness.transport.fail_send(
        2,
        TransportError::Delivery("Recipient field rejected the address".into()),
    );
    let (campaign, _) = harness.launched("alpha", past_steps(), 2).await;
    harness.connect().await;

    let report = harness.dispatcher.tick_at(now()).await.unwrap();

    assert_eq!((report.sent, report.failed), (5, 1));
    let jobs = harness.jobs(&campaign).await;
    assert_eq!(
        jobs.iter().map(|j| j.status).collect::<Vec<_>>(),
        vec![Sent, Failed, Sent, Sent, Sent, Sent]
    );
    assert_eq!(
        jobs[1].error_message.as_deref(),
        Some("Recipient field rejected the address")
    );
    assert_eq!(jobs[0].sent_at, Some(now()));
    assert!(harness.session.status().is_connected());
}

#[tokio::test]
async fn test_retry_sends_on_the_next_tick_and_reopens() {
    let harness = Harness::new();
    harness
        .transport
        .fail_send(1, TransportError::Delivery("Compose window did not open".into()));
    let (campaign, _) = harness.launched("alpha", past_steps(), 1).await;
    harness.connect().await;

    let report = harness.dispatcher.tick_at(now()).await.unwrap();
    assert_eq!(report.completed, vec![campaign.id]);
    let failed = harness.jobs(&campaign).await[0].clone();
    assert_eq!(failed.status, Failed);

    let later = now() + Duration::hours(1);
    let retried = harness.campaigns.retry(&failed.id, later).await.unwrap();
    assert_eq!(retried.status, Scheduled);
    assert_eq!(retried.scheduled_at, later);
    assert_eq!(retried.error_message, None);
    assert_eq!(
        harness.campaigns.campaign(&campaign.id).await.unwrap().status,
        CampaignStatus::Active
    );

    let report = harness.dispatcher.tick_at(later).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.completed, vec![campaign.id]);
    assert_eq!(harness.statuses(&campaign).await, vec![Sent; 3]);
    assert_eq!(harness.transport.sent().len(), 3);
}

#[tokio::test]
async fn test_unenroll_keeps_sent_history() {
    let harness = Harness::new();
    let (campaign, contacts) = harness.launched("alpha", relative_steps(), 1).await;
    harness.connect().await;

    harness.dispatcher.tick_at(now()).await.unwrap();
    assert_eq!(harness.statuses(&campaign).await, vec![Sent, Scheduled, Scheduled]);

    let removed = harness
        .campaigns
        .unenroll(&campaign.id, &contacts[0].id)
        .await
        .unwrap();

    assert_eq!(removed, 2);
    assert_eq!(harness.statuses(&campaign).await, vec![Sent]);

    // Later ticks have nothing left to send for the contact
    let report = harness
        .dispatcher
        .tick_at(now() + Duration::days(7))
        .await
        .unwrap();
    assert_eq!(report.due, 0);
}

#[tokio::test]
async fn test_pause_resume_never_duplicates() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", relative_steps(), 2).await;
    harness.connect().await;

    for day in 1..=3 {
        let at = now() + Duration::days(day);
        harness.campaigns.pause(&campaign.id, at).await.unwrap();
        let report = harness.dispatcher.tick_at(at).await.unwrap();
        assert_eq!(report.due, 0, "paused campaigns are not dispatched");
        harness.campaigns.resume(&campaign.id, at).await.unwrap();
    }

    assert_eq!(harness.jobs(&campaign).await.len(), 6);

    let report = harness
        .dispatcher
        .tick_at(now() + Duration::days(6))
        .await
        .unwrap();
    assert_eq!(report.sent, 6);
    assert_eq!(report.completed, vec![campaign.id]);
    assert_eq!(harness.transport.sent().len(), 6);
}

#[tokio::test]
async fn test_only_due_jobs_are_sent() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", relative_steps(), 1).await;
    harness.connect().await;

    assert_eq!(harness.dispatcher.tick_at(now()).await.unwrap().sent, 1);
    assert_eq!(
        harness
            .dispatcher
            .tick_at(now() + Duration::days(2))
            .await
            .unwrap()
            .due,
        0
    );
    assert_eq!(
        harness
            .dispatcher
            .tick_at(now() + Duration::days(3))
            .await
            .unwrap()
            .sent,
        1
    );
    assert_eq!(harness.statuses(&campaign).await, vec![Sent, Sent, Scheduled]);
    assert_eq!(
        harness.campaigns.campaign(&campaign.id).await.unwrap().status,
        CampaignStatus::Active
    );
}

#[tokio::test]
async fn test_due_jobs_go_out_earliest_first_across_campaigns() {
    let harness = Harness::new();
    let (first, _) = harness.launched("alpha", past_steps(), 1).await;
    let (second, _) = harness
        .launched(
            "beta",
            vec![outreach_common::EmailTemplate::new(1, "Mid", "Between")
                .at(now() - Duration::days(2) - Duration::hours(12))],
            1,
        )
        .await;
    harness.connect().await;

    harness.dispatcher.tick_at(now()).await.unwrap();

    let order: Vec<_> = harness
        .transport
        .sent()
        .into_iter()
        .map(|message| message.subject)
        .collect();
    assert_eq!(order, vec!["Hello Person", "Mid", "Following up", "Last note"]);
    assert_eq!(harness.statuses(&first).await, vec![Sent; 3]);
    assert_eq!(harness.statuses(&second).await, vec![Sent]);
}

#[tokio::test]
async fn test_skip_policy_skips_past_due_jobs() {
    let harness = Harness::with_policy(PastDuePolicy::Skip);
    let (late, _) = harness.launched("alpha", past_steps(), 1).await;
    let (on_time, _) = harness.launched("beta", relative_steps(), 1).await;
    harness.connect().await;

    let report = harness.dispatcher.tick_at(now()).await.unwrap();

    assert_eq!((report.sent, report.skipped), (1, 3));
    assert_eq!(report.completed, vec![late.id]);
    let skipped = harness.jobs(&late).await;
    assert!(skipped.iter().all(|job| job.status == Skipped));
    assert!(skipped[0].error_message.is_some());
    assert_eq!(
        harness.statuses(&on_time).await,
        vec![Sent, Scheduled, Scheduled]
    );

    // A retried job is due now, not past due, so it is sent
    let later = now() + Duration::minutes(5);
    harness.campaigns.retry(&skipped[0].id, later).await.unwrap();
    assert_eq!(harness.dispatcher.tick_at(later).await.unwrap().sent, 1);
}

#[tokio::test]
async fn test_completion_needs_at_least_one_job() {
    let harness = Harness::new();
    let (campaign, contacts) = harness.launched("alpha", relative_steps(), 1).await;
    harness.connect().await;

    // Unenrolling the only contact before anything was sent leaves no jobs
    harness
        .campaigns
        .unenroll(&campaign.id, &contacts[0].id)
        .await
        .unwrap();
    let report = harness.dispatcher.tick_at(now()).await.unwrap();

    assert!(report.completed.is_empty());
    assert_eq!(
        harness.campaigns.campaign(&campaign.id).await.unwrap().status,
        CampaignStatus::Active
    );
}

#[tokio::test]
async fn test_concurrent_ticks_do_not_double_send() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", past_steps(), 2).await;
    harness.connect().await;

    let ticks: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = harness.dispatcher.clone();
            tokio::spawn(async move { dispatcher.tick_at(now()).await })
        })
        .collect();
    let mut sent = 0;
    for tick in ticks {
        sent += tick.await.unwrap().unwrap().sent;
    }

    assert_eq!(sent, 6);
    assert_eq!(harness.transport.sent().len(), 6);
    assert_eq!(harness.statuses(&campaign).await, vec![Sent; 6]);
}

#[tokio::test]
async fn test_store_failure_surfaces_and_next_tick_recovers() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", past_steps(), 1).await;
    harness.connect().await;

    harness.store.fail_job_updates(true);
    let err = harness.dispatcher.tick_at(now()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::System);

    harness.store.fail_job_updates(false);
    let report = harness.dispatcher.tick_at(now()).await.unwrap();
    assert_eq!(report.sent, 3);
    assert_eq!(harness.statuses(&campaign).await, vec![Sent; 3]);
    assert_eq!(harness.dispatcher.last_report(), Some(report));
}

#[tokio::test]
async fn test_unenroll_waits_for_the_send_in_flight() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", single_step(), 2).await;
    harness.connect().await;
    let first = harness.jobs(&campaign).await[0].clone();

    let tick = harness.tick_with_held_send().await;
    let unenroll = tokio::spawn({
        let campaigns = harness.campaigns.clone();
        let (campaign_id, contact_id) = (first.campaign_id, first.contact_id);
        async move { campaigns.unenroll(&campaign_id, &contact_id).await }
    });
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(!unenroll.is_finished());

    harness.transport.release_send();
    let report = tick.await.unwrap().unwrap();
    let removed = unenroll.await.unwrap().unwrap();

    // The message went out before the contact left, so its job is history
    assert_eq!(report.sent, 2);
    assert_eq!(removed, 0);
    let jobs = harness.jobs(&campaign).await;
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().any(|job| job.id == first.id && job.status == Sent));
    assert_eq!(harness.transport.sent().len(), 2);
}

#[tokio::test]
async fn test_delete_waits_for_the_send_in_flight() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", single_step(), 2).await;
    let (other, _) = harness.launched("beta", past_steps(), 1).await;
    harness.connect().await;

    let tick = harness.tick_with_held_send().await;
    let delete = tokio::spawn({
        let campaigns = harness.campaigns.clone();
        let id = campaign.id;
        async move { campaigns.delete(&id).await }
    });
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    assert!(!delete.is_finished());

    harness.transport.release_send();
    let report = tick.await.unwrap().unwrap();
    delete.await.unwrap().unwrap();

    assert!(!report.aborted);
    assert_eq!(
        harness.campaigns.campaign(&campaign.id).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert!(harness.jobs(&campaign).await.is_empty());
    // The other campaign is untouched by the deletion
    assert_eq!(harness.statuses(&other).await, vec![Sent; 3]);
    assert_eq!(harness.dispatcher.last_report(), Some(report));
}

#[tokio::test]
async fn test_job_removed_mid_send_does_not_abort_the_tick() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", single_step(), 2).await;
    harness.connect().await;
    let jobs = harness.jobs(&campaign).await;

    // Removed straight from the store, bypassing the campaign service
    let tick = harness.tick_with_held_send().await;
    let removed = harness
        .store
        .unenroll(&campaign.id, &jobs[0].contact_id)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    harness.transport.release_send();

    let report = tick.await.unwrap().unwrap();

    assert_eq!(report.due, 2);
    assert_eq!(report.sent, 1);
    assert!(!report.aborted);
    assert_eq!(harness.transport.sent().len(), 2);
    let remaining = harness.jobs(&campaign).await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, jobs[1].id);
    assert_eq!(remaining[0].status, Sent);
    assert_eq!(
        harness.campaigns.campaign(&campaign.id).await.unwrap().status,
        CampaignStatus::Completed
    );
}

#[tokio::test]
async fn test_disconnect_mid_tick_stops_without_attempting() {
    let harness = Harness::new();
    let (campaign, _) = harness.launched("alpha", past_steps(), 1).await;
    harness.connect().await;

    let tick = harness.tick_with_held_send().await;
    let disconnect = tokio::spawn({
        let session = harness.session.clone();
        async move { session.disconnect().await }
    });
    tokio::time::sleep(StdDuration::from_millis(50)).await;
    harness.transport.release_send();

    let report = tick.await.unwrap().unwrap();
    disconnect.await.unwrap().unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);
    assert!(report.aborted);
    // Only the held send ever reached the transport
    assert_eq!(harness.transport.send_attempts(), 1);
    assert_eq!(
        harness.statuses(&campaign).await,
        vec![Sent, Scheduled, Scheduled]
    );
    assert_eq!(harness.session.status().state, SessionState::Disconnected);
}
