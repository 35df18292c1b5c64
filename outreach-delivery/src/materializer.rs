//! Expansion of campaigns into email jobs
//!
//! Materialization is a pure function of the campaign, its enrolled
//! contacts and the jobs that already exist. It never creates a second job
//! for a (contact, step) pair, so it can be re-run after a resume or a late
//! enrollment and will only fill in what is missing.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use outreach_common::{
    Campaign, Contact, ContactId, EmailJob, EmailTemplate, Enrollment, JobId, JobStatus,
    SendAnchor, internal,
};

use crate::tokens;

/// Absolute send time of a step for one enrollment
///
/// Relative offsets count from the later of the contact's enrollment and the
/// campaign's launch, so contacts enrolled before launch all start at launch.
#[must_use]
pub fn scheduled_at(
    anchor: SendAnchor,
    enrolled_at: DateTime<Utc>,
    launched_at: DateTime<Utc>,
) -> DateTime<Utc> {
    match anchor {
        SendAnchor::At(at) => at,
        SendAnchor::OffsetDays(days) => {
            enrolled_at.max(launched_at) + Duration::days(i64::from(days))
        }
    }
}

fn render(
    campaign: &Campaign,
    template: &EmailTemplate,
    enrollment: &Enrollment,
    contact: &Contact,
    now: DateTime<Utc>,
) -> Option<EmailJob> {
    let anchor = template.anchor()?;
    let launched_at = campaign.launched_at.unwrap_or(now);

    let missing = tokens::unresolved(&template.body, contact);
    if !missing.is_empty() {
        internal!(
            level = DEBUG,
            "Step {} for {} leaves placeholders unresolved: {:?}",
            template.step_number,
            contact.email,
            missing
        );
    }

    Some(EmailJob {
        id: JobId::generate(),
        campaign_id: campaign.id,
        contact_id: contact.id,
        step_number: template.step_number,
        recipient: contact.email.clone(),
        subject: tokens::substitute(&template.subject, contact),
        body: tokens::substitute(&template.body, contact),
        scheduled_at: scheduled_at(anchor, enrollment.enrolled_at, launched_at),
        materialized_at: now,
        sent_at: None,
        status: JobStatus::Scheduled,
        error_message: None,
    })
}

/// Create the jobs that are missing for `enrolled` contacts
///
/// `existing` are the campaign's current jobs. Steps without a send anchor
/// are skipped; launch validation rejects such campaigns before they get here.
/// Jobs come out grouped by contact (in enrollment order), then by step.
#[must_use]
pub fn materialize(
    campaign: &Campaign,
    enrolled: &[(Enrollment, Contact)],
    existing: &[EmailJob],
    now: DateTime<Utc>,
) -> Vec<EmailJob> {
    let done: HashSet<(ContactId, u32)> = existing
        .iter()
        .filter(|job| job.campaign_id == campaign.id)
        .map(|job| (job.contact_id, job.step_number))
        .collect();

    let mut steps: Vec<&EmailTemplate> = campaign.templates.iter().collect();
    steps.sort_by_key(|t| t.step_number);

    enrolled
        .iter()
        .filter(|(enrollment, _)| enrollment.campaign_id == campaign.id)
        .flat_map(|(enrollment, contact)| {
            steps
                .iter()
                .filter(|template| !done.contains(&(contact.id, template.step_number)))
                .filter_map(|template| render(campaign, template, enrollment, contact, now))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, hour, 0, 0).unwrap()
    }

    fn launched_campaign(templates: Vec<EmailTemplate>) -> Campaign {
        let mut campaign = Campaign::new("Spring", templates);
        campaign.launched_at = Some(at(10, 9));
        campaign
    }

    fn enroll(campaign: &Campaign, contact: &Contact, when: DateTime<Utc>) -> (Enrollment, Contact) {
        (
            Enrollment {
                campaign_id: campaign.id,
                contact_id: contact.id,
                enrolled_at: when,
            },
            contact.clone(),
        )
    }

    #[test]
    fn test_relative_offsets_count_from_launch_or_enrollment() {
        let launch = at(10, 9);

        assert_eq!(
            scheduled_at(SendAnchor::OffsetDays(2), at(1, 0), launch),
            at(12, 9)
        );
        assert_eq!(
            scheduled_at(SendAnchor::OffsetDays(2), at(15, 14), launch),
            at(17, 14)
        );
        assert_eq!(
            scheduled_at(SendAnchor::At(at(3, 3)), at(15, 14), launch),
            at(3, 3)
        );
    }

    #[test]
    fn test_materialize_every_pair_once() {
        let campaign = launched_campaign(vec![
            EmailTemplate::new(2, "Follow up {{name}}", "Still there?").after_days(3),
            EmailTemplate::new(1, "Hello {{name}}", "Hi from {{company}}").after_days(0),
        ]);
        let ada = Contact::new("Ada", "ada@example.com").with_company("Engines");
        let bob = Contact::new("Bob", "bob@example.com");
        let enrolled = vec![
            enroll(&campaign, &ada, at(1, 0)),
            enroll(&campaign, &bob, at(1, 0)),
        ];

        let jobs = materialize(&campaign, &enrolled, &[], at(10, 9));

        let summary: Vec<_> = jobs
            .iter()
            .map(|j| (j.recipient.as_str(), j.step_number, j.subject.as_str(), j.scheduled_at))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("ada@example.com", 1, "Hello Ada", at(10, 9)),
                ("ada@example.com", 2, "Follow up Ada", at(13, 9)),
                ("bob@example.com", 1, "Hello Bob", at(10, 9)),
                ("bob@example.com", 2, "Follow up Bob", at(13, 9)),
            ]
        );
        assert_eq!(jobs[0].body, "Hi from Engines");
        assert_eq!(jobs[2].body, "Hi from {{company}}");
        assert!(jobs.iter().all(|j| j.status == JobStatus::Scheduled));

        // Running again with the result as existing jobs creates nothing
        assert!(materialize(&campaign, &enrolled, &jobs, at(11, 0)).is_empty());
    }

    #[test]
    fn test_only_missing_pairs_are_filled_in() {
        let campaign = launched_campaign(vec![
            EmailTemplate::new(1, "a", "b").after_days(0),
            EmailTemplate::new(2, "c", "d").after_days(1),
        ]);
        let ada = Contact::new("Ada", "ada@example.com");
        let bob = Contact::new("Bob", "bob@example.com");
        let first = materialize(
            &campaign,
            &[enroll(&campaign, &ada, at(1, 0))],
            &[],
            at(10, 9),
        );

        let late = materialize(
            &campaign,
            &[
                enroll(&campaign, &ada, at(1, 0)),
                enroll(&campaign, &bob, at(20, 8)),
            ],
            &first,
            at(20, 8),
        );

        assert_eq!(late.len(), 2);
        assert!(late.iter().all(|j| j.contact_id == bob.id));
        assert_eq!(late[0].scheduled_at, at(20, 8));
        assert_eq!(late[1].scheduled_at, at(21, 8));
    }

    #[test]
    fn test_past_due_jobs_are_still_created() {
        let campaign = launched_campaign(vec![EmailTemplate::new(1, "a", "b").at(at(1, 0))]);
        let ada = Contact::new("Ada", "ada@example.com");

        let jobs = materialize(
            &campaign,
            &[enroll(&campaign, &ada, at(1, 0))],
            &[],
            at(10, 9),
        );

        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].was_past_due());
    }
}
