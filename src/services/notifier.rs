use log::{info, warn};
use mongodb::bson::{doc, DateTime};
use mongodb::options::UpdateOptions;

use crate::db::{DbConn, CLIENTS, NOTIFICATIONS};
use crate::models::{Client, Job, JobStatus, Notification};

pub struct NotificationService;

impl NotificationService {
    pub fn status_message(job: &Job, to: JobStatus) -> String {
        match to {
            JobStatus::Approved => format!("Job for {} was approved", job.client_name),
            JobStatus::Rejected => format!("Job for {} was rejected", job.client_name),
            JobStatus::Corrected => format!("{} resubmitted corrected documents", job.client_name),
            JobStatus::Completed => format!("Job for {} is completed", job.client_name),
            JobStatus::Cancelled => format!("Job for {} was cancelled", job.client_name),
            JobStatus::Pending => format!("New job for {} awaits review", job.client_name),
        }
    }

    /// Best effort: a failed insert never fails the status change itself.
    pub async fn status_changed(db: &DbConn, job: &Job, to: JobStatus) {
        let Some(job_id) = job.id else { return };

        let notification = Notification {
            id: None,
            recipient: job.assigned_person,
            job: job_id,
            message: Self::status_message(job, to),
            read: false,
            created_at: DateTime::now(),
        };

        if let Err(e) = db
            .collection::<Notification>(NOTIFICATIONS)
            .insert_one(&notification, None)
            .await
        {
            warn!("Failed to record notification for job {}: {}", job_id, e);
        }
    }
}

pub struct ClientService;

impl ClientService {
    pub async fn find_by_email(db: &DbConn, email: &str) -> Result<Option<Client>, mongodb::error::Error> {
        db.collection::<Client>(CLIENTS)
            .find_one(doc! { "email": crate::utils::normalize_email(email) }, None)
            .await
    }

    /// Registers (or refreshes) the job's client so later intakes skip review.
    pub async fn record_completed_job(db: &DbConn, job: &Job) {
        let now = DateTime::now();
        let result = db
            .collection::<Client>(CLIENTS)
            .update_one(
                doc! { "email": &job.gmail },
                doc! {
                    "$set": {
                        "clientName": &job.client_name,
                        "startingPoint": &job.starting_point,
                        "lastJobAt": now,
                    },
                    "$setOnInsert": { "createdAt": now },
                },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await;

        match result {
            Ok(r) if r.upserted_id.is_some() => info!("Registered client {}", job.gmail),
            Ok(_) => {}
            Err(e) => warn!("Failed to register client {}: {}", job.gmail, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::tests::job_with;

    #[test]
    fn messages_name_the_client() {
        let job = job_with(Some("a.pdf"));
        assert_eq!(
            NotificationService::status_message(&job, JobStatus::Rejected),
            "Job for Acme Trading was rejected"
        );
        assert!(NotificationService::status_message(&job, JobStatus::Corrected).contains("resubmitted"));
    }
}
