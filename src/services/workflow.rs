use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime, Document};
use thiserror::Error;

use crate::models::{Job, JobStatus, Resubmission, ResubmitJobDto, Role, StatusChange};
use crate::utils::ApiError;

#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Cannot move a job from {from} to {to}")]
    Transition { from: JobStatus, to: JobStatus },

    #[error("An ID document is required before a job can leave pending")]
    MissingIdDocument,

    #[error("An engagement letter must be uploaded before the job can be completed")]
    MissingEngagementLetter,

    #[error("Job is {0} and can no longer be changed here")]
    NotEditable(JobStatus),

    #[error("The {0} role cannot be deleted")]
    ProtectedRole(String),

    #[error("Role '{name}' is still assigned to {users} user(s)")]
    RoleInUse { name: String, users: u64 },
}

/// Validates moving `job` to `to`: the edge must exist in the workflow graph,
/// leaving `pending` needs an ID document and completion needs an engagement
/// letter.
pub fn check_transition(job: &Job, to: JobStatus) -> Result<(), WorkflowError> {
    if !job.status.can_transition_to(to) {
        return Err(WorkflowError::Transition { from: job.status, to });
    }

    if job.status == JobStatus::Pending && to != JobStatus::Cancelled && !job.has_id_document() {
        return Err(WorkflowError::MissingIdDocument);
    }

    if to == JobStatus::Completed
        && job
            .engagement_letter
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
    {
        return Err(WorkflowError::MissingEngagementLetter);
    }

    Ok(())
}

/// Client fields may be edited until the job is closed.
pub fn ensure_editable(job: &Job) -> Result<(), WorkflowError> {
    if job.status.is_closed() {
        return Err(WorkflowError::NotEditable(job.status));
    }
    Ok(())
}

/// Matches the job only while it is still open for edits.
pub fn editable_filter(job_id: ObjectId) -> Document {
    let closed: Vec<&str> = JobStatus::ALL
        .into_iter()
        .filter(|s| s.is_closed())
        .map(JobStatus::as_str)
        .collect();
    doc! { "_id": job_id, "status": { "$nin": closed } }
}

/// Operations work on approved jobs only.
pub fn ensure_in_operations(job: &Job) -> Result<(), WorkflowError> {
    if job.status != JobStatus::Approved {
        return Err(WorkflowError::NotEditable(job.status));
    }
    Ok(())
}

pub fn ensure_role_deletable(role: &Role, assigned_users: u64) -> Result<(), WorkflowError> {
    if role.is_protected() {
        return Err(WorkflowError::ProtectedRole(role.name.clone()));
    }
    if assigned_users > 0 {
        return Err(WorkflowError::RoleInUse {
            name: role.name.clone(),
            users: assigned_users,
        });
    }
    Ok(())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Builds the immutable resubmission record. Blank URLs and an empty
/// replacement list mean "unchanged".
pub fn resubmission_from(dto: &ResubmitJobDto, now: DateTime) -> Resubmission {
    let new_other_documents = dto
        .new_other_documents
        .as_ref()
        .map(|docs| {
            docs.iter()
                .map(|d| d.trim())
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|docs| !docs.is_empty());

    Resubmission {
        resubmitted_at: now,
        resubmit_notes: dto.resubmit_notes.as_deref().unwrap_or_default().trim().to_string(),
        new_document_passport: non_blank(&dto.new_document_passport),
        new_document_id: non_blank(&dto.new_document_id),
        new_other_documents,
    }
}

/// A validated status change ready to be written.
#[derive(Debug)]
pub struct Transition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub change: StatusChange,
    pub set: Document,
    pub unset: Document,
    pub push: Document,
}

impl Transition {
    pub fn new(
        job: &Job,
        to: JobStatus,
        actor: Option<ObjectId>,
        note: Option<String>,
    ) -> Result<Self, WorkflowError> {
        check_transition(job, to)?;

        let now = DateTime::now();
        let mut unset = Document::new();
        if job.status == JobStatus::Rejected {
            unset.insert("rejectionReason", "");
            unset.insert("rejectionDocument", "");
        }

        Ok(Transition {
            from: job.status,
            to,
            change: StatusChange {
                from: Some(job.status),
                to,
                changed_at: now,
                changed_by: actor,
                note,
            },
            set: doc! { "status": to.as_str(), "updatedAt": now },
            unset,
            push: Document::new(),
        })
    }

    pub fn with_rejection(mut self, reason: &str, document: Option<&str>) -> Self {
        self.set.insert("rejectionReason", reason);
        if let Some(url) = document {
            self.set.insert("rejectionDocument", url);
        }
        self
    }

    pub fn with_resubmission(mut self, resubmission: &Resubmission) -> Result<Self, ApiError> {
        let value = to_bson(resubmission)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode resubmission: {}", e)))?;
        self.push.insert("resubmissions", value);
        Ok(self)
    }

    /// Filter matching the job only while it is still in the status we read.
    pub fn filter(&self, job_id: ObjectId) -> Document {
        doc! { "_id": job_id, "status": self.from.as_str() }
    }

    pub fn update(&self) -> Result<Document, ApiError> {
        let change = to_bson(&self.change)
            .map_err(|e| ApiError::internal_error(format!("Failed to encode status change: {}", e)))?;

        let mut push = self.push.clone();
        push.insert("statusHistory", change);

        let mut update = doc! { "$set": self.set.clone(), "$push": push };
        if !self.unset.is_empty() {
            update.insert("$unset", self.unset.clone());
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::tests::job_with;
    use crate::models::Permissions;

    #[test]
    fn leaving_pending_needs_an_id_document() {
        let job = job_with(None);
        assert_eq!(
            check_transition(&job, JobStatus::Approved),
            Err(WorkflowError::MissingIdDocument)
        );
        assert_eq!(
            check_transition(&job, JobStatus::Rejected),
            Err(WorkflowError::MissingIdDocument)
        );
        assert!(check_transition(&job, JobStatus::Cancelled).is_ok());
        assert!(check_transition(&job_with(Some("a.pdf")), JobStatus::Approved).is_ok());
    }

    #[test]
    fn completion_is_gated_on_the_engagement_letter() {
        let mut job = job_with(Some("a.pdf"));
        job.status = JobStatus::Approved;
        assert_eq!(
            check_transition(&job, JobStatus::Completed),
            Err(WorkflowError::MissingEngagementLetter)
        );
        job.engagement_letter = Some("letter.pdf".into());
        assert!(check_transition(&job, JobStatus::Completed).is_ok());
    }

    #[test]
    fn disallowed_edges_name_both_states() {
        let mut job = job_with(Some("a.pdf"));
        job.status = JobStatus::Rejected;
        let err = check_transition(&job, JobStatus::Approved).unwrap_err();
        assert_eq!(err.to_string(), "Cannot move a job from rejected to approved");
    }

    #[test]
    fn transition_is_conditional_on_the_read_status() {
        let job = job_with(Some("a.pdf"));
        let id = job.id.unwrap();
        let t = Transition::new(&job, JobStatus::Approved, None, None).unwrap();
        assert_eq!(t.filter(id), doc! { "_id": id, "status": "pending" });

        let update = t.update().unwrap();
        assert_eq!(update.get_document("$set").unwrap().get_str("status").unwrap(), "approved");
        assert!(update.get_document("$push").unwrap().contains_key("statusHistory"));
        assert!(!update.contains_key("$unset"));
    }

    #[test]
    fn leaving_rejected_clears_rejection_fields() {
        let mut job = job_with(Some("a.pdf"));
        job.status = JobStatus::Rejected;
        job.rejection_reason = Some("blurry".into());

        let resubmission = resubmission_from(&ResubmitJobDto::default(), DateTime::now());
        let update = Transition::new(&job, JobStatus::Corrected, None, None)
            .unwrap()
            .with_resubmission(&resubmission)
            .unwrap()
            .update()
            .unwrap();

        let unset = update.get_document("$unset").unwrap();
        assert!(unset.contains_key("rejectionReason"));
        assert!(unset.contains_key("rejectionDocument"));
        let push = update.get_document("$push").unwrap();
        assert!(push.contains_key("resubmissions"));
    }

    #[test]
    fn rejection_records_reason_and_document() {
        let job = job_with(Some("a.pdf"));
        let t = Transition::new(&job, JobStatus::Rejected, None, Some("blurry".into()))
            .unwrap()
            .with_rejection("ID is blurry", Some("markup.pdf"));
        assert_eq!(t.set.get_str("rejectionReason").unwrap(), "ID is blurry");
        assert_eq!(t.set.get_str("rejectionDocument").unwrap(), "markup.pdf");
    }

    #[test]
    fn blank_resubmission_slots_mean_unchanged() {
        let dto = ResubmitJobDto {
            resubmit_notes: Some("  see new scan ".into()),
            new_document_passport: Some("   ".into()),
            new_document_id: Some("id-v2.pdf".into()),
            new_other_documents: Some(vec![" ".into()]),
        };
        let r = resubmission_from(&dto, DateTime::now());
        assert_eq!(r.resubmit_notes, "see new scan");
        assert_eq!(r.new_document_passport, None);
        assert_eq!(r.new_document_id.as_deref(), Some("id-v2.pdf"));
        assert_eq!(r.new_other_documents, None);
    }

    #[test]
    fn edit_filter_excludes_closed_statuses() {
        let id = ObjectId::new();
        assert_eq!(
            editable_filter(id),
            doc! { "_id": id, "status": { "$nin": ["completed", "cancelled"] } }
        );
    }

    #[test]
    fn closed_jobs_are_not_editable() {
        let mut job = job_with(Some("a.pdf"));
        assert!(ensure_editable(&job).is_ok());
        job.status = JobStatus::Cancelled;
        assert_eq!(ensure_editable(&job), Err(WorkflowError::NotEditable(JobStatus::Cancelled)));
        job.status = JobStatus::Pending;
        assert!(ensure_in_operations(&job).is_err());
        job.status = JobStatus::Approved;
        assert!(ensure_in_operations(&job).is_ok());
    }

    fn role(name: &str) -> Role {
        let now = DateTime::now();
        Role {
            id: Some(ObjectId::new()),
            name: name.into(),
            description: None,
            permissions: Permissions::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admin_role_cannot_be_deleted() {
        assert_eq!(
            ensure_role_deletable(&role("Admin"), 0),
            Err(WorkflowError::ProtectedRole("Admin".into()))
        );
    }

    #[test]
    fn roles_in_use_cannot_be_deleted() {
        assert_eq!(
            ensure_role_deletable(&role("Reviewer"), 2),
            Err(WorkflowError::RoleInUse { name: "Reviewer".into(), users: 2 })
        );
        assert!(ensure_role_deletable(&role("Reviewer"), 0).is_ok());
    }
}
