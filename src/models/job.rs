use std::fmt;

use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket::form::FromForm;
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;

use super::to_rfc3339;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Corrected,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Corrected,
        JobStatus::Approved,
        JobStatus::Rejected,
        JobStatus::Completed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Corrected => "corrected",
            JobStatus::Approved => "approved",
            JobStatus::Rejected => "rejected",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<JobStatus> {
        let raw = raw.trim().to_lowercase();
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// Edges of the workflow graph. Gate conditions (ID document, engagement
    /// letter) live in `services::workflow`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending | Corrected, Approved | Rejected) => true,
            (Rejected, Corrected) => true,
            (Approved, Completed) => true,
            (from, Cancelled) => from != Cancelled,
            _ => false,
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One correction round submitted after a rejection. `None` slots are unchanged.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Resubmission {
    pub resubmitted_at: DateTime,
    #[serde(default)]
    pub resubmit_notes: String,
    #[serde(default)]
    pub new_document_passport: Option<String>,
    #[serde(rename = "newDocumentID", default)]
    pub new_document_id: Option<String>,
    #[serde(default)]
    pub new_other_documents: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// `None` for the status a job was created with.
    pub from: Option<JobStatus>,
    pub to: JobStatus,
    pub changed_at: DateTime,
    pub changed_by: Option<ObjectId>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KycDocument {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    // Client
    pub client_name: String,
    pub gmail: String,
    pub starting_point: String,
    pub service_type: String,
    pub assigned_person: ObjectId,
    pub job_details: String,
    pub special_description: Option<String>,

    // Documents
    pub document_passport: Option<String>,
    #[serde(rename = "documentID", default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub other_documents: Vec<String>,

    // Workflow
    pub status: JobStatus,
    pub rejection_reason: Option<String>,
    pub rejection_document: Option<String>,
    #[serde(default)]
    pub resubmissions: Vec<Resubmission>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    #[serde(default)]
    pub existing_client: bool,

    // Operations
    #[serde(default)]
    pub kyc_documents: Vec<KycDocument>,
    pub engagement_letter: Option<String>,

    pub created_by: Option<ObjectId>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Documents to display or download for a job.
#[derive(Debug, Serialize, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentDocuments {
    pub document_passport: Option<String>,
    #[serde(rename = "documentID")]
    pub document_id: Option<String>,
    pub other_documents: Vec<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum TimelineKind {
    Created,
    StatusChanged,
    Resubmitted,
}

#[derive(Debug, Serialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub kind: TimelineKind,
    pub at: String,
    pub from: Option<JobStatus>,
    pub status: Option<JobStatus>,
    pub note: Option<String>,
    pub actor: Option<String>,
}

impl Job {
    pub fn has_id_document(&self) -> bool {
        self.document_id
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    /// Resolves the documents currently in force. Only the newest
    /// resubmission is consulted; any slot it leaves empty falls back to the
    /// job's original value, never to an older resubmission.
    pub fn current_documents(&self) -> CurrentDocuments {
        match self.resubmissions.last() {
            None => CurrentDocuments {
                document_passport: self.document_passport.clone(),
                document_id: self.document_id.clone(),
                other_documents: self.other_documents.clone(),
            },
            Some(latest) => CurrentDocuments {
                document_passport: latest
                    .new_document_passport
                    .clone()
                    .or_else(|| self.document_passport.clone()),
                document_id: latest
                    .new_document_id
                    .clone()
                    .or_else(|| self.document_id.clone()),
                other_documents: latest
                    .new_other_documents
                    .clone()
                    .unwrap_or_else(|| self.other_documents.clone()),
            },
        }
    }

    /// Creation, resubmissions and status changes in time order.
    pub fn timeline(&self) -> Vec<TimelineEntry> {
        let initial = self
            .status_history
            .iter()
            .find(|c| c.from.is_none());

        let mut entries: Vec<(i64, TimelineEntry)> = vec![(
            self.created_at.timestamp_millis(),
            TimelineEntry {
                kind: TimelineKind::Created,
                at: to_rfc3339(self.created_at),
                from: None,
                status: Some(initial.map(|c| c.to).unwrap_or(JobStatus::Pending)),
                note: initial.and_then(|c| c.note.clone()),
                actor: self.created_by.map(|id| id.to_hex()),
            },
        )];

        for r in &self.resubmissions {
            entries.push((
                r.resubmitted_at.timestamp_millis(),
                TimelineEntry {
                    kind: TimelineKind::Resubmitted,
                    at: to_rfc3339(r.resubmitted_at),
                    from: None,
                    status: None,
                    note: Some(r.resubmit_notes.clone()).filter(|n| !n.is_empty()),
                    actor: None,
                },
            ));
        }

        for change in self.status_history.iter().filter(|c| c.from.is_some()) {
            entries.push((
                change.changed_at.timestamp_millis(),
                TimelineEntry {
                    kind: TimelineKind::StatusChanged,
                    at: to_rfc3339(change.changed_at),
                    from: change.from,
                    status: Some(change.to),
                    note: change.note.clone(),
                    actor: change.changed_by.map(|id| id.to_hex()),
                },
            ));
        }

        // stable: ties keep creation, resubmission, status-change order
        entries.sort_by_key(|(at, _)| *at);
        entries.into_iter().map(|(_, e)| e).collect()
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// Intake payload. Every field is optional on the wire so that validation can
/// report all missing fields at once.
#[derive(Debug, Deserialize, JsonSchema, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobDto {
    pub client_name: Option<String>,
    pub gmail: Option<String>,
    pub starting_point: Option<String>,
    pub service_type: Option<String>,
    pub assigned_person: Option<String>,
    pub job_details: Option<String>,
    pub special_description: Option<String>,
    pub document_passport: Option<String>,
    #[serde(rename = "documentID")]
    pub document_id: Option<String>,
    pub other_documents: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobDto {
    pub client_name: Option<String>,
    pub starting_point: Option<String>,
    pub service_type: Option<String>,
    pub assigned_person: Option<String>,
    pub job_details: Option<String>,
    pub special_description: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectJobDto {
    pub rejection_reason: String,
    pub rejection_document: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResubmitJobDto {
    pub resubmit_notes: Option<String>,
    pub new_document_passport: Option<String>,
    #[serde(rename = "newDocumentID")]
    pub new_document_id: Option<String>,
    pub new_other_documents: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CancelJobDto {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KycDocumentsDto {
    pub documents: Vec<KycDocument>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EngagementLetterDto {
    pub url: String,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct JobListQuery {
    pub status: Option<String>,
    #[field(name = "assignedPerson")]
    #[serde(rename = "assignedPerson")]
    pub assigned_person: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResubmissionResponse {
    pub resubmitted_at: String,
    pub resubmit_notes: String,
    pub new_document_passport: Option<String>,
    #[serde(rename = "newDocumentID")]
    pub new_document_id: Option<String>,
    pub new_other_documents: Option<Vec<String>>,
}

impl From<&Resubmission> for ResubmissionResponse {
    fn from(r: &Resubmission) -> Self {
        ResubmissionResponse {
            resubmitted_at: to_rfc3339(r.resubmitted_at),
            resubmit_notes: r.resubmit_notes.clone(),
            new_document_passport: r.new_document_passport.clone(),
            new_document_id: r.new_document_id.clone(),
            new_other_documents: r.new_other_documents.clone(),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: String,
    pub client_name: String,
    pub gmail: String,
    pub starting_point: String,
    pub service_type: String,
    pub assigned_person: String,
    pub job_details: String,
    pub special_description: Option<String>,
    pub document_passport: Option<String>,
    #[serde(rename = "documentID")]
    pub document_id: Option<String>,
    pub other_documents: Vec<String>,
    pub current_documents: CurrentDocuments,
    pub status: JobStatus,
    pub rejection_reason: Option<String>,
    pub rejection_document: Option<String>,
    pub resubmissions: Vec<ResubmissionResponse>,
    pub existing_client: bool,
    pub kyc_documents: Vec<KycDocument>,
    pub engagement_letter: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let current_documents = job.current_documents();
        JobResponse {
            id: job.id.map(|id| id.to_hex()).unwrap_or_default(),
            assigned_person: job.assigned_person.to_hex(),
            resubmissions: job.resubmissions.iter().map(Into::into).collect(),
            created_at: to_rfc3339(job.created_at),
            updated_at: to_rfc3339(job.updated_at),
            current_documents,
            client_name: job.client_name,
            gmail: job.gmail,
            starting_point: job.starting_point,
            service_type: job.service_type,
            job_details: job.job_details,
            special_description: job.special_description,
            document_passport: job.document_passport,
            document_id: job.document_id,
            other_documents: job.other_documents,
            status: job.status,
            rejection_reason: job.rejection_reason,
            rejection_document: job.rejection_document,
            existing_client: job.existing_client,
            kyc_documents: job.kyc_documents,
            engagement_letter: job.engagement_letter,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn job_with(document_id: Option<&str>) -> Job {
        let now = DateTime::from_millis(1_700_000_000_000);
        Job {
            id: Some(ObjectId::new()),
            client_name: "Acme Trading".into(),
            gmail: "owner@acme.example".into(),
            starting_point: "Walk-in".into(),
            service_type: "Company Formation".into(),
            assigned_person: ObjectId::new(),
            job_details: "Mainland LLC setup".into(),
            special_description: None,
            document_passport: Some("passport.pdf".into()),
            document_id: document_id.map(Into::into),
            other_documents: vec!["lease.pdf".into()],
            status: JobStatus::Pending,
            rejection_reason: None,
            rejection_document: None,
            resubmissions: Vec::new(),
            status_history: Vec::new(),
            existing_client: false,
            kyc_documents: Vec::new(),
            engagement_letter: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn resubmission(at: i64, new_id: Option<&str>) -> Resubmission {
        Resubmission {
            resubmitted_at: DateTime::from_millis(at),
            resubmit_notes: "fixed".into(),
            new_document_passport: None,
            new_document_id: new_id.map(Into::into),
            new_other_documents: None,
        }
    }

    #[test]
    fn workflow_edges() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(Corrected));
        assert!(Corrected.can_transition_to(Approved));
        assert!(Corrected.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Corrected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Completed.can_transition_to(Approved));
    }

    #[test]
    fn every_state_but_cancelled_can_cancel() {
        for status in JobStatus::ALL {
            assert_eq!(
                status.can_transition_to(JobStatus::Cancelled),
                status != JobStatus::Cancelled,
                "{status}"
            );
        }
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(JobStatus::parse("Approved"), Some(JobStatus::Approved));
        assert_eq!(JobStatus::parse(" corrected "), Some(JobStatus::Corrected));
        assert_eq!(JobStatus::parse("archived"), None);
    }

    #[test]
    fn current_documents_without_resubmissions_are_the_originals() {
        let job = job_with(Some("a.pdf"));
        let docs = job.current_documents();
        assert_eq!(docs.document_id.as_deref(), Some("a.pdf"));
        assert_eq!(docs.document_passport.as_deref(), Some("passport.pdf"));
        assert_eq!(docs.other_documents, vec!["lease.pdf".to_string()]);
    }

    #[test]
    fn latest_resubmission_overrides_id() {
        let mut job = job_with(Some("a.pdf"));
        job.resubmissions.push(resubmission(1, Some("b.pdf")));
        assert_eq!(job.current_documents().document_id.as_deref(), Some("b.pdf"));
    }

    #[test]
    fn notes_only_resubmission_falls_back_to_job_not_earlier_round() {
        let mut job = job_with(Some("a.pdf"));
        job.resubmissions.push(resubmission(1, Some("b.pdf")));
        job.resubmissions.push(resubmission(2, None));

        let docs = job.current_documents();
        assert_eq!(docs.document_id.as_deref(), Some("a.pdf"));
        assert_eq!(docs.document_passport.as_deref(), Some("passport.pdf"));
        assert_eq!(docs.other_documents, vec!["lease.pdf".to_string()]);
    }

    #[test]
    fn replaced_other_documents_come_from_latest_round() {
        let mut job = job_with(Some("a.pdf"));
        job.resubmissions.push(Resubmission {
            new_other_documents: Some(vec!["new-lease.pdf".into(), "noc.pdf".into()]),
            new_document_passport: Some("passport-v2.pdf".into()),
            ..resubmission(1, None)
        });

        let docs = job.current_documents();
        assert_eq!(docs.other_documents.len(), 2);
        assert_eq!(docs.document_passport.as_deref(), Some("passport-v2.pdf"));
        assert_eq!(docs.document_id.as_deref(), Some("a.pdf"));
    }

    #[test]
    fn blank_id_document_does_not_count() {
        assert!(job_with(Some("a.pdf")).has_id_document());
        assert!(!job_with(Some("  ")).has_id_document());
        assert!(!job_with(None).has_id_document());
    }

    #[test]
    fn timeline_is_time_ordered() {
        let mut job = job_with(Some("a.pdf"));
        let base = job.created_at.timestamp_millis();
        job.status_history.push(StatusChange {
            from: Some(JobStatus::Pending),
            to: JobStatus::Rejected,
            changed_at: DateTime::from_millis(base + 10),
            changed_by: None,
            note: Some("blurry ID".into()),
        });
        job.resubmissions.push(resubmission(base + 20, Some("b.pdf")));
        job.status_history.push(StatusChange {
            from: Some(JobStatus::Rejected),
            to: JobStatus::Corrected,
            changed_at: DateTime::from_millis(base + 20),
            changed_by: None,
            note: None,
        });

        let kinds: Vec<TimelineKind> = job.timeline().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TimelineKind::Created,
                TimelineKind::StatusChanged,
                TimelineKind::Resubmitted,
                TimelineKind::StatusChanged,
            ]
        );
        assert_eq!(job.timeline()[0].status, Some(JobStatus::Pending));
    }

    #[test]
    fn timeline_reports_bypass_status_at_creation() {
        let mut job = job_with(Some("a.pdf"));
        job.status = JobStatus::Approved;
        job.status_history.push(StatusChange {
            from: None,
            to: JobStatus::Approved,
            changed_at: job.created_at,
            changed_by: None,
            note: Some("Existing client".into()),
        });

        let timeline = job.timeline();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].status, Some(JobStatus::Approved));
        assert_eq!(timeline[0].note.as_deref(), Some("Existing client"));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(JobStatus::Corrected).unwrap(), "corrected");
    }
}
