//! Job intake: payload validation and the existing-client review bypass.

use mongodb::bson::{oid::ObjectId, DateTime};

use crate::models::{Client, CreateJobDto, Job, JobStatus, StatusChange};
use crate::services::WorkflowError;
use crate::utils::{normalize_email, validate_email};

/// How a new job enters the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeRoute {
    /// New client, goes to compliance review.
    Review,
    /// Known client email, review skipped.
    ExistingClient,
    /// Created by operations as already approved.
    PreApproved,
}

impl IntakeRoute {
    pub fn for_client(existing: Option<&Client>) -> Self {
        if existing.is_some() {
            IntakeRoute::ExistingClient
        } else {
            IntakeRoute::Review
        }
    }

    pub fn initial_status(self) -> JobStatus {
        match self {
            IntakeRoute::Review => JobStatus::Pending,
            IntakeRoute::ExistingClient | IntakeRoute::PreApproved => JobStatus::Approved,
        }
    }

    fn note(self) -> Option<String> {
        match self {
            IntakeRoute::Review => None,
            IntakeRoute::ExistingClient => {
                Some("Existing client: compliance review skipped".to_string())
            }
            IntakeRoute::PreApproved => Some("Pre-approved by operations".to_string()),
        }
    }
}

/// Intake payload that passed every check not needing the database.
/// `client_name` and `starting_point` may still be filled from a known client.
#[derive(Debug, Clone)]
pub struct IntakeDraft {
    pub client_name: Option<String>,
    pub gmail: String,
    pub starting_point: Option<String>,
    pub service_type: String,
    pub assigned_person: ObjectId,
    pub job_details: String,
    pub special_description: Option<String>,
    pub document_passport: Option<String>,
    pub document_id: String,
    pub other_documents: Vec<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Checks the payload without touching the database. Every missing field is
/// reported at once.
pub fn validate(dto: &CreateJobDto) -> Result<IntakeDraft, WorkflowError> {
    let gmail = present(&dto.gmail);
    let service_type = present(&dto.service_type);
    let assigned_person = present(&dto.assigned_person);
    let job_details = present(&dto.job_details);
    let document_id = present(&dto.document_id);

    let mut missing = Vec::new();
    for (name, value) in [
        ("gmail", &gmail),
        ("serviceType", &service_type),
        ("assignedPerson", &assigned_person),
        ("jobDetails", &job_details),
        ("documentID", &document_id),
    ] {
        if value.is_none() {
            missing.push(name.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(WorkflowError::MissingFields(missing));
    }

    let gmail = gmail.unwrap_or_default();
    if !validate_email(&gmail) {
        return Err(WorkflowError::InvalidField {
            field: "gmail",
            reason: "not a valid email address".to_string(),
        });
    }

    let assigned_person = ObjectId::parse_str(assigned_person.unwrap_or_default()).map_err(|_| {
        WorkflowError::InvalidField {
            field: "assignedPerson",
            reason: "not a valid user id".to_string(),
        }
    })?;

    Ok(IntakeDraft {
        client_name: present(&dto.client_name),
        gmail: normalize_email(&gmail),
        starting_point: present(&dto.starting_point),
        service_type: service_type.unwrap_or_default(),
        assigned_person,
        job_details: job_details.unwrap_or_default(),
        special_description: present(&dto.special_description),
        document_passport: present(&dto.document_passport),
        document_id: document_id.unwrap_or_default(),
        other_documents: dto
            .other_documents
            .iter()
            .flatten()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect(),
    })
}

impl IntakeDraft {
    /// Fills name and starting point from a known client, then builds the job.
    pub fn into_job(
        self,
        existing: Option<&Client>,
        route: IntakeRoute,
        actor: Option<ObjectId>,
        now: DateTime,
    ) -> Result<Job, WorkflowError> {
        let client_name = self
            .client_name
            .or_else(|| existing.map(|c| c.client_name.clone()));
        let starting_point = self
            .starting_point
            .or_else(|| existing.map(|c| c.starting_point.clone()));

        let mut missing = Vec::new();
        if client_name.is_none() {
            missing.push("clientName".to_string());
        }
        if starting_point.is_none() {
            missing.push("startingPoint".to_string());
        }
        if !missing.is_empty() {
            return Err(WorkflowError::MissingFields(missing));
        }

        let status = route.initial_status();
        Ok(Job {
            id: None,
            client_name: client_name.unwrap_or_default(),
            gmail: self.gmail,
            starting_point: starting_point.unwrap_or_default(),
            service_type: self.service_type,
            assigned_person: self.assigned_person,
            job_details: self.job_details,
            special_description: self.special_description,
            document_passport: self.document_passport,
            document_id: Some(self.document_id),
            other_documents: self.other_documents,
            status,
            rejection_reason: None,
            rejection_document: None,
            resubmissions: Vec::new(),
            status_history: vec![StatusChange {
                from: None,
                to: status,
                changed_at: now,
                changed_by: actor,
                note: route.note(),
            }],
            existing_client: route == IntakeRoute::ExistingClient,
            kyc_documents: Vec::new(),
            engagement_letter: None,
            created_by: actor,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_dto() -> CreateJobDto {
        CreateJobDto {
            client_name: Some("Acme Trading".into()),
            gmail: Some("Owner@Acme.example".into()),
            starting_point: Some("Referral".into()),
            service_type: Some("Company Formation".into()),
            assigned_person: Some(ObjectId::new().to_hex()),
            job_details: Some("Free-zone setup".into()),
            document_id: Some("id.pdf".into()),
            other_documents: Some(vec!["a.pdf".into(), " ".into()]),
            ..Default::default()
        }
    }

    fn known_client() -> Client {
        let now = DateTime::now();
        Client {
            id: None,
            email: "owner@acme.example".into(),
            client_name: "Acme Trading LLC".into(),
            starting_point: "Website".into(),
            created_at: now,
            last_job_at: now,
        }
    }

    #[test]
    fn missing_id_document_is_rejected_up_front() {
        let dto = CreateJobDto { document_id: None, ..complete_dto() };
        assert_eq!(
            validate(&dto).unwrap_err(),
            WorkflowError::MissingFields(vec!["documentID".into()])
        );

        let blank = CreateJobDto { document_id: Some("  ".into()), ..complete_dto() };
        assert!(validate(&blank).is_err());
    }

    #[test]
    fn all_missing_fields_are_reported() {
        let err = validate(&CreateJobDto::default()).unwrap_err();
        match err {
            WorkflowError::MissingFields(fields) => {
                assert_eq!(
                    fields,
                    vec!["gmail", "serviceType", "assignedPerson", "jobDetails", "documentID"]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_email_and_user_id_are_invalid() {
        let dto = CreateJobDto { gmail: Some("nope".into()), ..complete_dto() };
        assert!(matches!(validate(&dto), Err(WorkflowError::InvalidField { field: "gmail", .. })));

        let dto = CreateJobDto { assigned_person: Some("42".into()), ..complete_dto() };
        assert!(matches!(
            validate(&dto),
            Err(WorkflowError::InvalidField { field: "assignedPerson", .. })
        ));
    }

    #[test]
    fn new_client_goes_to_review() {
        let draft = validate(&complete_dto()).unwrap();
        let job = draft
            .into_job(None, IntakeRoute::for_client(None), None, DateTime::now())
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.existing_client);
        assert_eq!(job.gmail, "owner@acme.example");
        assert_eq!(job.other_documents, vec!["a.pdf".to_string()]);
        assert_eq!(job.status_history.len(), 1);
        assert_eq!(job.status_history[0].from, None);
    }

    #[test]
    fn existing_client_is_auto_approved() {
        let client = known_client();
        let route = IntakeRoute::for_client(Some(&client));
        let job = validate(&complete_dto())
            .unwrap()
            .into_job(Some(&client), route, None, DateTime::now())
            .unwrap();

        assert_eq!(job.status, JobStatus::Approved);
        assert!(job.existing_client);
        assert!(job.status_history[0].note.is_some());
        // explicit input wins over the stored client name
        assert_eq!(job.client_name, "Acme Trading");
    }

    #[test]
    fn known_client_fills_name_and_starting_point() {
        let client = known_client();
        let dto = CreateJobDto { client_name: None, starting_point: None, ..complete_dto() };
        let job = validate(&dto)
            .unwrap()
            .into_job(Some(&client), IntakeRoute::ExistingClient, None, DateTime::now())
            .unwrap();

        assert_eq!(job.client_name, "Acme Trading LLC");
        assert_eq!(job.starting_point, "Website");
    }

    #[test]
    fn unknown_client_still_needs_name_and_starting_point() {
        let dto = CreateJobDto { client_name: None, starting_point: None, ..complete_dto() };
        let err = validate(&dto)
            .unwrap()
            .into_job(None, IntakeRoute::Review, None, DateTime::now())
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::MissingFields(vec!["clientName".into(), "startingPoint".into()])
        );
    }

    #[test]
    fn pre_approved_jobs_are_not_flagged_as_existing_clients() {
        let job = validate(&complete_dto())
            .unwrap()
            .into_job(None, IntakeRoute::PreApproved, None, DateTime::now())
            .unwrap();
        assert_eq!(job.status, JobStatus::Approved);
        assert!(!job.existing_client);
    }
}
