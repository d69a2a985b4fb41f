use log::{info, warn};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};

use crate::db::{self, DbConn, JOBS, USERS};
use crate::guards::Session;
use crate::models::{
    CancelJobDto, CreateJobDto, Feature, Job, JobListQuery, JobResponse, JobStatus,
    RejectJobDto, ResubmitJobDto, TimelineEntry, UpdateJobDto, User,
};
use crate::services::{
    intake, workflow, ClientService, IntakeRoute, NotificationService, Transition,
};
use crate::utils::{is_blank, parse_object_id, ApiError, ApiResponse, Pagination};

// ============================================================================
// SHARED HELPERS
// ============================================================================

pub(crate) async fn find_job(db: &DbConn, job_id: &str) -> Result<Job, ApiError> {
    let object_id = parse_object_id(job_id, "job")?;

    db.collection::<Job>(JOBS)
        .find_one(doc! { "_id": object_id }, None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

async fn ensure_user_exists(db: &DbConn, user_id: ObjectId) -> Result<(), ApiError> {
    let count = db
        .collection::<User>(USERS)
        .count_documents(doc! { "_id": user_id, "isActive": true }, None)
        .await
        .map_err(ApiError::database)?;

    if count == 0 {
        return Err(ApiError::bad_request("Assigned person does not exist"));
    }
    Ok(())
}

/// Writes a validated transition. The write only matches while the job is
/// still in the status it was read in; a concurrent change yields 409.
pub(crate) async fn apply_transition(
    db: &DbConn,
    job: &Job,
    transition: Transition,
) -> Result<Job, ApiError> {
    let job_id = job
        .id
        .ok_or_else(|| ApiError::internal_error("Job has no id"))?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let updated = db
        .collection::<Job>(JOBS)
        .find_one_and_update(transition.filter(job_id), transition.update()?, options)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update job: {}", e)))?
        .ok_or_else(|| {
            warn!("Job {} left {} before the update landed", job_id, transition.from);
            ApiError::conflict("Job status changed in the meantime; reload and try again")
        })?;

    info!("Job {} moved {} -> {}", job_id, transition.from, transition.to);
    NotificationService::status_changed(db, &updated, transition.to).await;

    Ok(updated)
}

/// Shared by regular intake and operations' pre-approved jobs.
pub(crate) async fn create_from_intake(
    db: &DbConn,
    session: &Session,
    dto: &CreateJobDto,
    pre_approved: bool,
) -> Result<Job, ApiError> {
    // No database access until the payload is known to be complete.
    let draft = intake::validate(dto)?;

    ensure_user_exists(db, draft.assigned_person).await?;

    let existing = ClientService::find_by_email(db, &draft.gmail)
        .await
        .map_err(ApiError::database)?;

    let route = if pre_approved {
        IntakeRoute::PreApproved
    } else {
        IntakeRoute::for_client(existing.as_ref())
    };

    let mut job = draft.into_job(existing.as_ref(), route, Some(session.user_id), DateTime::now())?;

    let result = db
        .collection::<Job>(JOBS)
        .insert_one(&job, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to create job: {}", e)))?;

    job.id = result.inserted_id.as_object_id();
    info!(
        "Job {:?} created for {} as {} ({:?})",
        job.id, job.gmail, job.status, route
    );
    NotificationService::status_changed(db, &job, job.status).await;

    Ok(job)
}

// ============================================================================
// JOB ENDPOINTS
// ============================================================================

#[openapi(tag = "Jobs")]
#[post("/jobs", data = "<dto>")]
pub async fn create_job(
    db: &State<DbConn>,
    session: Session,
    dto: Json<CreateJobDto>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session.require(Feature::JobCreation)?;

    let job = create_from_intake(db, &session, &dto, false).await?;
    let message = if job.status == JobStatus::Approved {
        "Existing client: job approved without compliance review"
    } else {
        "Job submitted for compliance review"
    };

    Ok(Json(ApiResponse::success_with_message(message, job.into())))
}

#[openapi(tag = "Jobs")]
#[get("/jobs?<query..>")]
pub async fn list_jobs(
    db: &State<DbConn>,
    _session: Session,
    query: JobListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let skip = Pagination::offset(page, limit)
        .ok_or_else(|| ApiError::bad_request(format!("Page {} is out of range", page)))?;

    let mut filter = doc! {};
    if let Some(ref status) = query.status {
        let status = JobStatus::parse(status)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown status '{}'", status)))?;
        filter.insert("status", status.as_str());
    }
    if let Some(ref assigned) = query.assigned_person {
        filter.insert("assignedPerson", parse_object_id(assigned, "user")?);
    }

    let find_options = FindOptions::builder()
        .skip(skip)
        .limit(limit)
        .sort(doc! { "createdAt": -1 })
        .build();

    let cursor = db
        .collection::<Job>(JOBS)
        .find(filter.clone(), find_options)
        .await
        .map_err(ApiError::database)?;

    let jobs: Vec<JobResponse> = db::collect(cursor)
        .await?
        .into_iter()
        .map(JobResponse::from)
        .collect();

    let total = db
        .collection::<Job>(JOBS)
        .count_documents(filter, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Count error: {}", e)))?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "jobs": jobs,
        "pagination": Pagination::new(page, limit, total),
    }))))
}

#[openapi(tag = "Jobs")]
#[get("/jobs/<job_id>")]
pub async fn get_job(
    db: &State<DbConn>,
    _session: Session,
    job_id: String,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let job = find_job(db, &job_id).await?;
    Ok(Json(ApiResponse::success(job.into())))
}

#[openapi(tag = "Jobs")]
#[put("/jobs/<job_id>", data = "<dto>")]
pub async fn update_job(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    dto: Json<UpdateJobDto>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session.require(Feature::JobCreation)?;

    let job = find_job(db, &job_id).await?;
    workflow::ensure_editable(&job)?;
    let job_id = job
        .id
        .ok_or_else(|| ApiError::internal_error("Job has no id"))?;

    let mut update_doc = doc! {
        "updatedAt": DateTime::now()
    };

    for (field, value) in [
        ("clientName", &dto.client_name),
        ("startingPoint", &dto.starting_point),
        ("serviceType", &dto.service_type),
        ("jobDetails", &dto.job_details),
    ] {
        if let Some(value) = value {
            if is_blank(value) {
                return Err(ApiError::bad_request(format!("{} cannot be empty", field)));
            }
            update_doc.insert(field, value.trim());
        }
    }
    if let Some(ref description) = dto.special_description {
        update_doc.insert("specialDescription", description.trim());
    }
    if let Some(ref assigned) = dto.assigned_person {
        let user_id = parse_object_id(assigned, "user")?;
        ensure_user_exists(db, user_id).await?;
        update_doc.insert("assignedPerson", user_id);
    }

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    let updated = db
        .collection::<Job>(JOBS)
        .find_one_and_update(
            workflow::editable_filter(job_id),
            doc! { "$set": update_doc },
            options,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update job: {}", e)))?
        .ok_or_else(|| ApiError::conflict("Job was closed in the meantime; it can no longer be edited"))?;

    Ok(Json(ApiResponse::success_with_message("Job updated", updated.into())))
}

#[openapi(tag = "Compliance")]
#[put("/jobs/<job_id>/approve")]
pub async fn approve_job(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session.require(Feature::ComplianceManagement)?;

    let job = find_job(db, &job_id).await?;
    let transition = Transition::new(&job, JobStatus::Approved, Some(session.user_id), None)?;
    let updated = apply_transition(db, &job, transition).await?;

    Ok(Json(ApiResponse::success_with_message("Job approved", updated.into())))
}

#[openapi(tag = "Compliance")]
#[put("/jobs/<job_id>/reject", data = "<dto>")]
pub async fn reject_job(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    dto: Json<RejectJobDto>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session.require(Feature::ComplianceManagement)?;

    let reason = dto.rejection_reason.trim();
    if reason.is_empty() {
        return Err(ApiError::bad_request("A rejection reason is required"));
    }
    let document = dto
        .rejection_document
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty());

    let job = find_job(db, &job_id).await?;
    let transition = Transition::new(
        &job,
        JobStatus::Rejected,
        Some(session.user_id),
        Some(reason.to_string()),
    )?
    .with_rejection(reason, document);
    let updated = apply_transition(db, &job, transition).await?;

    Ok(Json(ApiResponse::success_with_message("Job rejected", updated.into())))
}

#[openapi(tag = "Jobs")]
#[post("/jobs/<job_id>/resubmit", data = "<dto>")]
pub async fn resubmit_job(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    dto: Json<ResubmitJobDto>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session.require(Feature::JobCreation)?;

    let job = find_job(db, &job_id).await?;
    let resubmission = workflow::resubmission_from(&dto, DateTime::now());
    let note = Some(resubmission.resubmit_notes.clone()).filter(|n| !n.is_empty());

    let transition = Transition::new(&job, JobStatus::Corrected, Some(session.user_id), note)?
        .with_resubmission(&resubmission)?;
    let updated = apply_transition(db, &job, transition).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Corrections submitted for review",
        updated.into(),
    )))
}

#[openapi(tag = "Jobs")]
#[put("/jobs/<job_id>/cancel", data = "<dto>")]
pub async fn cancel_job(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    dto: Json<CancelJobDto>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session
        .require(Feature::ComplianceManagement)
        .or_else(|_| session.require(Feature::OperationManagement))?;

    let job = find_job(db, &job_id).await?;
    let note = dto.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
    let transition = Transition::new(&job, JobStatus::Cancelled, Some(session.user_id), note)?;
    let updated = apply_transition(db, &job, transition).await?;

    Ok(Json(ApiResponse::success_with_message("Job cancelled", updated.into())))
}

#[openapi(tag = "Jobs")]
#[get("/jobs/<job_id>/timeline")]
pub async fn get_job_timeline(
    db: &State<DbConn>,
    _session: Session,
    job_id: String,
) -> Result<Json<ApiResponse<Vec<TimelineEntry>>>, ApiError> {
    let job = find_job(db, &job_id).await?;
    Ok(Json(ApiResponse::success(job.timeline())))
}
