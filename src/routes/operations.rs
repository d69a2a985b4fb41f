use log::info;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use mongodb::bson::{doc, oid::ObjectId, to_bson, to_document, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, UpdateOptions};

use crate::db::{self, DbConn, COMPANY_DETAILS, JOBS, PERSON_DETAILS};
use crate::guards::Session;
use crate::models::{
    CompanyCredential, CompanyDetails, CompanyDetailsResponse, CompanyFields, CreateJobDto,
    EngagementLetterDto, Feature, Job, JobResponse, JobStatus, KycDocument, KycDocumentsDto,
    PersonCredential, PersonDetail, PersonDetailResponse, PersonDetailsDto, PersonType, Section,
};
use crate::routes::job::{apply_transition, create_from_intake, find_job};
use crate::services::{workflow, ClientService, Transition};
use crate::utils::{is_blank, parse_object_id, ApiError, ApiResponse};

fn parse_person_type(raw: &str) -> Result<PersonType, ApiError> {
    PersonType::parse(raw).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Unknown person type '{}'. Use director, shareholder, secretary or sef",
            raw
        ))
    })
}

fn encode_fields<T: serde::Serialize>(fields: &T) -> Result<Document, ApiError> {
    to_document(fields).map_err(|e| ApiError::internal_error(format!("Failed to encode details: {}", e)))
}

async fn job_in_operations(db: &DbConn, job_id: &str) -> Result<Job, ApiError> {
    let job = find_job(db, job_id).await?;
    workflow::ensure_in_operations(&job)?;
    Ok(job)
}

async fn load_company(db: &DbConn, job_id: ObjectId) -> Result<Option<CompanyDetails>, ApiError> {
    db.collection::<CompanyDetails>(COMPANY_DETAILS)
        .find_one(doc! { "jobId": job_id }, None)
        .await
        .map_err(ApiError::database)
}

async fn save_company(
    db: &DbConn,
    job_id: ObjectId,
    fields: &CompanyFields,
    actor: ObjectId,
) -> Result<CompanyDetails, ApiError> {
    let mut set = encode_fields(fields)?;
    set.insert("updatedBy", actor);
    set.insert("updatedAt", DateTime::now());

    db.collection::<CompanyDetails>(COMPANY_DETAILS)
        .update_one(
            doc! { "jobId": job_id },
            doc! { "$set": set },
            UpdateOptions::builder().upsert(true).build(),
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to save company details: {}", e)))?;

    load_company(db, job_id)
        .await?
        .ok_or_else(|| ApiError::internal_error("Company details vanished after save"))
}

/// Earlier records of `person_type` on the job that are not in `keep`.
fn superseded_persons(job_id: ObjectId, person_type: PersonType, keep: &[ObjectId]) -> Document {
    doc! {
        "jobId": job_id,
        "personType": person_type.as_str(),
        "_id": { "$nin": keep.to_vec() },
    }
}

async fn load_persons(
    db: &DbConn,
    job_id: ObjectId,
    person_type: PersonType,
) -> Result<Vec<PersonDetail>, ApiError> {
    let cursor = db
        .collection::<PersonDetail>(PERSON_DETAILS)
        .find(
            doc! { "jobId": job_id, "personType": person_type.as_str() },
            FindOptions::builder().sort(doc! { "_id": 1 }).build(),
        )
        .await
        .map_err(ApiError::database)?;

    db::collect(cursor).await
}

// ============================================================================
// PRE-APPROVED INTAKE
// ============================================================================

#[openapi(tag = "Operations")]
#[post("/operations/pre-approved-job", data = "<dto>")]
pub async fn create_pre_approved_job(
    db: &State<DbConn>,
    session: Session,
    dto: Json<CreateJobDto>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session.require(Feature::OperationManagement)?;

    let job = create_from_intake(db, &session, &dto, true).await?;
    Ok(Json(ApiResponse::success_with_message("Pre-approved job created", job.into())))
}

// ============================================================================
// COMPANY DETAILS
// ============================================================================

#[openapi(tag = "Operations")]
#[get("/operations/jobs/<job_id>/company-details")]
pub async fn get_company_details(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
) -> Result<Json<ApiResponse<Option<CompanyDetailsResponse>>>, ApiError> {
    session.require_view(Section::CompanyDetails)?;

    let job_id = parse_object_id(&job_id, "job")?;
    let details = load_company(db, job_id).await?;

    Ok(Json(ApiResponse::success(details.map(Into::into))))
}

#[openapi(tag = "Operations")]
#[put("/operations/jobs/<job_id>/company-details", data = "<dto>")]
pub async fn update_company_details(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    dto: Json<CompanyFields>,
) -> Result<Json<ApiResponse<CompanyDetailsResponse>>, ApiError> {
    session.require(Feature::OperationManagement)?;
    session.require_edit(Section::CompanyDetails)?;

    if is_blank(&dto.company_name) {
        return Err(ApiError::bad_request("Company name is required"));
    }

    let job = job_in_operations(db, &job_id).await?;
    let job_id = job.id.ok_or_else(|| ApiError::internal_error("Job has no id"))?;

    let mut fields = dto.into_inner();
    fields.company_name = fields.company_name.trim().to_string();
    let saved = save_company(db, job_id, &fields, session.user_id).await?;

    Ok(Json(ApiResponse::success_with_message("Company details saved", saved.into())))
}

#[openapi(tag = "Operations")]
#[put("/operations/jobs/<job_id>/company-details/renew/<credential>")]
pub async fn renew_company_credential(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    credential: String,
) -> Result<Json<ApiResponse<CompanyDetailsResponse>>, ApiError> {
    session.require(Feature::OperationManagement)?;
    session.require_edit(Section::CompanyDetails)?;

    let credential = CompanyCredential::parse(&credential)
        .ok_or_else(|| ApiError::bad_request("Unknown credential. Use license or establishmentCard"))?;

    let job = job_in_operations(db, &job_id).await?;
    let job_id = job.id.ok_or_else(|| ApiError::internal_error("Job has no id"))?;

    let mut details = load_company(db, job_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Company details not found"))?;

    let renewed = details
        .fields
        .renew(credential)
        .ok_or_else(|| ApiError::bad_request("No expiry date set for this credential"))?;

    let saved = save_company(db, job_id, &details.fields, session.user_id).await?;
    info!("Job {} company {:?} renewed to {}", job_id, credential, renewed);

    Ok(Json(ApiResponse::success_with_message(
        format!("Renewed until {}", renewed),
        saved.into(),
    )))
}

// ============================================================================
// PERSON DETAILS
// ============================================================================

#[openapi(tag = "Operations")]
#[get("/operations/jobs/<job_id>/person-details/<person_type>")]
pub async fn get_person_details(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    person_type: String,
) -> Result<Json<ApiResponse<Vec<PersonDetailResponse>>>, ApiError> {
    let person_type = parse_person_type(&person_type)?;
    session.require_view(person_type.section())?;

    let job_id = parse_object_id(&job_id, "job")?;
    let persons = load_persons(db, job_id, person_type).await?;

    Ok(Json(ApiResponse::success(persons.into_iter().map(Into::into).collect())))
}

/// Replaces every record of `person_type` on the job.
#[openapi(tag = "Operations")]
#[put("/operations/jobs/<job_id>/person-details/<person_type>", data = "<dto>")]
pub async fn update_person_details(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    person_type: String,
    dto: Json<PersonDetailsDto>,
) -> Result<Json<ApiResponse<Vec<PersonDetailResponse>>>, ApiError> {
    let person_type = parse_person_type(&person_type)?;
    session.require(Feature::OperationManagement)?;
    session.require_edit(person_type.section())?;

    if let Some(position) = dto.persons.iter().position(|p| is_blank(&p.name)) {
        return Err(ApiError::bad_request(format!(
            "Name is required for {} #{}",
            person_type.as_str(),
            position + 1
        )));
    }

    let job = job_in_operations(db, &job_id).await?;
    let job_id = job.id.ok_or_else(|| ApiError::internal_error("Job has no id"))?;

    let now = DateTime::now();
    let records: Vec<PersonDetail> = dto
        .into_inner()
        .persons
        .into_iter()
        .map(|mut fields| {
            fields.name = fields.name.trim().to_string();
            PersonDetail {
                id: Some(ObjectId::new()),
                job_id,
                person_type,
                fields,
                updated_by: Some(session.user_id),
                updated_at: now,
            }
        })
        .collect();

    let keep: Vec<ObjectId> = records.iter().filter_map(|p| p.id).collect();

    // New set first: a failed insert leaves the previous records in place.
    let collection = db.collection::<PersonDetail>(PERSON_DETAILS);
    if !records.is_empty() {
        collection
            .insert_many(&records, None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Failed to save person details: {}", e)))?;
    }

    collection
        .delete_many(superseded_persons(job_id, person_type, &keep), None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to replace person details: {}", e)))?;

    let persons = load_persons(db, job_id, person_type).await?;
    Ok(Json(ApiResponse::success_with_message(
        format!("{} {} record(s) saved", persons.len(), person_type.as_str()),
        persons.into_iter().map(Into::into).collect(),
    )))
}

#[openapi(tag = "Operations")]
#[put("/operations/jobs/<job_id>/person-details/<person_type>/<person_id>/renew/<credential>")]
pub async fn renew_person_credential(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    person_type: String,
    person_id: String,
    credential: String,
) -> Result<Json<ApiResponse<PersonDetailResponse>>, ApiError> {
    let person_type = parse_person_type(&person_type)?;
    session.require(Feature::OperationManagement)?;
    session.require_edit(person_type.section())?;

    let credential = PersonCredential::parse(&credential)
        .ok_or_else(|| ApiError::bad_request("Unknown credential. Use passport, emiratesId or visa"))?;
    let person_id = parse_object_id(&person_id, "person")?;

    let job = job_in_operations(db, &job_id).await?;
    let job_id = job.id.ok_or_else(|| ApiError::internal_error("Job has no id"))?;

    let filter = doc! { "_id": person_id, "jobId": job_id, "personType": person_type.as_str() };
    let collection = db.collection::<PersonDetail>(PERSON_DETAILS);

    let mut person = collection
        .find_one(filter.clone(), None)
        .await
        .map_err(ApiError::database)?
        .ok_or_else(|| ApiError::not_found("Person not found"))?;

    let renewed = person
        .fields
        .renew(credential)
        .ok_or_else(|| ApiError::bad_request("No expiry date set for this credential"))?;

    let mut set = encode_fields(&person.fields)?;
    set.insert("updatedBy", session.user_id);
    set.insert("updatedAt", DateTime::now());

    let updated = collection
        .find_one_and_update(
            filter,
            doc! { "$set": set },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to renew: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Person not found"))?;

    Ok(Json(ApiResponse::success_with_message(
        format!("Renewed until {}", renewed),
        updated.into(),
    )))
}

// ============================================================================
// KYC DOCUMENTS & ENGAGEMENT LETTER
// ============================================================================

#[openapi(tag = "Operations")]
#[get("/operations/jobs/<job_id>/kyc-documents")]
pub async fn get_kyc_documents(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
) -> Result<Json<ApiResponse<Vec<KycDocument>>>, ApiError> {
    session.require_view(Section::KycDocuments)?;

    let job = find_job(db, &job_id).await?;
    Ok(Json(ApiResponse::success(job.kyc_documents)))
}

#[openapi(tag = "Operations")]
#[put("/operations/jobs/<job_id>/kyc-documents", data = "<dto>")]
pub async fn update_kyc_documents(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    dto: Json<KycDocumentsDto>,
) -> Result<Json<ApiResponse<Vec<KycDocument>>>, ApiError> {
    session.require(Feature::OperationManagement)?;
    session.require_edit(Section::KycDocuments)?;

    if dto.documents.iter().any(|d| is_blank(&d.label) || is_blank(&d.url)) {
        return Err(ApiError::bad_request("Every KYC document needs a label and a URL"));
    }

    let job = job_in_operations(db, &job_id).await?;

    let documents: Vec<KycDocument> = dto
        .into_inner()
        .documents
        .into_iter()
        .map(|d| KycDocument {
            label: d.label.trim().to_string(),
            url: d.url.trim().to_string(),
        })
        .collect();
    let encoded = to_bson(&documents)
        .map_err(|e| ApiError::internal_error(format!("Failed to encode documents: {}", e)))?;

    let result = db
        .collection::<Job>(JOBS)
        .update_one(
            doc! { "_id": job.id, "status": JobStatus::Approved.as_str() },
            doc! { "$set": { "kycDocuments": encoded, "updatedAt": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update job: {}", e)))?;

    if result.matched_count == 0 {
        return Err(ApiError::conflict("Job is no longer approved"));
    }

    Ok(Json(ApiResponse::success_with_message("KYC documents saved", documents)))
}

#[openapi(tag = "Operations")]
#[put("/operations/jobs/<job_id>/engagement-letter", data = "<dto>")]
pub async fn upload_engagement_letter(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
    dto: Json<EngagementLetterDto>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session.require(Feature::OperationManagement)?;
    session.require_edit(Section::EngagementLetter)?;

    let url = dto.url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("Engagement letter URL is required"));
    }

    let job = job_in_operations(db, &job_id).await?;

    let updated = db
        .collection::<Job>(JOBS)
        .find_one_and_update(
            doc! { "_id": job.id, "status": JobStatus::Approved.as_str() },
            doc! { "$set": { "engagementLetter": url, "updatedAt": DateTime::now() } },
            FindOneAndUpdateOptions::builder()
                .return_document(ReturnDocument::After)
                .build(),
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update job: {}", e)))?
        .ok_or_else(|| ApiError::conflict("Job is no longer approved"))?;

    Ok(Json(ApiResponse::success_with_message("Engagement letter attached", updated.into())))
}

#[openapi(tag = "Operations")]
#[put("/operations/jobs/<job_id>/complete")]
pub async fn complete_job(
    db: &State<DbConn>,
    session: Session,
    job_id: String,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    session.require(Feature::OperationManagement)?;

    let job = find_job(db, &job_id).await?;
    let transition = Transition::new(&job, JobStatus::Completed, Some(session.user_id), None)?;
    let updated = apply_transition(db, &job, transition).await?;

    ClientService::record_completed_job(db, &updated).await;

    Ok(Json(ApiResponse::success_with_message("Job completed", updated.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_only_removes_records_outside_the_new_set() {
        let job_id = ObjectId::new();
        let kept = ObjectId::new();
        let filter = superseded_persons(job_id, PersonType::Director, &[kept]);

        assert_eq!(filter.get_object_id("jobId").unwrap(), job_id);
        assert_eq!(filter.get_str("personType").unwrap(), "director");
        let excluded = filter.get_document("_id").unwrap().get_array("$nin").unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].as_object_id(), Some(kept));
    }

    #[test]
    fn clearing_a_type_removes_every_record_of_it() {
        let filter = superseded_persons(ObjectId::new(), PersonType::Sef, &[]);
        let excluded = filter.get_document("_id").unwrap().get_array("$nin").unwrap();
        assert!(excluded.is_empty());
        assert_eq!(filter.get_str("personType").unwrap(), "sef");
    }
}
