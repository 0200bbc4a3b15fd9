use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use shared::{AssessmentRequest, CadreReviewRequest, DoctorConsultationRequest, ErrorResponse};
use uuid::Uuid;

use crate::cases::{ImageUpload, LifecycleError, LifecycleManager};
use crate::queue::{QueueFilter, ReviewQueue};
use crate::risk::{AssessmentError, normalize_region};

const MAX_TEXT_FIELD_BYTES: usize = 4 * 1024;

/// Static facts reported by the health endpoint.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub classifier_endpoint: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store_backend: &'static str,
    catalog_size: usize,
    classifier_endpoint: String,
}

#[derive(Deserialize)]
struct QueueQuery {
    risk_tier: Option<String>,
}

impl ResponseError for LifecycleError {
    fn status_code(&self) -> StatusCode {
        match self {
            LifecycleError::Validation { .. } => StatusCode::BAD_REQUEST,
            LifecycleError::CaseNotFound { .. } => StatusCode::NOT_FOUND,
            LifecycleError::InvalidState { .. }
            | LifecycleError::AlreadyClaimed { .. }
            | LifecycleError::AlreadyConsulted { .. } => StatusCode::CONFLICT,
            LifecycleError::Assessment(AssessmentError::UnknownLabel(_))
            | LifecycleError::Assessment(AssessmentError::InvalidScore(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LifecycleError::Classifier(_) => StatusCode::BAD_GATEWAY,
            LifecycleError::ClassifierTimeout => StatusCode::GATEWAY_TIMEOUT,
            LifecycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
            case_id: self.case_id(),
            status: self.status(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        LifecycleError::validation(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        LifecycleError::validation(err.to_string()).into()
    }))
    .service(
        web::scope("/api")
            .service(web::resource("/health").route(web::get().to(health)))
            .service(web::resource("/assessments").route(web::post().to(preview_assessment)))
            .service(web::resource("/cases").route(web::post().to(create_case)))
            .service(web::resource("/cases/{case_id}").route(web::get().to(get_case)))
            .service(
                web::resource("/cases/{case_id}/cadre-review")
                    .route(web::post().to(submit_cadre_review)),
            )
            .service(
                web::resource("/cases/{case_id}/doctor-consultation")
                    .route(web::post().to(submit_doctor_consultation)),
            )
            .service(
                web::resource("/patients/{patient_id}/history")
                    .route(web::get().to(patient_history)),
            )
            .service(web::resource("/queue/cadre").route(web::get().to(cadre_queue)))
            .service(web::resource("/queue/doctor").route(web::get().to(doctor_queue)))
            .service(web::resource("/queue/summary").route(web::get().to(queue_summary))),
    );
}

fn parse_case_id(raw: &str) -> Result<Uuid, LifecycleError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| LifecycleError::validation(format!("Invalid case id '{}'", raw)))
}

async fn health(
    lifecycle: web::Data<LifecycleManager>,
    info: web::Data<ServiceInfo>,
) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        store_backend: lifecycle.store().backend_name(),
        catalog_size: lifecycle.engine().catalog().len(),
        classifier_endpoint: info.classifier_endpoint.clone(),
    })
}

async fn preview_assessment(
    lifecycle: web::Data<LifecycleManager>,
    request: web::Json<AssessmentRequest>,
) -> Result<HttpResponse, LifecycleError> {
    let region = normalize_region(request.body_region.as_deref());
    let assessment = lifecycle
        .engine()
        .assess(&request.label, request.confidence, region.as_deref())?;
    Ok(HttpResponse::Ok().json(assessment))
}

async fn create_case(
    lifecycle: web::Data<LifecycleManager>,
    mut payload: Multipart,
) -> Result<HttpResponse, LifecycleError> {
    let mut patient_id: Option<String> = None;
    let mut body_region: Option<String> = None;
    let mut upload: Option<ImageUpload> = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| LifecycleError::validation(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let mime_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string());
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let limit = if name == "image" {
            lifecycle.max_image_bytes()
        } else {
            MAX_TEXT_FIELD_BYTES
        };
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| LifecycleError::validation(format!("Failed to read upload: {}", e)))?;
            if data.len() + chunk.len() > limit {
                warn!("Multipart field '{}' exceeds {} bytes", name, limit);
                return Err(LifecycleError::validation(format!(
                    "Field '{}' exceeds the {} byte limit",
                    name, limit
                )));
            }
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "patient_id" => patient_id = Some(text_field("patient_id", data)?),
            "body_region" => body_region = Some(text_field("body_region", data)?),
            "image" => {
                upload = Some(ImageUpload::new(
                    data,
                    mime_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                    file_name,
                ))
            }
            other => warn!("Ignoring unexpected multipart field '{}'", other),
        }
    }

    let patient_id = patient_id
        .ok_or_else(|| LifecycleError::validation("patient_id is required".to_string()))?;
    let upload =
        upload.ok_or_else(|| LifecycleError::validation("image is required".to_string()))?;

    let case = lifecycle
        .create_case(&patient_id, body_region.as_deref(), upload)
        .await?;
    Ok(HttpResponse::Created().json(case))
}

fn text_field(name: &str, data: Vec<u8>) -> Result<String, LifecycleError> {
    String::from_utf8(data)
        .map_err(|_| LifecycleError::validation(format!("{} must be UTF-8 text", name)))
}

async fn get_case(
    lifecycle: web::Data<LifecycleManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, LifecycleError> {
    let case_id = parse_case_id(&path.into_inner())?;
    let case = lifecycle.get_case(case_id).await?;
    info!("Retrieved case: {}", case_id);
    Ok(HttpResponse::Ok().json(case))
}

async fn submit_cadre_review(
    lifecycle: web::Data<LifecycleManager>,
    path: web::Path<String>,
    request: web::Json<CadreReviewRequest>,
) -> Result<HttpResponse, LifecycleError> {
    let case_id = parse_case_id(&path.into_inner())?;
    let case = lifecycle
        .submit_cadre_review(case_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(case))
}

async fn submit_doctor_consultation(
    lifecycle: web::Data<LifecycleManager>,
    path: web::Path<String>,
    request: web::Json<DoctorConsultationRequest>,
) -> Result<HttpResponse, LifecycleError> {
    let case_id = parse_case_id(&path.into_inner())?;
    let case = lifecycle
        .submit_doctor_consultation(case_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(case))
}

async fn patient_history(
    lifecycle: web::Data<LifecycleManager>,
    path: web::Path<String>,
) -> Result<HttpResponse, LifecycleError> {
    let cases = lifecycle.patient_history(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(cases))
}

async fn cadre_queue(
    queue: web::Data<ReviewQueue>,
    query: web::Query<QueueQuery>,
) -> Result<HttpResponse, LifecycleError> {
    let filter = QueueFilter::parse(query.risk_tier.as_deref())?;
    let cases = queue.cadre_queue(&filter).await.inspect_err(|e| {
        error!("Failed to load cadre queue: {}", e);
    })?;
    Ok(HttpResponse::Ok().json(cases))
}

async fn doctor_queue(
    queue: web::Data<ReviewQueue>,
    query: web::Query<QueueQuery>,
) -> Result<HttpResponse, LifecycleError> {
    let filter = QueueFilter::parse(query.risk_tier.as_deref())?;
    let cases = queue.doctor_queue(&filter).await.inspect_err(|e| {
        error!("Failed to load doctor queue: {}", e);
    })?;
    Ok(HttpResponse::Ok().json(cases))
}

async fn queue_summary(queue: web::Data<ReviewQueue>) -> Result<HttpResponse, LifecycleError> {
    let summary = queue.summary().await.inspect_err(|e| {
        error!("Failed to load queue summary: {}", e);
    })?;
    Ok(HttpResponse::Ok().json(summary))
}
