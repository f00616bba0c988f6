use std::time::Duration;

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::services::{ClassifyError, Pipeline};

const RETRY_AFTER_SECS: &str = "1";

#[derive(Deserialize)]
struct ClassifyBody {
    name: String,
    description: Option<String>,
    website_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

#[post("/classify")]
async fn classify(body: web::Json<ClassifyBody>, pipeline: web::Data<Pipeline>) -> HttpResponse {
    let body = body.into_inner();

    match pipeline
        .classify_request(
            &body.name,
            body.description.as_deref(),
            body.website_url.as_deref(),
            body.timeout_ms.map(Duration::from_millis),
        )
        .await
    {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => {
            log::warn!("Classification of {:?} refused. Error: {}", body.name, e);
            let error = ErrorBody {
                error: e.to_string(),
                retryable: e.is_retryable(),
            };
            match e {
                ClassifyError::InvalidInput(_) => HttpResponse::BadRequest().json(error),
                ClassifyError::Overloaded(_) => HttpResponse::ServiceUnavailable()
                    .insert_header(("Retry-After", RETRY_AFTER_SECS))
                    .json(error),
                ClassifyError::DeadlineExhausted => HttpResponse::GatewayTimeout().json(error),
            }
        }
    }
}
