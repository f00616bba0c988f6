use actix_web::{get, web, HttpResponse};

use crate::services::Pipeline;

#[get("")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().finish()
}

#[get("/ml-circuit")]
async fn ml_circuit(pipeline: web::Data<Pipeline>) -> HttpResponse {
    match pipeline.ml_breaker_snapshot() {
        Some(snapshot) => HttpResponse::Ok().json(snapshot),
        None => HttpResponse::NotFound().body("ML classification is not configured"),
    }
}
