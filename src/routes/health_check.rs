use actix_web::{HttpRequest, HttpResponse, Responder};

/// Used by the host platform to know whether the service is up
#[tracing::instrument(name = "Health Check handler")]
pub async fn health_check(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok()
}
