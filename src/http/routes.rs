use std::sync::Arc;

use actix::Addr;
use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::actors::{GetSystemHealth, HealthMonitorActor};
use crate::metrics::Metrics;
use crate::persistence::StoreError;
use crate::service::OrderService;

/// Shared state handed to every worker
pub struct AppState {
    pub service: Arc<OrderService>,
    pub metrics: Arc<Metrics>,
    pub health: Option<Addr<HealthMonitorActor>>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/order/{order_uid}", web::get().to(get_order))
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

async fn get_order(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let order_uid = path.into_inner();
    let order_uid = order_uid.trim();

    if order_uid.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "order_uid is required" }));
    }

    match state.service.get_by_uid(order_uid).await {
        Ok(order) => HttpResponse::Ok().json(order),
        Err(StoreError::NotFound(_)) => {
            HttpResponse::NotFound().json(json!({ "error": "Order not found" }))
        }
        Err(e) => {
            tracing::error!(order_uid = %order_uid, error = %e, "Failed to load order");
            HttpResponse::InternalServerError().json(json!({ "error": "Internal server error" }))
        }
    }
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    let Some(health) = &state.health else {
        return HttpResponse::Ok().json(json!({ "status": "healthy", "components": {} }));
    };

    let system = match health.send(GetSystemHealth).await {
        Ok(system) => system,
        Err(e) => {
            tracing::error!(error = %e, "Health monitor unreachable");
            return HttpResponse::ServiceUnavailable()
                .json(json!({ "status": "unhealthy", "reason": "health monitor unavailable" }));
        }
    };

    let components: serde_json::Map<String, serde_json::Value> = system
        .components
        .iter()
        .map(|(name, component)| {
            (
                name.clone(),
                json!({
                    "status": component.status.label(),
                    "reason": component.status.reason(),
                    "details": component.details,
                    "last_check": component.last_check.to_rfc3339(),
                }),
            )
        })
        .collect();

    let body = json!({
        "status": system.overall_status.label(),
        "reason": system.overall_status.reason(),
        "components": components,
        "check_time": system.check_time.to_rfc3339(),
    });

    if system.overall_status.is_unhealthy() {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    match state.metrics.encode_text() {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
