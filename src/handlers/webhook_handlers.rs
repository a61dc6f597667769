use actix_web::{HttpRequest, HttpResponse, post, web};
use log::{info, warn};
use serde_json::json;

use crate::error::AppError;
use crate::services::stripe_webhook::StripeWebhookService;

#[post("/stripe")]
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    webhook_service: web::Data<StripeWebhookService>,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    let payload = std::str::from_utf8(&body)
        .map_err(|_| AppError::BadRequest("Webhook payload is not valid UTF-8".to_string()))?;

    if let Err(e) = webhook_service.handle(payload, signature).await {
        warn!("Stripe webhook rejected: {}", e);
        return Err(e);
    }

    info!("Stripe webhook processed");
    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}
