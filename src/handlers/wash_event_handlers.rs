use actix_web::{HttpResponse, get, post, web};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    AuthenticatedUser, CreateWashEventRequest, TransitionReasonRequest, WashEventFilter,
    WashEventTransition,
};
use crate::services::wash_event_service::WashEventService;

#[post("")]
pub async fn create_wash_event(
    user: AuthenticatedUser,
    service: web::Data<WashEventService>,
    request: web::Json<CreateWashEventRequest>,
) -> Result<HttpResponse, AppError> {
    let event = service.create(&user, &request).await?;
    Ok(HttpResponse::Created().json(event))
}

#[get("")]
pub async fn list_wash_events(
    user: AuthenticatedUser,
    service: web::Data<WashEventService>,
    query: web::Query<WashEventFilter>,
) -> Result<HttpResponse, AppError> {
    let response = service.list(&user, &query).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[get("/{id}")]
pub async fn get_wash_event(
    user: AuthenticatedUser,
    service: web::Data<WashEventService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let event = service.get(&user, &path).await?;
    Ok(HttpResponse::Ok().json(event))
}

async fn apply_transition(
    user: &AuthenticatedUser,
    service: &WashEventService,
    id: &Uuid,
    transition: WashEventTransition,
    reason: Option<&str>,
) -> Result<HttpResponse, AppError> {
    let event = service.transition(user, id, transition, reason).await?;
    Ok(HttpResponse::Ok().json(event))
}

#[post("/{id}/authorize")]
pub async fn authorize_wash_event(
    user: AuthenticatedUser,
    service: web::Data<WashEventService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    apply_transition(&user, &service, &path, WashEventTransition::Authorize, None).await
}

#[post("/{id}/start")]
pub async fn start_wash_event(
    user: AuthenticatedUser,
    service: web::Data<WashEventService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    apply_transition(&user, &service, &path, WashEventTransition::Start, None).await
}

#[post("/{id}/complete")]
pub async fn complete_wash_event(
    user: AuthenticatedUser,
    service: web::Data<WashEventService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    apply_transition(&user, &service, &path, WashEventTransition::Complete, None).await
}

#[post("/{id}/reject")]
pub async fn reject_wash_event(
    user: AuthenticatedUser,
    service: web::Data<WashEventService>,
    path: web::Path<Uuid>,
    body: web::Json<TransitionReasonRequest>,
) -> Result<HttpResponse, AppError> {
    apply_transition(&user, &service, &path, WashEventTransition::Reject, Some(&body.reason)).await
}

#[post("/{id}/lock")]
pub async fn lock_wash_event(
    user: AuthenticatedUser,
    service: web::Data<WashEventService>,
    path: web::Path<Uuid>,
    body: web::Json<TransitionReasonRequest>,
) -> Result<HttpResponse, AppError> {
    apply_transition(&user, &service, &path, WashEventTransition::Lock, Some(&body.reason)).await
}
