use actix_web::{HttpResponse, get, http::header, post, web};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{AuthenticatedUser, BillingPeriodRequest, GenerateInvoiceRequest, InvoiceFilter};
use crate::services::billing_service::BillingService;

#[post("/invoices/generate")]
pub async fn generate_invoice(
    user: AuthenticatedUser,
    billing_service: web::Data<BillingService>,
    request: web::Json<GenerateInvoiceRequest>,
) -> Result<HttpResponse, AppError> {
    let invoice = billing_service.generate_invoice(&user, &request).await?;
    Ok(HttpResponse::Created().json(invoice))
}

#[post("/periods/run")]
pub async fn run_billing_period(
    user: AuthenticatedUser,
    billing_service: web::Data<BillingService>,
    request: web::Json<BillingPeriodRequest>,
) -> Result<HttpResponse, AppError> {
    let response = billing_service.run_billing_period(&user, &request).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[get("/invoices")]
pub async fn list_invoices(
    user: AuthenticatedUser,
    billing_service: web::Data<BillingService>,
    query: web::Query<InvoiceFilter>,
) -> Result<HttpResponse, AppError> {
    let invoices = billing_service.list_invoices(&user, &query).await?;
    Ok(HttpResponse::Ok().json(invoices))
}

#[get("/invoices/{id}")]
pub async fn get_invoice(
    user: AuthenticatedUser,
    billing_service: web::Data<BillingService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let invoice = billing_service.get_invoice(&user, &path).await?;
    Ok(HttpResponse::Ok().json(invoice))
}

#[post("/invoices/{id}/issue")]
pub async fn issue_invoice(
    user: AuthenticatedUser,
    billing_service: web::Data<BillingService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let invoice = billing_service.issue_invoice(&user, &path).await?;
    Ok(HttpResponse::Ok().json(invoice))
}

#[post("/invoices/{id}/cancel")]
pub async fn cancel_invoice(
    user: AuthenticatedUser,
    billing_service: web::Data<BillingService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let invoice = billing_service.cancel_invoice(&user, &path).await?;
    Ok(HttpResponse::Ok().json(invoice))
}

#[get("/invoices/{id}/pdf")]
pub async fn get_invoice_pdf(
    user: AuthenticatedUser,
    billing_service: web::Data<BillingService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let (invoice, pdf) = billing_service.get_invoice_pdf(&user, &path).await?;
    let filename = invoice
        .invoice_number
        .as_deref()
        .unwrap_or("invoice")
        .replace(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '_', "_");

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.pdf\"", filename),
        ))
        .body(pdf))
}
