use actix_web::{HttpResponse, get, post, web};

use crate::error::AppError;
use crate::models::{
    AuthenticatedUser, CreateDriverRequest, CreateLocationRequest, CreatePartnerCompanyRequest,
    CreateServicePackageRequest,
};
use crate::services::catalog_service::CatalogService;

#[get("/locations")]
pub async fn list_locations(
    user: AuthenticatedUser,
    catalog: web::Data<CatalogService>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(catalog.list_locations(&user).await?))
}

#[post("/locations")]
pub async fn create_location(
    user: AuthenticatedUser,
    catalog: web::Data<CatalogService>,
    request: web::Json<CreateLocationRequest>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Created().json(catalog.create_location(&user, &request).await?))
}

#[get("/service-packages")]
pub async fn list_service_packages(
    user: AuthenticatedUser,
    catalog: web::Data<CatalogService>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(catalog.list_service_packages(&user).await?))
}

#[post("/service-packages")]
pub async fn create_service_package(
    user: AuthenticatedUser,
    catalog: web::Data<CatalogService>,
    request: web::Json<CreateServicePackageRequest>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Created().json(catalog.create_service_package(&user, &request).await?))
}

#[get("/partner-companies")]
pub async fn list_partner_companies(
    user: AuthenticatedUser,
    catalog: web::Data<CatalogService>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(catalog.list_partner_companies(&user).await?))
}

#[post("/partner-companies")]
pub async fn create_partner_company(
    user: AuthenticatedUser,
    catalog: web::Data<CatalogService>,
    request: web::Json<CreatePartnerCompanyRequest>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Created().json(catalog.create_partner_company(&user, &request).await?))
}

#[get("/drivers")]
pub async fn list_drivers(
    user: AuthenticatedUser,
    catalog: web::Data<CatalogService>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(catalog.list_drivers(&user).await?))
}

#[post("/drivers")]
pub async fn create_driver(
    user: AuthenticatedUser,
    catalog: web::Data<CatalogService>,
    request: web::Json<CreateDriverRequest>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Created().json(catalog.create_driver(&user, &request).await?))
}
