use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use clientele_core::{Caller, Customer, CustomerDraft, CustomerPatch, HealthReport, HealthStatus};
use clientele_discovery::{LifecycleState, LOGIN_SERVICE, ORDER_SERVICE};

use crate::auth::auth_middleware;
use crate::config::VERSION;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        readiness_check,
        liveness_check,
        create_customer,
        find_customer_by_id,
        update_customer,
        delete_customer,
        list_customers,
        customer_by_email,
        customer_orders,
        available_services,
    ),
    components(schemas(
        Customer,
        CustomerDraft,
        CustomerPatch,
        CreateCustomerResponse,
        CustomerSummary,
        UpdateCustomerResponse,
        HealthReport,
        HealthStatus,
    ))
)]
pub struct ApiDoc;

#[derive(Deserialize, IntoParams)]
pub struct CustomerIdQuery {
    /// Customer document id
    customerid: String,
}

#[derive(Deserialize, IntoParams)]
pub struct Pagination {
    #[serde(default)]
    skip: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CustomerSummary {
    document: String,
    firstname: String,
    lastname: String,
    email: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateCustomerResponse {
    success: bool,
    message: String,
    customer: CustomerSummary,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerResponse {
    update_customer_valid: bool,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            state
                .settings
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok()),
        ))
        .allow_methods(Any)
        .allow_headers(Any);

    let customer = Router::new()
        .route("/createcustomer", post(create_customer))
        .route("/findcustomerbyid", get(find_customer_by_id))
        .route("/updatecustomer", put(update_customer))
        .route("/deletecustomer/:customerid", delete(delete_customer))
        .route("/customers", get(list_customers))
        .route("/customerbyemail/:email", get(customer_by_email))
        .route("/:customerid/orders", get(customer_orders));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(root))
        .route("/info", get(service_info))
        .route("/health", get(health_check))
        .route("/health/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/health/live", get(liveness_check))
        .route("/services/available", get(available_services))
        .nest("/customer", customer)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn record(op: &'static str, outcome: &'static str) {
    metrics::counter!("customer_operations_total", "op" => op, "outcome" => outcome).increment(1);
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": state.settings.service_name,
        "version": VERSION,
        "status": "running",
        "message": "User Service is running",
        "docs": "/swagger-ui",
        "health": "/health"
    }))
}

async fn service_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": state.settings.service_name,
        "version": VERSION,
        "description": "Customer Management Microservice",
        "database": "SQLite",
        "framework": "axum",
        "language": "Rust",
        "endpoints": {
            "create_customer": "POST /customer/createcustomer",
            "find_customer": "GET /customer/findcustomerbyid",
            "update_customer": "PUT /customer/updatecustomer",
            "delete_customer": "DELETE /customer/deletecustomer/{customerid}",
            "get_all_customers": "GET /customer/customers",
            "get_customer_by_email": "GET /customer/customerbyemail/{email}",
            "customer_orders": "GET /customer/{customerid}/orders",
            "health": "GET /health/health",
            "ready": "GET /health/ready",
            "live": "GET /health/live"
        }
    }))
}

/// Polled by the registry. Any non-200 counts as a failed check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = HealthReport))
)]
async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    Json(
        HealthReport::new(HealthStatus::Healthy, &state.settings.service_name, "User Service is running")
            .with_version(VERSION),
    )
}

#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Ready to accept requests", body = HealthReport),
        (status = 503, description = "Database or registration not ready")
    )
)]
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let name = &state.settings.service_name;
    if let Err(e) = state.store.ping() {
        tracing::warn!(error = %e, "service not ready, database check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReport::new(HealthStatus::Unhealthy, name, "Service not ready - database connection failed")),
        );
    }

    let lifecycle = state.lifecycle.state();
    if lifecycle != LifecycleState::Running {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(
                HealthReport::new(HealthStatus::Unhealthy, name, format!("Service not ready - lifecycle {lifecycle}"))
                    .with_database("connected"),
            ),
        );
    }

    (
        StatusCode::OK,
        Json(
            HealthReport::new(HealthStatus::Ready, name, "Service is ready to accept requests")
                .with_database("connected"),
        ),
    )
}

#[utoipa::path(
    get,
    path = "/health/live",
    responses((status = 200, description = "Process is alive", body = HealthReport))
)]
async fn liveness_check(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::new(
        HealthStatus::Alive,
        &state.settings.service_name,
        "Service is alive and running",
    ))
}

#[utoipa::path(
    post,
    path = "/customer/createcustomer",
    request_body = CustomerDraft,
    responses(
        (status = 200, description = "Customer created", body = CreateCustomerResponse),
        (status = 400, description = "Missing or invalid field"),
        (status = 409, description = "Document or email already registered")
    )
)]
async fn create_customer(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
    Json(draft): Json<CustomerDraft>,
) -> Result<Json<CreateCustomerResponse>, ApiError> {
    let by = caller.and_then(|Extension(c)| c.user_id);
    tracing::info!(document = %draft.document, by = ?by, "creating customer");
    let draft = draft.validate().inspect_err(|_| record("create", "invalid"))?;
    let customer = state.store.create(draft).inspect_err(|_| record("create", "error"))?;
    record("create", "ok");

    tracing::info!(document = %customer.document, "customer created");
    Ok(Json(CreateCustomerResponse {
        success: true,
        message: "Customer created successfully".to_string(),
        customer: CustomerSummary {
            document: customer.document,
            firstname: customer.firstname,
            lastname: customer.lastname,
            email: customer.email,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/customer/findcustomerbyid",
    params(CustomerIdQuery),
    responses(
        (status = 200, description = "Customer found", body = Customer),
        (status = 404, description = "Customer not found")
    )
)]
async fn find_customer_by_id(
    State(state): State<AppState>,
    Query(query): Query<CustomerIdQuery>,
) -> Result<Json<Customer>, ApiError> {
    state
        .store
        .find_by_id(&query.customerid)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Customer with ID {} not found", query.customerid)))
}

/// Applies a partial update, then tells the order service. A failed
/// notification never turns a committed update into an error.
#[utoipa::path(
    put,
    path = "/customer/updatecustomer",
    params(CustomerIdQuery),
    request_body = CustomerPatch,
    responses(
        (status = 200, description = "Update outcome", body = UpdateCustomerResponse),
        (status = 400, description = "Invalid field")
    )
)]
async fn update_customer(
    State(state): State<AppState>,
    Query(query): Query<CustomerIdQuery>,
    Json(patch): Json<CustomerPatch>,
) -> Result<Json<UpdateCustomerResponse>, ApiError> {
    let patch = patch.validate()?;
    if patch.is_empty() {
        let exists = state.store.find_by_id(&query.customerid)?.is_some();
        record("update", if exists { "unchanged" } else { "rejected" });
        return Ok(Json(UpdateCustomerResponse {
            update_customer_valid: exists,
        }));
    }

    let changed: Vec<&str> = [
        ("firstname", patch.firstname.is_some()),
        ("lastname", patch.lastname.is_some()),
        ("address", patch.address.is_some()),
        ("phone", patch.phone.is_some()),
        ("email", patch.email.is_some()),
    ]
    .into_iter()
    .filter_map(|(field, set)| set.then_some(field))
    .collect();

    let updated = match state.store.update(&query.customerid, patch) {
        Ok(customer) => customer,
        Err(e @ (clientele_core::StoreError::NotFound | clientele_core::StoreError::DuplicateEmail(_))) => {
            tracing::warn!(customerid = %query.customerid, error = %e, "customer not updated");
            record("update", "rejected");
            return Ok(Json(UpdateCustomerResponse {
                update_customer_valid: false,
            }));
        }
        Err(e) => {
            record("update", "error");
            return Err(e.into());
        }
    };
    record("update", "ok");

    state
        .services
        .notify_user_event(
            &updated.document,
            "user_updated",
            json!({ "email": updated.email, "fields": changed }),
        )
        .await;

    Ok(Json(UpdateCustomerResponse {
        update_customer_valid: true,
    }))
}

#[utoipa::path(
    delete,
    path = "/customer/deletecustomer/{customerid}",
    params(("customerid" = String, Path, description = "Customer document id")),
    responses(
        (status = 200, description = "Customer deleted"),
        (status = 404, description = "Customer not found")
    )
)]
async fn delete_customer(
    State(state): State<AppState>,
    Path(customerid): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.store.delete(&customerid)? {
        record("delete", "missing");
        return Err(ApiError::NotFound(format!("Customer with ID {customerid} not found")));
    }
    record("delete", "ok");

    state
        .services
        .notify_user_event(&customerid, "user_deleted", json!({}))
        .await;

    Ok(Json(json!({ "message": format!("Customer {customerid} deleted successfully") })))
}

#[utoipa::path(
    get,
    path = "/customer/customers",
    params(Pagination),
    responses((status = 200, description = "Page of customers", body = Vec<Customer>))
)]
async fn list_customers(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
) -> Json<Vec<Customer>> {
    match state.store.list(page.skip, page.limit) {
        Ok(customers) => {
            tracing::info!(count = customers.len(), skip = page.skip, limit = page.limit, "listed customers");
            Json(customers)
        }
        Err(e) => {
            tracing::error!(error = %e, "listing customers failed");
            Json(Vec::new())
        }
    }
}

#[utoipa::path(
    get,
    path = "/customer/customerbyemail/{email}",
    params(("email" = String, Path, description = "Customer email")),
    responses(
        (status = 200, description = "Customer found", body = Customer),
        (status = 404, description = "Customer not found")
    )
)]
async fn customer_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Customer>, ApiError> {
    let email = email.trim().to_lowercase();
    state
        .store
        .find_by_email(&email)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Customer with email {email} not found")))
}

#[utoipa::path(
    get,
    path = "/customer/{customerid}/orders",
    params(("customerid" = String, Path, description = "Customer document id")),
    responses(
        (status = 200, description = "Orders from the order service, empty when it is unreachable"),
        (status = 404, description = "Customer not found")
    )
)]
async fn customer_orders(
    State(state): State<AppState>,
    Path(customerid): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.store.find_by_id(&customerid)?.is_none() {
        return Err(ApiError::NotFound(format!("Customer with ID {customerid} not found")));
    }
    let orders = state.services.user_orders(&customerid).await;
    Ok(Json(json!({ "document": customerid, "orders": orders })))
}

#[utoipa::path(
    get,
    path = "/services/available",
    responses((status = 200, description = "Peers whose health probe passes"))
)]
async fn available_services(State(state): State<AppState>) -> Json<Value> {
    let available = state
        .services
        .available_services(&[LOGIN_SERVICE, ORDER_SERVICE])
        .await;
    Json(json!({ "available": available }))
}
