use crate::{
    AppState,
    handlers::{companies, contacts},
};
use axum::{Router, routing::get};

/// Integration Router Module
///
/// The CRUD surface used by internal services. Every handler here takes
/// `ApiClient` as its first extractor, so an unauthenticated call is rejected
/// before the path, body or repository are touched.
pub fn integration_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /api/companies
        .route(
            "/api/companies",
            get(companies::list_companies).post(companies::create_company),
        )
        // GET/PATCH/DELETE /api/companies/{id}
        // Deletion is soft: the row keeps existing with `deleted_at` set.
        .route(
            "/api/companies/{id}",
            get(companies::get_company)
                .patch(companies::update_company)
                .delete(companies::delete_company),
        )
        // GET/POST /api/contacts
        .route(
            "/api/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        // GET/PATCH/DELETE /api/contacts/{id}
        .route(
            "/api/contacts/{id}",
            get(contacts::get_contact)
                .patch(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
}
