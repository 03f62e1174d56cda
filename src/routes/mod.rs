/// Router Module Index
///
/// Routes are grouped by how the caller is authenticated. The credential is
/// checked by each handler's first extractor.

/// Unauthenticated routes: health check and the OpenAPI document.
pub mod public;

/// Company and contact CRUD, guarded by an API key.
pub mod integration;

/// Account endpoints, guarded by a session token. Role checks happen in
/// the handlers.
pub mod authenticated;
