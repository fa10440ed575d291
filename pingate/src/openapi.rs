//! OpenAPI document for the gateway, served at `/openapi.json` and rendered at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::{api, types};

/// Declares the `x-api-key` header scheme referenced by the handlers.
struct ApiKeySecurityAddon;

impl Modify for ApiKeySecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "ApiKeyAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    crate::auth::API_KEY_HEADER,
                    "One of the keys listed in `auth.api_keys`.",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "pingate",
        description = "Upload files to an IPFS node, keep them pinned and download them by content identifier."
    ),
    modifiers(&ApiKeySecurityAddon),
    paths(
        api::handlers::upload::upload_file,
        api::handlers::upload::upload_multiple,
        api::handlers::files::get_file,
    ),
    components(schemas(
        types::Cid,
        types::UploadResult,
        types::BatchItem,
        api::models::upload::UploadForm,
        api::models::upload::UploadMultipleForm,
        api::models::upload::ErrorResponse,
        api::models::upload::InvalidFileTypeResponse,
        api::models::upload::InvalidFilesResponse,
    )),
    tags(
        (name = "uploads", description = "Store and pin files."),
        (name = "files", description = "Retrieve stored files."),
    )
)]
pub struct ApiDoc;
