//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // Client authentication at the token endpoint
            let basic = HttpBuilder::new()
                .scheme(HttpAuthScheme::Basic)
                .description(Some("Client key as user name, client secret as password."))
                .build();
            components.add_security_scheme("ClientBasic", SecurityScheme::Http(basic));

            let oauth2 = OAuth2::new([utoipa::openapi::security::Flow::AuthorizationCode(
                utoipa::openapi::security::AuthorizationCode::new(
                    "/authorize",
                    "/token",
                    Scopes::from_iter([
                        ("public", "Public profile data"),
                        ("read", "Read access to the user's data"),
                        ("read_write", "Read and write access to the user's data"),
                    ]),
                ),
            )]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Space Identity API",
        version = "1.0.0",
        description = "OAuth 2.0 authorization server and identity provider."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 and first-party session endpoints")
    )
)]
pub struct ApiDoc;
