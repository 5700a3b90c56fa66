use super::handlers::{accounts, health, login, token_details};
use crate::credentials::API_KEY_HEADER;
use utoipa::{
    openapi::{
        security::{ApiKey, ApiKeyValue, SecurityScheme},
        Contact, InfoBuilder, License,
    },
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        accounts::account,
        accounts::transactions,
        accounts::trades,
        login::login,
        token_details::token_details,
    ),
    components(schemas(health::Health, login::LoginRequest, login::LoginResponse)),
    modifiers(&ApiKeySecurity),
    tags(
        (name = "health", description = "Gateway and credential status"),
        (name = "accounts", description = "Account data relayed from the upstream API"),
        (name = "auth", description = "Upstream session helpers")
    )
)]
struct ApiDoc;

struct ApiKeySecurity;

impl Modify for ApiKeySecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut openapi = ApiDoc::openapi();
    openapi.info = cargo_info();
    openapi
}

fn cargo_info() -> utoipa::openapi::Info {
    // Use Cargo.toml metadata instead of the utoipa crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.find('<') {
        Some(start) => (
            non_empty(author[..start].trim()),
            non_empty(author[start + 1..].trim_end_matches('>').trim()),
        ),
        None => (non_empty(author.trim()), None),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
