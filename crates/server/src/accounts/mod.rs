//! Creation and mutation of clients and users.
//!
//! Nothing here relies on persistence hooks: every constructor validates its
//! input, hashes or encrypts secrets and only then builds the row to store.
//! A failure at any step leaves the database untouched.

mod client;
mod user;

pub use client::{NewClient, create_client, find_or_create_client, rotate_client_secret};
pub use user::{
    Enrollment, NewUser, activate_user, create_user, regenerate_code_secret,
    regenerate_recover_secret, update_password,
};

use validator::ValidationError;

fn lines(value: &str) -> impl Iterator<Item = &str> {
    value.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn validate_scope_list(scopes: &str) -> Result<(), ValidationError> {
    let mut any = false;
    for scope in lines(scopes) {
        any = true;
        if scope.parse::<crate::entity::Scope>().is_err() {
            return Err(ValidationError::new("scope"));
        }
    }
    if any {
        Ok(())
    } else {
        Err(ValidationError::new("required"))
    }
}

fn validate_uri_list(uris: &str) -> Result<(), ValidationError> {
    if lines(uris).next().is_none() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

fn validate_alphanumeric(value: &str) -> Result<(), ValidationError> {
    if value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError::new("alphanumeric"))
    }
}
