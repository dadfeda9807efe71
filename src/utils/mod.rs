pub mod url_validation;
pub use url_validation::{
    EndpointValidationError, redact_api_key, validate_live_endpoint, with_api_key,
};
