pub mod credential;
pub mod credential_format;
pub mod input_descriptor;
pub mod presentation_definition;
