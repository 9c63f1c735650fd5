//! Integration tests for redstone-api
//!
//! Uses wiremock to simulate the notes REST API and verifies end-to-end
//! behavior of the ApiClient, the HttpRemoteStore and the login flow.

mod common;

mod test_auth;
mod test_changes;
mod test_errors;
mod test_push_operations;
