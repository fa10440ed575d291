//! Test utilities for integration testing (available with `test-utils` feature).

use crate::config::{AuthConfig, Config};
use crate::store::mock::MockContentStore;
use axum_test::TestServer;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_API_KEY: &str = "test-key";

/// Default configuration with a single API key and fast pin retries.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.auth = AuthConfig {
        enabled: true,
        api_keys: vec![TEST_API_KEY.to_string()],
    };
    config.pinning.retry_delay = Duration::from_millis(1);
    config
}

pub fn create_test_server_with_config(config: Config, store: MockContentStore) -> TestServer {
    crate::Application::new_with_store(config, Arc::new(store))
        .expect("Failed to create application")
        .into_test_server()
}

/// Full application router over a mock store.
pub fn create_test_server(store: MockContentStore) -> TestServer {
    create_test_server_with_config(create_test_config(), store)
}
