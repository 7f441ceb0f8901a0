use std::net::TcpListener;

use wiremock::MockServer;

/// Starts a mock server, or returns `None` when localhost cannot be bound.
///
/// Set `AGGREGATOR_REQUIRE_SOCKET_TESTS=1` to panic instead of skipping.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
    let bindable = TcpListener::bind("127.0.0.1:0").is_ok();
    if !bindable {
        let location = std::panic::Location::caller();
        let required = std::env::var("AGGREGATOR_REQUIRE_SOCKET_TESTS")
            .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
        assert!(
            !required,
            "cannot bind a localhost socket for the test at {}:{}",
            location.file(),
            location.line()
        );
        eprintln!(
            "skipping socket-bound test at {}:{}: cannot bind a localhost socket",
            location.file(),
            location.line()
        );
    }
    async move {
        if bindable {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}
