use super::*;

#[test]
fn action_failed_carries_status_code() {
    let err = ClientError::from_status("reveal", StatusCode::FORBIDDEN);
    assert!(matches!(err, ClientError::ActionFailed { action: "reveal", status: 403 }));
    assert_eq!(err.to_string(), "reveal failed: HTTP 403");
}

#[test]
fn validation_message_is_shown_verbatim() {
    let err = ClientError::Validation("Task title is required".to_owned());
    assert_eq!(err.to_string(), "Task title is required");
}

#[test]
fn not_found_names_the_room() {
    let err = ClientError::NotFound { room_id: "AB12CD34".to_owned() };
    assert_eq!(err.to_string(), "room `AB12CD34` not found");
}

#[test]
fn no_session_tells_the_user_how_to_start_one() {
    let text = ClientError::NoSession.to_string();
    assert!(text.contains("planpoker join"), "{text}");
    assert!(text.contains("planpoker create"), "{text}");
}

#[test]
fn websocket_errors_are_boxed() {
    let err = ClientError::from(tokio_tungstenite::tungstenite::Error::ConnectionClosed);
    assert!(matches!(err, ClientError::WsConnect(_)));
    assert!(err.to_string().starts_with("websocket connect failed"));
}
