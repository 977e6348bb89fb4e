use super::*;

#[test]
fn test_exit_codes() {
    let protocol = PerceptionError::from(ProtocolError::new(ProtocolCall::GetFullAxTree, "boom"));
    assert_eq!(protocol.exit_code(), 4);
    assert!(protocol.is_protocol_failure());

    let resolution = PerceptionError::Resolution { backend_node_id: 42 };
    assert_eq!(resolution.exit_code(), 2);
    assert!(!resolution.is_protocol_failure());

    let too_large = PerceptionError::PayloadTooLarge {
        actual_size: 10,
        max_size: 5,
    };
    assert_eq!(too_large.exit_code(), 3);
}

#[test]
fn test_protocol_error_names_the_call() {
    let err = ProtocolError::new(ProtocolCall::CaptureSnapshot, "target closed");
    assert_eq!(
        err.to_string(),
        "DOMSnapshot.captureSnapshot failed: target closed"
    );
}

#[test]
fn test_resolution_message_contains_handle() {
    let err = PerceptionError::Resolution { backend_node_id: 1337 };
    assert!(err.to_string().contains("1337"));
}

#[test]
fn test_payload_too_large_message_has_remediation() {
    let err = PerceptionError::PayloadTooLarge {
        actual_size: 5_000_000,
        max_size: 4_194_304,
    };
    let msg = err.to_string();
    assert!(msg.contains("5000000"));
    assert!(msg.contains("4194304"));
    assert!(msg.contains("refreshing the page"));
}

#[test]
fn test_from_anyhow_preserves_typed_errors() {
    let wrapped: anyhow::Error = PerceptionError::Resolution { backend_node_id: 7 }.into();
    assert!(matches!(
        PerceptionError::from(wrapped),
        PerceptionError::Resolution { backend_node_id: 7 }
    ));

    let protocol: anyhow::Error = ProtocolError::new(ProtocolCall::Evaluate, "x").into();
    assert!(PerceptionError::from(protocol).is_protocol_failure());

    let timeout: anyhow::Error = PerceptionError::Timeout("page still active".into()).into();
    assert_eq!(PerceptionError::from(timeout).exit_code(), 5);

    // Wording alone never makes a timeout
    let worded = anyhow::anyhow!("wait timed out after 3000ms");
    assert_eq!(PerceptionError::from(worded).exit_code(), 1);

    let other = anyhow::anyhow!("something else");
    assert_eq!(PerceptionError::from(other).exit_code(), 1);
}
