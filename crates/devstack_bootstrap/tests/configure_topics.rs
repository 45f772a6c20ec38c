//! Tests for `configure_topics` against the in-memory cluster.

use devstack_bootstrap::{
    BootstrapError, BootstrapSpec, InMemoryCluster, SaslCredentials, SecurityProtocol, TopicDef,
    configure_topics,
};

fn plaintext() -> BootstrapSpec {
    BootstrapSpec::new(["127.0.0.1:9092", "127.0.0.1:9093"], SecurityProtocol::Plaintext)
}

fn topics() -> Vec<TopicDef> {
    vec![
        TopicDef::new("orders", 3, 1),
        TopicDef::new("payments", 1, 1),
    ]
}

#[tokio::test]
async fn creates_missing_topics() {
    let cluster = InMemoryCluster::new();

    let report = configure_topics(&cluster, &plaintext(), &topics())
        .await
        .unwrap();

    assert_eq!(report.created, ["orders", "payments"]);
    assert!(report.unchanged.is_empty());
    assert_eq!(cluster.topic("orders"), Some(TopicDef::new("orders", 3, 1)));
}

#[tokio::test]
async fn second_run_is_a_noop() {
    let cluster = InMemoryCluster::new();
    configure_topics(&cluster, &plaintext(), &topics())
        .await
        .unwrap();
    let creates = cluster.create_requests();

    let report = configure_topics(&cluster, &plaintext(), &topics())
        .await
        .unwrap();

    assert!(report.is_noop());
    assert_eq!(report.unchanged, ["orders", "payments"]);
    assert_eq!(cluster.create_requests(), creates);
}

#[tokio::test]
async fn conflicting_topic_fails_and_nothing_changes() {
    let cluster = InMemoryCluster::new();
    cluster.insert_topic(TopicDef::new("orders", 1, 1));

    let err = configure_topics(&cluster, &plaintext(), &topics())
        .await
        .unwrap_err();

    let BootstrapError::TopicConfigConflict { conflicts } = &err else {
        panic!("expected a conflict, got {err}");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].declared, TopicDef::new("orders", 3, 1));
    assert_eq!(conflicts[0].existing, TopicDef::new("orders", 1, 1));
    assert!(err.to_string().contains("'orders' declared with partitions=3"));

    // The conflicting topic is untouched and the missing one was not created.
    assert_eq!(cluster.topic("orders"), Some(TopicDef::new("orders", 1, 1)));
    assert!(cluster.topic("payments").is_none());
    assert_eq!(cluster.create_requests(), 0);
}

#[tokio::test]
async fn unreachable_cluster_is_reported_without_retry() {
    let cluster = InMemoryCluster::new();
    cluster.set_down(true);

    let err = configure_topics(&cluster, &plaintext(), &topics())
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        BootstrapError::BootstrapUnreachable { servers, .. } if servers == "127.0.0.1:9092,127.0.0.1:9093"
    ));
    assert!(err.is_retryable());
    assert_eq!(cluster.connection_attempts(), 1);
}

#[tokio::test]
async fn missing_credentials_fail_before_io() {
    let cluster = InMemoryCluster::new();
    let spec = BootstrapSpec::new(["127.0.0.1:9092"], SecurityProtocol::SaslSsl);

    let err = configure_topics(&cluster, &spec, &topics())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BootstrapError::MissingCredentials {
            protocol: SecurityProtocol::SaslSsl
        }
    );
    assert!(!err.is_retryable());
    assert_eq!(cluster.connection_attempts(), 0);
}

#[tokio::test]
async fn invalid_topics_fail_before_io() {
    let cluster = InMemoryCluster::new();
    let bad = [TopicDef::new("orders", 0, 1)];

    let err = configure_topics(&cluster, &plaintext(), &bad)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::InvalidTopic { ref topic, .. } if topic == "orders"));
    assert_eq!(cluster.connection_attempts(), 0);
}

#[tokio::test]
async fn security_settings_are_passed_verbatim() {
    let cluster = InMemoryCluster::new();
    let spec = BootstrapSpec::new(["127.0.0.1:9092"], SecurityProtocol::SaslPlaintext)
        .with_credentials(SaslCredentials::plain("devstack", "secret"));

    configure_topics(&cluster, &spec, &[]).await.unwrap();

    let config = cluster.last_client_config().unwrap();
    assert_eq!(config["security.protocol"], "SASL_PLAINTEXT");
    assert_eq!(config["sasl.username"], "devstack");
    assert_eq!(config["sasl.mechanism"], "PLAIN");
}

#[test]
fn topic_definitions_deserialize() {
    let topics: Vec<TopicDef> = serde_json::from_str(
        r#"[{ "name": "orders", "partitions": 3, "replication_factor": 1 }]"#,
    )
    .unwrap();
    assert_eq!(topics, vec![TopicDef::new("orders", 3, 1)]);
}
