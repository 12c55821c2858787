use super::*;

#[test]
fn test_publisher_config() {
    let config = KafkaEventBusConfig::publisher("localhost:9092", "user-activity-events");
    assert_eq!(config.bootstrap_servers, "localhost:9092");
    assert_eq!(config.topic, "user-activity-events");
    assert!(config.group_id.is_none());
    assert_eq!(config.send_timeout, Duration::from_secs(5));
}

#[test]
fn test_subscriber_config() {
    let config = KafkaEventBusConfig::subscriber(
        "localhost:9092",
        "user-activity-events",
        "user-activity-consumer-group",
    );
    assert_eq!(
        config.group_id,
        Some("user-activity-consumer-group".to_string())
    );
}

#[test]
fn test_from_config_uses_application_settings() {
    let app = KafkaConfig {
        bootstrap_servers: "broker:29092".to_string(),
        topic: "activity".to_string(),
        group_id: "activity-group".to_string(),
        client_id: "ingest-1".to_string(),
        from_beginning: false,
        startup_timeout_ms: 2500,
        ..Default::default()
    };

    let config = KafkaEventBusConfig::from_config(&app);

    assert_eq!(config.bootstrap_servers, "broker:29092");
    assert_eq!(config.topic, "activity");
    assert_eq!(config.group_id, Some("activity-group".to_string()));
    assert_eq!(config.client_id, "ingest-1");
    assert!(!config.from_beginning);
    assert_eq!(config.startup_timeout, Duration::from_millis(2500));
    assert!(config.security_protocol.is_none());
}

#[test]
fn test_from_config_applies_sasl_only_when_complete() {
    let partial = KafkaConfig {
        sasl_username: Some("user".to_string()),
        ..Default::default()
    };
    assert!(KafkaEventBusConfig::from_config(&partial)
        .sasl_username
        .is_none());

    let complete = KafkaConfig {
        sasl_username: Some("user".to_string()),
        sasl_password: Some("pass".to_string()),
        sasl_mechanism: Some("PLAIN".to_string()),
        ..Default::default()
    };
    let config = KafkaEventBusConfig::from_config(&complete);
    assert_eq!(config.sasl_mechanism, Some("PLAIN".to_string()));
    assert_eq!(config.security_protocol, Some("SASL_SSL".to_string()));
}

#[test]
fn test_sasl_config() {
    let config = KafkaEventBusConfig::publisher("localhost:9092", "t").with_sasl(
        "user",
        "pass",
        "SCRAM-SHA-256",
    );
    assert_eq!(config.sasl_username, Some("user".to_string()));
    assert_eq!(config.sasl_password, Some("pass".to_string()));
    assert_eq!(config.sasl_mechanism, Some("SCRAM-SHA-256".to_string()));
    assert_eq!(config.security_protocol, Some("SASL_SSL".to_string()));
}

#[test]
fn test_ssl_config() {
    let config = KafkaEventBusConfig::publisher("localhost:9092", "t")
        .with_security_protocol("SSL")
        .with_ssl_ca("/path/to/ca.crt");
    assert_eq!(config.security_protocol, Some("SSL".to_string()));
    assert_eq!(config.ssl_ca_location, Some("/path/to/ca.crt".to_string()));
}

#[test]
fn test_producer_config_uses_send_timeout() {
    let config = KafkaEventBusConfig::publisher("localhost:9092", "t")
        .with_send_timeout(Duration::from_millis(1500));
    let client = config.build_producer_config();

    assert_eq!(client.get("message.timeout.ms"), Some("1500"));
    assert_eq!(client.get("enable.idempotence"), None);
}

#[test]
fn test_consumer_config_disables_auto_commit() {
    let config = KafkaEventBusConfig::subscriber("localhost:9092", "t", "g");
    let client = config.build_consumer_config();

    assert_eq!(client.get("enable.auto.commit"), Some("false"));
    assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
    assert_eq!(client.get("group.id"), Some("g"));
}

#[test]
fn test_consumer_config_latest_offset() {
    let config = KafkaEventBusConfig::subscriber("localhost:9092", "t", "g").with_from_beginning(false);
    let client = config.build_consumer_config();

    assert_eq!(client.get("auto.offset.reset"), Some("latest"));
}

#[test]
fn test_send_timeout_maps_to_timeout_error() {
    let error = KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut);
    assert!(matches!(map_send_error(error), BusError::Timeout(_)));

    let error = KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge);
    assert!(matches!(map_send_error(error), BusError::Publish(_)));
}

#[test]
fn test_only_fatal_errors_stop_the_consumer() {
    assert!(is_fatal(&KafkaError::MessageConsumption(
        RDKafkaErrorCode::Fatal
    )));
    assert!(!is_fatal(&KafkaError::MessageConsumption(
        RDKafkaErrorCode::BrokerTransportFailure
    )));
}

#[tokio::test]
async fn test_publisher_only_bus_cannot_consume() {
    let bus = KafkaEventBus::new(KafkaEventBusConfig::publisher("localhost:9092", "t"))
        .await
        .unwrap();

    assert!(matches!(
        bus.start_consuming().await,
        Err(BusError::Subscribe(_))
    ));
    assert_eq!(bus.state(), ConsumerState::Disconnected);
}

#[tokio::test]
async fn test_unreachable_broker_fails_startup() {
    // Nothing listens on port 1; metadata fetch must fail within the timeout
    let config = KafkaEventBusConfig::subscriber("127.0.0.1:1", "t", "g")
        .with_startup_timeout(Duration::from_millis(500));
    let bus = KafkaEventBus::new(config).await.unwrap();

    let result = bus.start_consuming().await;

    assert!(matches!(result, Err(BusError::Connection(_))));
    assert_eq!(bus.state(), ConsumerState::Disconnected);
}
