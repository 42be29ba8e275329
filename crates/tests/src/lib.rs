//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到控制器的装配
//! - 模拟 e2e 测试（无需 broker 与数据库）

#[cfg(test)]
mod config_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use ingestion::ControllerConfig;
    use std::time::Duration;

    #[test]
    fn test_config_drives_controller() {
        let config = ConfigLoader::load_from_str(
            r#"
[bus]
topic = "plant-7"
disconnect_timeout_ms = 500

[pipeline]
queue_capacity = 4
max_consecutive_failures = 2
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let controller = ControllerConfig::from(&config);
        assert_eq!(controller.topic, "plant-7");
        assert_eq!(controller.disconnect_timeout, Duration::from_millis(500));
        assert_eq!(controller.pipeline.queue_capacity, 4);
        assert_eq!(controller.pipeline.max_consecutive_failures, Some(2));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use bus_client::{BusCall, MockBus, MockBusConfig, MockBusHandle};
    use codec::DeviceCodec;
    use contracts::DeviceMessage;
    use ingestion::{
        ControllerConfig, IngestionError, LifecycleController, PipelineConfig, PipelineState,
        StopReason,
    };
    use persistence::{MemorySink, MemorySinkConfig, MemorySinkHandle};

    const TOPIC: &str = "iot-messages";

    fn temp_rh(device_id: &str, temp: f64) -> String {
        format!(
            r#"{{"time":"2024-05-01T12:00:00Z","device":{{"device_id":"{device_id}","name":"greenhouse","device_type":"TempRH","temp":{temp},"rh":40}}}}"#
        )
    }

    fn controller_config(pipeline: PipelineConfig) -> ControllerConfig {
        ControllerConfig {
            topic: TOPIC.to_string(),
            pipeline,
            ..Default::default()
        }
    }

    fn build(
        bus_config: MockBusConfig,
        sink: MemorySink,
        pipeline: PipelineConfig,
    ) -> (
        LifecycleController<MockBus, MemorySink>,
        MockBusHandle,
        MemorySinkHandle,
    ) {
        let bus = MockBus::new(bus_config);
        let bus_handle = bus.handle();
        let sink_handle = sink.handle();
        let controller = LifecycleController::new(
            bus,
            sink,
            DeviceCodec::default(),
            controller_config(pipeline),
        );
        (controller, bus_handle, sink_handle)
    }

    /// Poll until `check` holds or fail after two seconds
    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// End-to-end: MockBus -> pipeline -> MemorySink
    ///
    /// 验证：
    /// 1. 合法报文按到达顺序持久化
    /// 2. 畸形报文被丢弃，不影响后续报文
    /// 3. 关闭顺序：unsubscribe → drain → close sink → disconnect
    #[tokio::test]
    async fn test_e2e_valid_malformed_valid() {
        let (mut controller, bus, sink) = build(
            MockBusConfig::default(),
            MemorySink::new("memory"),
            PipelineConfig::default(),
        );
        controller.start().await.unwrap();
        assert_eq!(controller.state(), PipelineState::Running);

        assert!(bus.publish(TOPIC, temp_rh("first", 20.5)).await);
        assert!(bus.publish(TOPIC, "{\"time\":\"2024-05-01T12:00:00Z\"").await);
        assert!(bus.publish(TOPIC, temp_rh("second", 21.0)).await);

        wait_until(|| sink.len() == 2).await;
        let report = controller.shutdown(StopReason::Signal).await;

        assert!(report.is_success());
        assert_eq!(report.reason, StopReason::Signal);
        assert_eq!(report.metrics.received, 3);
        assert_eq!(report.metrics.decode_failures, 1);
        assert_eq!(report.metrics.persisted, 2);
        assert!(report.errors.is_empty());

        let records = sink.records();
        assert_eq!(sink.device_ids(), vec!["first", "second"]);
        assert_eq!(records[0].id, Some(1));
        assert_eq!(records[1].device.properties.as_ref().unwrap()["temp"], 21.0);
        assert!(sink.is_closed());

        assert_eq!(
            bus.calls(),
            vec![
                BusCall::Connect,
                BusCall::Subscribe(TOPIC.into()),
                BusCall::Unsubscribe(TOPIC.into()),
                BusCall::Disconnect,
            ]
        );
        assert!(!bus.is_connected());
    }

    #[tokio::test]
    async fn test_e2e_drain_persists_everything_received() {
        let (mut controller, bus, sink) = build(
            MockBusConfig {
                delivery_capacity: 256,
                ..Default::default()
            },
            MemorySink::new("memory"),
            PipelineConfig {
                queue_capacity: 4,
                ..Default::default()
            },
        );
        controller.start().await.unwrap();

        for i in 0..100 {
            bus.publish(TOPIC, temp_rh(&format!("d{i}"), 20.0 + f64::from(i)))
                .await;
        }
        let report = controller.shutdown(StopReason::Signal).await;

        assert_eq!(controller.state(), PipelineState::Stopped);
        assert_eq!(report.metrics.unaccounted(), 0);
        assert_eq!(report.metrics.persisted, report.metrics.received);
        assert_eq!(sink.len() as u64, report.metrics.persisted);

        // Whatever was persisted is a prefix of the published order
        let expected: Vec<String> = (0..sink.len()).map(|i| format!("d{i}")).collect();
        assert_eq!(sink.device_ids(), expected);
    }

    #[tokio::test]
    async fn test_e2e_unknown_device_type_passthrough() {
        let (mut controller, bus, sink) = build(
            MockBusConfig::default(),
            MemorySink::new("memory"),
            PipelineConfig::default(),
        );
        controller.start().await.unwrap();

        let doc = r#"{"time":"2024-05-01T12:00:00Z","device":{"device_id":"x-9","name":"valve","device_type":"Valve","open":true}}"#;
        bus.publish(TOPIC, doc).await;

        wait_until(|| sink.len() == 1).await;
        controller.shutdown(StopReason::Signal).await;

        let stored: DeviceMessage = sink.records().remove(0);
        assert_eq!(stored.device_type(), "Valve");
        assert_eq!(stored.device.device_name, "valve");
        assert_eq!(stored.device.properties, None);
    }

    #[tokio::test]
    async fn test_e2e_persist_failures_isolated() {
        let (mut controller, bus, sink) = build(
            MockBusConfig::default(),
            MemorySink::with_config(
                "memory",
                MemorySinkConfig {
                    fail_device_ids: HashSet::from(["broken".to_string()]),
                    ..Default::default()
                },
            ),
            PipelineConfig::default(),
        );
        controller.start().await.unwrap();

        for device_id in ["a", "broken", "b"] {
            bus.publish(TOPIC, temp_rh(device_id, 19.0)).await;
        }

        wait_until(|| sink.len() == 2).await;
        let report = controller.shutdown(StopReason::Signal).await;

        assert!(report.is_success());
        assert_eq!(report.metrics.persist_failures, 1);
        assert_eq!(sink.device_ids(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_e2e_failure_threshold_stops_pipeline() {
        let (mut controller, bus, _sink) = build(
            MockBusConfig::default(),
            MemorySink::with_config(
                "memory",
                MemorySinkConfig {
                    fail_all_writes: true,
                    ..Default::default()
                },
            ),
            PipelineConfig {
                max_consecutive_failures: Some(3),
                ..Default::default()
            },
        );
        controller.start().await.unwrap();
        let token = controller.cancellation_token();

        for i in 0..5 {
            bus.publish(TOPIC, temp_rh(&format!("d{i}"), 18.0)).await;
        }

        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("pipeline did not stop");
        let report = controller.shutdown(StopReason::Signal).await;

        assert_eq!(report.reason, StopReason::PersistFailureThreshold);
        assert!(!report.is_success());
        assert!(report.metrics.persist_failures >= 3);
    }

    #[tokio::test]
    async fn test_e2e_subscription_closed_by_bus() {
        let (controller, bus, sink) = build(
            MockBusConfig::default(),
            MemorySink::new("memory"),
            PipelineConfig::default(),
        );

        let run = tokio::spawn(controller.run_until(std::future::pending()));

        wait_until(|| bus.calls().contains(&BusCall::Subscribe(TOPIC.into()))).await;
        bus.publish(TOPIC, temp_rh("only", 22.0)).await;
        bus.close_subscriptions();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.reason, StopReason::SubscriptionClosed);
        assert!(!report.is_success());
        assert_eq!(sink.device_ids(), vec!["only"]);
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_e2e_connection_failure_aborts_startup() {
        let (mut controller, bus, sink) = build(
            MockBusConfig {
                fail_connect: true,
                ..Default::default()
            },
            MemorySink::new("memory"),
            PipelineConfig::default(),
        );

        let err = controller.start().await.unwrap_err();
        match err {
            IngestionError::Startup { step, source } => {
                assert_eq!(step, "connect");
                assert!(source.is_fatal_at_startup());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(controller.state(), PipelineState::Idle);
        assert_eq!(bus.calls(), vec![BusCall::Connect]);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_e2e_storage_outage_releases_bus() {
        let (mut controller, bus, sink) = build(
            MockBusConfig::default(),
            MemorySink::with_config(
                "memory",
                MemorySinkConfig {
                    fail_ready: true,
                    ..Default::default()
                },
            ),
            PipelineConfig::default(),
        );

        let err = controller.start().await.unwrap_err();
        assert!(matches!(
            err,
            IngestionError::Startup {
                step: "storage readiness",
                ..
            }
        ));
        assert_eq!(bus.calls(), vec![BusCall::Connect, BusCall::Disconnect]);
        assert!(sink.is_closed());
    }
}
