// ABOUTME: Integration tests for the container-engine manager against an in-memory engine.
// ABOUTME: Covers deploy, update strategies, rollback, scale bounds, serialization and delete.

mod support;

use std::sync::Arc;
use std::time::Duration;

use deckhand::deploy::{DeployErrorKind, DeploymentStrategy};
use deckhand::engine::{ContainerEngineManager, EngineSettings};
use deckhand::events::{EventKind, Operation};
use deckhand::model::{DeploymentConfig, DeploymentUpdate, Phase, PortSpec, Probe};
use deckhand::platform::{LogQuery, PlatformAdapter};
use deckhand::runtime::ContainerState;
use deckhand::store::InMemoryStore;
use deckhand::types::ContainerId;
use support::fake_engine::FakeEngine;

fn manager(engine: &Arc<FakeEngine>) -> ContainerEngineManager {
    support::init_tracing();
    ContainerEngineManager::new(
        engine.clone(),
        Arc::new(InMemoryStore::<ContainerId>::new()),
    )
}

fn app(image: &str) -> DeploymentConfig {
    DeploymentConfig::new("app-1", "app", image)
}

fn blue_green(image: &str) -> DeploymentConfig {
    let mut config = app(image);
    config.strategy = DeploymentStrategy::BlueGreen;
    config.networking.ports = vec![PortSpec::container(8080)];
    config
}

mod deploy {
    use super::*;

    #[tokio::test]
    async fn deploys_one_running_container() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);

        let result = manager.deploy(app("app:v1")).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.status.phase, Phase::Running);
        assert_eq!(result.status.replicas.desired, 1);
        assert_eq!(result.metadata["image"], "app:v1");

        let running = engine.running();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].name, "app-1");
        assert_eq!(running[0].image, "app:v1");
        assert_eq!(running[0].labels["deckhand.deployment"], "app-1");
        assert_eq!(engine.pulls(), vec!["app:v1".to_string()]);
    }

    #[tokio::test]
    async fn refuses_an_id_that_is_already_registered() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);

        let again = manager.deploy(app("app:v2")).await;

        assert!(!again.success);
        assert_eq!(again.error_kind, Some(DeployErrorKind::AlreadyDeployed));
        assert_eq!(engine.containers().len(), 1);
        assert_eq!(engine.running()[0].image, "app:v1");
    }

    #[tokio::test]
    async fn rejects_more_than_one_replica() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        let mut config = app("app:v1");
        config.scaling.min_replicas = 3;

        let result = manager.deploy(config).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::UnsupportedOperation));
        assert!(engine.containers().is_empty());
        assert_eq!(manager.get_status("app-1").await.phase, Phase::Unknown);
    }

    #[tokio::test]
    async fn zero_replicas_registers_without_a_container() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        let mut config = app("app:v1");
        config.scaling.min_replicas = 0;

        let result = manager.deploy(config).await;

        assert!(result.success);
        assert_eq!(result.status.phase, Phase::Succeeded);
        assert!(engine.containers().is_empty());
        assert_eq!(manager.deployment_ids().unwrap(), vec!["app-1".to_string()]);
    }

    #[tokio::test]
    async fn invalid_config_touches_nothing() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);

        let result = manager.deploy(DeploymentConfig::new("app-1", "app", "")).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::Validation));
        assert!(result.message.contains("image"));
        assert!(engine.pulls().is_empty());
        assert!(manager.deployment_ids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn container_that_exits_is_cleaned_up() {
        let engine = Arc::new(FakeEngine::new());
        engine.crash_image("app:v1");
        let manager = manager(&engine);

        let result = manager.deploy(app("app:v1")).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::Platform));
        assert!(engine.containers().is_empty());
        assert!(manager.deployment_ids().unwrap().is_empty());
    }
}

mod health {
    use super::*;

    fn checked(image: &str) -> DeploymentConfig {
        let mut config = app(image);
        config.health_check.readiness = Some(Probe::http("/health", 8080));
        config
    }

    fn fast(engine: &Arc<FakeEngine>) -> ContainerEngineManager {
        manager(engine).with_settings(EngineSettings {
            health_timeout: Duration::from_millis(200),
            health_poll_interval: Duration::from_millis(20),
            stop_timeout: Duration::from_secs(1),
        })
    }

    #[tokio::test]
    async fn waits_for_healthy_before_reporting_success() {
        let engine = Arc::new(FakeEngine::new());
        let manager = fast(&engine);

        let result = manager.deploy(checked("app:v1")).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.status.metadata["health"], "healthy");
    }

    #[tokio::test]
    async fn never_healthy_times_out_and_removes_the_container() {
        let engine = Arc::new(FakeEngine::new());
        engine.never_healthy_image("app:v1");
        let manager = fast(&engine);

        let started = std::time::Instant::now();
        let result = manager.deploy(checked("app:v1")).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::RolloutTimeout));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(engine.containers().is_empty());
    }

    #[tokio::test]
    async fn unhealthy_fails_without_waiting_for_the_deadline() {
        let engine = Arc::new(FakeEngine::new());
        engine.unhealthy_image("app:v1");
        let manager = manager(&engine);

        let result = manager.deploy(checked("app:v1")).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::Platform));
        assert!(result.message.contains("unhealthy"));
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn replaces_the_container_with_the_new_image() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);

        let result = manager
            .update("app-1", DeploymentUpdate::image("app:v2"))
            .await;

        assert!(result.success, "{}", result.message);
        assert!(result.metadata.contains_key("strategy_fallback"));
        let running = engine.running();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].image, "app:v2");
        assert_eq!(engine.containers().len(), 1);

        let status = manager.get_status("app-1").await;
        assert_eq!(status.phase, Phase::Running);
        assert_eq!(status.metadata["image"], "app:v2");
    }

    #[tokio::test]
    async fn failed_replacement_restores_the_previous_container() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        let mut config = app("app:v1");
        config.strategy = DeploymentStrategy::Recreate;
        assert!(manager.deploy(config).await.success);
        engine.crash_image("app:v2");

        let result = manager
            .update("app-1", DeploymentUpdate::image("app:v2"))
            .await;

        assert!(!result.success);
        let restored = engine.by_name("app-1").expect("previous container restored");
        assert_eq!(restored.image, "app:v1");
        assert_eq!(restored.state, ContainerState::Running);
        assert!(engine.by_name("app-1-previous").is_none());

        let status = manager.get_status("app-1").await;
        assert_eq!(status.phase, Phase::Running);
        assert_eq!(status.metadata["image"], "app:v1");
    }

    #[tokio::test]
    async fn blue_green_switches_to_green_under_the_primary_name() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(blue_green("app:v1")).await.success);

        let result = manager
            .update("app-1", DeploymentUpdate::image("app:v2"))
            .await;

        assert!(result.success, "{}", result.message);
        assert!(!result.metadata.contains_key("strategy_fallback"));
        assert_eq!(result.metadata["plan"], "SideBySide");

        let containers = engine.containers();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "app-1");
        assert_eq!(containers[0].image, "app:v2");
        assert_eq!(containers[0].labels["deckhand.slot"], "green");
        assert_eq!(manager.deployment_ids().unwrap(), vec!["app-1".to_string()]);
    }

    #[tokio::test]
    async fn blue_green_failure_leaves_blue_untouched() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(blue_green("app:v1")).await.success);
        let before = manager.get_status("app-1").await;
        engine.refuse_name_suffix("-green");

        let result = manager
            .update("app-1", DeploymentUpdate::image("app:v2"))
            .await;

        assert!(!result.success);
        let after = manager.get_status("app-1").await;
        assert_eq!(after.phase, before.phase);
        assert_eq!(after.replicas, before.replicas);
        assert_eq!(after.metadata["container_id"], before.metadata["container_id"]);
        assert_eq!(after.metadata["image"], "app:v1");
        assert_eq!(engine.containers().len(), 1);
    }

    #[tokio::test]
    async fn blue_green_stop_failure_discards_green() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(blue_green("app:v1")).await.success);
        engine.refuse_stop("app-1");

        let result = manager
            .update("app-1", DeploymentUpdate::image("app:v2"))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::Platform));
        assert!(result.message.contains("stop refused"));
        assert_eq!(manager.deployment_ids().unwrap(), vec!["app-1".to_string()]);
        let containers = engine.containers();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "app-1");
        assert_eq!(containers[0].image, "app:v1");
        assert_eq!(containers[0].state, ContainerState::Running);

        engine.allow_stops();
        let retry = manager
            .update("app-1", DeploymentUpdate::image("app:v2"))
            .await;
        assert!(retry.success, "{}", retry.message);
        assert_eq!(engine.by_name("app-1").unwrap().image, "app:v2");
    }

    #[tokio::test]
    async fn interrupted_switch_does_not_block_the_next_one() {
        let engine = Arc::new(FakeEngine::new());
        engine.never_healthy_image("app:v2");
        let manager = manager(&engine).with_settings(EngineSettings {
            health_timeout: Duration::from_secs(30),
            health_poll_interval: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(1),
        });
        let mut config = blue_green("app:v1");
        config.health_check.readiness = Some(Probe::http("/health", 8080));
        assert!(manager.deploy(config).await.success);

        let interrupted = tokio::time::timeout(
            Duration::from_millis(100),
            manager.update("app-1", DeploymentUpdate::image("app:v2")),
        )
        .await;
        assert!(interrupted.is_err());
        assert!(engine.by_name("app-1-green").is_some());
        assert_eq!(manager.deployment_ids().unwrap(), vec!["app-1".to_string()]);

        let result = manager
            .update("app-1", DeploymentUpdate::image("app:v3"))
            .await;

        assert!(result.success, "{}", result.message);
        let containers = engine.containers();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "app-1");
        assert_eq!(containers[0].image, "app:v3");
    }

    #[tokio::test]
    async fn blue_green_with_host_ports_falls_back_to_replace() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        let mut config = blue_green("app:v1");
        config.networking.ports = vec![PortSpec::published(80, 8080)];
        assert!(manager.deploy(config).await.success);

        let result = manager
            .update("app-1", DeploymentUpdate::image("app:v2"))
            .await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.metadata["plan"], "Replace");
        assert!(result.metadata["strategy_fallback"].contains("host port"));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);

        let result = manager
            .update("missing", DeploymentUpdate::image("app:v2"))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::NotFound));
    }
}

mod rollback {
    use super::*;

    async fn deployed_then_updated(engine: &Arc<FakeEngine>) -> ContainerEngineManager {
        let manager = manager(engine);
        assert!(manager.deploy(app("app:v1")).await.success);
        assert!(
            manager
                .update("app-1", DeploymentUpdate::image("app:v2"))
                .await
                .success
        );
        manager
    }

    #[tokio::test]
    async fn returns_to_the_previous_image() {
        let engine = Arc::new(FakeEngine::new());
        let manager = deployed_then_updated(&engine).await;

        let result = manager.rollback("app-1", None).await;

        assert!(result.success, "{}", result.message);
        let info = result.rollback_info.expect("rollback info");
        assert_eq!(info.previous_version, "app:v1");
        assert_eq!(result.metadata["rolled_back_from"], "app:v2");

        let running = engine.running();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].image, "app:v1");
        assert_eq!(engine.containers().len(), 1);
    }

    #[tokio::test]
    async fn explicit_version_retags_the_current_repository() {
        let engine = Arc::new(FakeEngine::new());
        let manager = deployed_then_updated(&engine).await;

        let result = manager.rollback("app-1", Some("v0")).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(engine.running()[0].image, "app:v0");
        assert!(engine.pulls().contains(&"app:v0".to_string()));
    }

    #[tokio::test]
    async fn without_history_is_a_validation_error() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);

        let result = manager.rollback("app-1", None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(DeployErrorKind::Validation));
        assert_eq!(engine.running()[0].image, "app:v1");
    }

    #[tokio::test]
    async fn failed_target_leaves_previous_container_stopped() {
        let engine = Arc::new(FakeEngine::new());
        let manager = deployed_then_updated(&engine).await;
        engine.crash_image("app:v1");

        let result = manager.rollback("app-1", None).await;

        assert!(!result.success);
        assert_eq!(result.metadata["rollback_target"], "app:v1");
        assert_eq!(result.metadata["previous_container_state"], "stopped");
        assert!(result.message.contains("left stopped"));

        let previous = engine.by_name("app-1").expect("previous container kept");
        assert_eq!(previous.image, "app:v2");
        assert_eq!(previous.state, ContainerState::Exited);
    }
}

mod scale {
    use super::*;

    #[tokio::test]
    async fn container_engine_allows_only_zero_or_one() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);

        let two = manager.scale("app-1", 2).await;
        assert!(!two.success);
        assert_eq!(two.error_kind, Some(DeployErrorKind::UnsupportedOperation));
        assert!(two.message.contains("cluster"));
        assert_eq!(engine.running().len(), 1);

        let zero = manager.scale("app-1", 0).await;
        assert!(zero.success, "{}", zero.message);
        assert_eq!(zero.status.phase, Phase::Succeeded);
        assert!(engine.containers().is_empty());
        assert_eq!(manager.deployment_ids().unwrap(), vec!["app-1".to_string()]);

        let one = manager.scale("app-1", 1).await;
        assert!(one.success, "{}", one.message);
        assert_eq!(one.status.phase, Phase::Running);
        assert_eq!(engine.running().len(), 1);
        assert_eq!(engine.containers().len(), 1);
    }

    #[tokio::test]
    async fn scale_to_one_relaunches_a_vanished_container() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);
        engine.vanish("app-1");
        assert_eq!(manager.get_status("app-1").await.phase, Phase::Failed);

        let result = manager.scale("app-1", 1).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(engine.running().len(), 1);
    }
}

mod status {
    use super::*;

    #[tokio::test]
    async fn unregistered_id_is_unknown() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);

        let status = manager.get_status("nope").await;

        assert_eq!(status.phase, Phase::Unknown);
    }

    #[tokio::test]
    async fn missing_container_is_failed() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);
        engine.vanish("app-1");

        let status = manager.get_status("app-1").await;

        assert_eq!(status.phase, Phase::Failed);
        assert!(
            status
                .conditions
                .iter()
                .any(|c| c.reason.as_deref() == Some("ContainerMissing"))
        );
    }

    #[tokio::test]
    async fn logs_honor_tail() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);
        engine.set_logs(&["booting", "listening on :8080", "ready"]);

        let lines = manager.get_logs("app-1", &LogQuery::tail(2)).await.unwrap();

        assert_eq!(lines, vec!["listening on :8080", "ready"]);
    }

    #[tokio::test]
    async fn logs_of_unknown_id_are_not_found() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);

        let err = manager
            .get_logs("nope", &LogQuery::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), DeployErrorKind::NotFound);
    }

    #[tokio::test]
    async fn resource_usage_is_normalized() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);

        let usage = manager.resource_usage("app-1").await.unwrap();

        assert!((usage.cpu_percent - 40.0).abs() < 1e-9);
        assert!((usage.memory_percent - 25.0).abs() < 1e-9);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn update_and_rollback_on_one_id_do_not_interleave() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);

        let (update, rollback) = tokio::join!(
            manager.update("app-1", DeploymentUpdate::image("app:v2")),
            manager.rollback("app-1", Some("v3")),
        );

        assert!(update.success, "{}", update.message);
        assert!(rollback.success, "{}", rollback.message);

        let containers = engine.containers();
        assert_eq!(containers.len(), 1, "{containers:?}");
        assert_eq!(containers[0].name, "app-1");
        let image = containers[0].image.as_str();
        assert!(image == "app:v2" || image == "app:v3", "unexpected image {image}");

        let status = manager.get_status("app-1").await;
        assert_eq!(status.phase, Phase::Running);
        assert_eq!(status.metadata["image"], image);
    }

    #[tokio::test]
    async fn different_ids_proceed_independently() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);

        let (a, b) = tokio::join!(
            manager.deploy(DeploymentConfig::new("a", "a", "a:v1")),
            manager.deploy(DeploymentConfig::new("b", "b", "b:v1")),
        );

        assert!(a.success && b.success);
        assert_eq!(engine.running().len(), 2);
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn second_delete_is_a_no_op() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);

        manager.delete("app-1").await.unwrap();
        assert!(engine.containers().is_empty());
        assert!(manager.deployment_ids().unwrap().is_empty());

        manager.delete("app-1").await.unwrap();
        assert!(engine.containers().is_empty());
        assert_eq!(manager.get_status("app-1").await.phase, Phase::Unknown);
    }

    #[tokio::test]
    async fn delete_tolerates_a_vanished_container() {
        let engine = Arc::new(FakeEngine::new());
        let manager = manager(&engine);
        assert!(manager.deploy(app("app:v1")).await.success);
        engine.vanish("app-1");

        manager.delete("app-1").await.unwrap();

        assert!(manager.deployment_ids().unwrap().is_empty());
    }
}

mod events {
    use super::*;

    #[tokio::test]
    async fn operations_emit_started_then_outcome() {
        let engine = Arc::new(FakeEngine::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let manager = manager(&engine).with_events(Arc::new(tx));

        assert!(manager.deploy(app("app:v1")).await.success);
        assert!(!manager.scale("app-1", 5).await.success);

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push((event.operation, event.kind));
        }
        assert_eq!(
            seen,
            vec![
                (Operation::Deploy, EventKind::Started),
                (Operation::Deploy, EventKind::Completed),
                (Operation::Scale, EventKind::Started),
                (Operation::Scale, EventKind::Failed),
            ]
        );
    }
}
