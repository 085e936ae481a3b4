//! Vendor version update: confirmation, rollback and its failure modes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use docp_manager::application::ports::ServiceControl;
use docp_manager::application::services::poll::PollPolicy;
use docp_manager::application::services::version_update::{
    RollbackReason, UpdateOutcome, VersionUpdateController,
};
use docp_manager::domain::phase::{
    VENDOR_VERSION_COMPLETE, VENDOR_VERSION_ROLLBACK_COMPLETE, VENDOR_VERSION_ROLLBACK_ERROR,
};
use docp_manager::domain::{Service, ServiceStatus, UpdateError};
use mockall::mock;
use mockall::predicate::eq;

use crate::mocks::{FakeAuth, FakeSource, FakeVendor, MemoryConfig};
use docp_manager::application::services::notifier::TransactionNotifier;

mock! {
    pub Services {}

    #[async_trait]
    impl ServiceControl for Services {
        async fn status(&self, service: Service) -> Result<ServiceStatus>;
        async fn already_installed(&self, service: Service) -> Result<bool>;
        async fn restart(&self, service: Service) -> Result<()>;
        async fn stop(&self, service: Service) -> Result<()>;
        async fn daemon_reload(&self) -> Result<()>;
    }
}

struct Fixture {
    source: Arc<FakeSource>,
    vendor: Arc<FakeVendor>,
}

impl Fixture {
    fn new(vendor: FakeVendor) -> Self {
        Self {
            source: Arc::new(FakeSource::new()),
            vendor: Arc::new(vendor),
        }
    }

    fn controller(&self, services: MockServices) -> VersionUpdateController {
        let notifier = Arc::new(
            TransactionNotifier::new(
                self.source.clone(),
                Arc::new(FakeAuth::default()),
                Arc::new(MemoryConfig::with_token()),
            )
            .with_phase_delay(Duration::ZERO),
        );
        VersionUpdateController::new(self.vendor.clone(), Arc::new(services), notifier)
    }
}

fn vendor_reports(statuses: Vec<ServiceStatus>) -> MockServices {
    let mut services = MockServices::new();
    let mut script = statuses.into_iter();
    services
        .expect_status()
        .with(eq(Service::Vendor))
        .returning(move |_| Ok(script.next().unwrap_or(ServiceStatus::Inactive)));
    services
}

#[tokio::test(start_paused = true)]
async fn test_update_confirmed_when_vendor_comes_up() {
    let f = Fixture::new(FakeVendor::at("7.50.0"));
    let services = vendor_reports(vec![
        ServiceStatus::Other("activating".to_string()),
        ServiceStatus::Active,
    ]);

    let outcome = f.controller(services).update_version("7.52.0").await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Confirmed);
    assert_eq!(f.vendor.calls(), vec!["update_version 7.52.0"]);
    assert_eq!(
        f.source.accepted_phases().last().map(String::as_str),
        Some(VENDOR_VERSION_COMPLETE)
    );
}

#[tokio::test(start_paused = true)]
async fn test_already_current_issues_nothing() {
    let f = Fixture::new(FakeVendor::at("7.52.0"));
    let services = MockServices::new();

    let outcome = f.controller(services).update_version("7.52.0").await.unwrap();

    assert_eq!(outcome, UpdateOutcome::AlreadyCurrent);
    assert!(f.vendor.calls().is_empty());
    assert_eq!(f.source.post_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rollback_called_exactly_once_after_budget() {
    let f = Fixture::new(FakeVendor::at("7.50.0"));
    let mut services = MockServices::new();
    services
        .expect_status()
        .times(10)
        .returning(|_| Ok(ServiceStatus::Inactive));

    let outcome = f.controller(services).update_version("7.52.0").await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::RolledBack {
            to: "7.50.0".to_string(),
            reason: RollbackReason::AttemptsExhausted,
        }
    );
    assert_eq!(f.vendor.count("rollback_version"), 1);
    assert_eq!(f.vendor.calls().last().unwrap(), "rollback_version 7.50.0");
    assert_eq!(
        f.source.accepted_phases().last().map(String::as_str),
        Some(VENDOR_VERSION_ROLLBACK_COMPLETE)
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_takes_the_rollback_path() {
    let f = Fixture::new(FakeVendor::at("7.50.0"));
    let services = vendor_reports(Vec::new());
    let controller = f.controller(services).with_policy(PollPolicy {
        tick: Duration::from_secs(30),
        max_attempts: None,
        deadline: Duration::from_secs(95),
    });

    let outcome = controller.update_version("7.52.0").await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::RolledBack {
            to: "7.50.0".to_string(),
            reason: RollbackReason::DeadlineExceeded,
        }
    );
    assert_eq!(f.vendor.count("rollback_version"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_rollback_is_reported() {
    let f = Fixture::new(FakeVendor {
        fail_rollback: true,
        ..FakeVendor::at("7.50.0")
    });
    let services = vendor_reports(Vec::new());

    let err = f
        .controller(services)
        .update_version("7.52.0")
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<UpdateError>(),
        Some(UpdateError::RollbackFailed { version, .. }) if version == "7.50.0"
    ));
    assert_eq!(f.vendor.count("rollback_version"), 1);
    assert_eq!(
        f.source.accepted_phases().last().map(String::as_str),
        Some(VENDOR_VERSION_ROLLBACK_ERROR)
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_updates_run_one_after_another() {
    let f = Fixture::new(FakeVendor::at("7.50.0"));
    let controller = f.controller(vendor_reports(Vec::new()));

    let (first, second) = tokio::join!(
        controller.update_version("7.52.0"),
        controller.update_version("7.52.0"),
    );

    // the second call starts only after the first has rolled back
    let rolled_back = UpdateOutcome::RolledBack {
        to: "7.50.0".to_string(),
        reason: RollbackReason::AttemptsExhausted,
    };
    assert_eq!(first.unwrap(), rolled_back);
    assert_eq!(second.unwrap(), rolled_back);
    assert_eq!(
        f.vendor.calls(),
        vec![
            "update_version 7.52.0",
            "rollback_version 7.50.0",
            "update_version 7.52.0",
            "rollback_version 7.50.0",
        ]
    );
}
