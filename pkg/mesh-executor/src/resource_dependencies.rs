//! Aggregates a set of dependency `ServiceResource`s into one combined report
//! and propagates cancellation to them once the parent is done. Adapted from
//! the teacher's `ServiceResourceDependencies`.

use std::sync::Arc;

use async_std::sync::Mutex;

use crate::cancellation::{CancellationToken, TriggerableCancellationToken};
use crate::report_tracker::ServiceResourceReportTracker;
use crate::resource::{ServiceResource, ServiceResourceReport, ServiceResourceSubscriber};

pub struct ServiceResourceDependencies {
    dep_cancellation_token: Arc<TriggerableCancellationToken>,
    report: ServiceResourceReportTracker,
    deps: Mutex<Vec<Arc<dyn ServiceResource>>>,
}

impl ServiceResourceDependencies {
    pub fn new(initial_parent_report: ServiceResourceReport) -> Self {
        Self {
            dep_cancellation_token: Arc::new(TriggerableCancellationToken::default()),
            report: ServiceResourceReportTracker::new(initial_parent_report),
            deps: Mutex::new(vec![]),
        }
    }

    pub async fn update_parent_report(&self, parent_report: ServiceResourceReport) {
        let mut combined = self.report.current_value().await;
        combined.resource_name = parent_report.resource_name;
        combined.self_state = parent_report.self_state;
        combined.self_message = parent_report.self_message;

        if combined.self_state.is_terminal() {
            self.dep_cancellation_token.trigger().await;
        }

        self.report.update(combined).await;
    }

    pub async fn register_dependency(&self, resource: Arc<dyn ServiceResource>) {
        resource
            .add_cancellation_token(self.dep_cancellation_token.clone())
            .await;

        let idx = {
            let mut deps = self.deps.lock().await;
            deps.push(resource.clone());
            deps.len() - 1
        };

        let mut report = self.report.current_value().await;
        let mut sub = resource.new_resource_subscriber().await;
        report.dependencies.push(sub.value().await);
        self.report.update(report).await;

        // Watch this dependency for future changes and fold them into the
        // combined report, independently of the caller's own lifetime.
        let report_tracker = self.report.clone();
        async_std::task::spawn(async move {
            loop {
                sub.wait_for_change().await;
                let mut report = report_tracker.current_value().await;
                if idx >= report.dependencies.len() {
                    return;
                }
                report.dependencies[idx] = sub.value().await;
                report_tracker.update(report).await;
            }
        });
    }

    pub async fn new_resource_subscriber(&self) -> Box<dyn ServiceResourceSubscriber> {
        self.report.subscribe()
    }
}
