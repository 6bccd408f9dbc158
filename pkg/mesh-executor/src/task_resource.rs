//! A resource implemented as a single spawned task, adapted from the
//! teacher's `TaskResource`.

use std::future::Future;
use std::sync::Arc;

use mesh_common::errors::Result;

use crate::cancellation::{AlreadyCancelledToken, CancellationToken, CancellationTokenSet};
use crate::report_tracker::ServiceResourceReportTracker;
use crate::resource::{
    ServiceResource, ServiceResourceReport, ServiceResourceState, ServiceResourceSubscriber,
};

pub struct TaskResource {
    shared: Arc<Shared>,
}

struct Shared {
    report: ServiceResourceReportTracker,
    cancellation_tokens: Arc<CancellationTokenSet>,
}

impl Drop for TaskResource {
    fn drop(&mut self) {
        let shared = self.shared.clone();
        async_std::task::spawn(async move {
            shared
                .cancellation_tokens
                .add(Arc::new(AlreadyCancelledToken::default()))
                .await
        });
    }
}

impl TaskResource {
    pub fn spawn<F, Fut>(name: &str, func: F) -> Self
    where
        F: (FnOnce(Arc<dyn CancellationToken>) -> Fut) + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let initial = ServiceResourceReport {
            resource_name: name.to_string(),
            self_state: ServiceResourceState::Ready,
            self_message: None,
            dependencies: vec![],
        };

        let shared = Arc::new(Shared {
            report: ServiceResourceReportTracker::new(initial.clone()),
            cancellation_tokens: Arc::new(CancellationTokenSet::default()),
        });

        let shared2 = shared.clone();
        async_std::task::spawn(async move {
            let result = func(shared2.cancellation_tokens.clone()).await;
            let (state, message) = match result {
                Ok(()) => (ServiceResourceState::Done, None),
                Err(e) => (ServiceResourceState::PermanentFailure, Some(e.to_string())),
            };
            shared2.report.update_self(state, message).await;
        });

        Self { shared }
    }

    /// Spawns a task whose future races against cancellation: the resource
    /// stops as soon as either the future completes or the cancellation
    /// token fires, mirroring the teacher's `spawn_interruptable`.
    pub fn spawn_interruptable<Fut>(name: &str, future: Fut) -> Self
    where
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::spawn(name, move |token| async move {
            futures::pin_mut!(future);
            futures::future::select(Box::pin(future), Box::pin(token.wait_for_cancellation()))
                .await;
            Ok(())
        })
    }
}

#[async_trait::async_trait]
impl ServiceResource for TaskResource {
    async fn add_cancellation_token(&self, token: Arc<dyn CancellationToken>) {
        self.shared.cancellation_tokens.add(token).await;
    }

    async fn new_resource_subscriber(&self) -> Box<dyn ServiceResourceSubscriber> {
        self.shared.report.subscribe()
    }
}
