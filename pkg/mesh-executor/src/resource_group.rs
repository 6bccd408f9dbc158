//! A named bundle of resources that itself behaves as one `ServiceResource`.
//! Each mesh component (transport, topology, consensus, router, outbox)
//! registers its tasks into one of these so the composition root only ever
//! deals with a handful of top-level groups. Adapted from the teacher's
//! `ServiceResourceGroup`.

use std::future::Future;
use std::sync::Arc;

use mesh_common::errors::Result;

use crate::cancellation::CancellationToken;
use crate::resource::{ServiceResource, ServiceResourceReport, ServiceResourceState, ServiceResourceSubscriber};
use crate::resource_dependencies::ServiceResourceDependencies;
use crate::task_resource::TaskResource;

pub struct ServiceResourceGroup {
    deps: Arc<ServiceResourceDependencies>,
    _placeholder: TaskResource,
}

#[async_trait::async_trait]
impl ServiceResource for ServiceResourceGroup {
    async fn add_cancellation_token(&self, token: Arc<dyn CancellationToken>) {
        self._placeholder.add_cancellation_token(token).await
    }

    async fn new_resource_subscriber(&self) -> Box<dyn ServiceResourceSubscriber> {
        self.deps.new_resource_subscriber().await
    }
}

impl ServiceResourceGroup {
    pub fn new(name: &str) -> Self {
        let name = name.to_string();
        let deps = Arc::new(ServiceResourceDependencies::new(ServiceResourceReport {
            resource_name: name.clone(),
            self_state: ServiceResourceState::Ready,
            self_message: None,
            dependencies: vec![],
        }));

        let deps2 = deps.clone();
        let name2 = name.clone();
        let placeholder = TaskResource::spawn(&name, |token| async move {
            token.wait_for_cancellation().await;
            deps2
                .update_parent_report(ServiceResourceReport {
                    resource_name: name2,
                    self_state: ServiceResourceState::Done,
                    self_message: None,
                    dependencies: vec![],
                })
                .await;
            Ok(())
        });

        Self {
            deps,
            _placeholder: placeholder,
        }
    }

    pub async fn register_dependency(&self, resource: Arc<dyn ServiceResource>) {
        self.deps.register_dependency(resource).await;
    }

    pub async fn spawn<F, Fut>(&self, name: &str, func: F) -> &Self
    where
        F: (FnOnce(Arc<dyn CancellationToken>) -> Fut) + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register_dependency(Arc::new(TaskResource::spawn(name, func)))
            .await;
        self
    }

    pub async fn spawn_interruptable<Fut>(&self, name: &str, future: Fut) -> &Self
    where
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register_dependency(Arc::new(TaskResource::spawn_interruptable(name, future)))
            .await;
        self
    }
}
