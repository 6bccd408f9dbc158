//! The composition root's handle for waiting on the whole node's aggregate
//! health, adapted from the teacher's `RootResource`. This is where spec.md
//! §9's "explicit composition root constructed at process start ... torn down
//! at shutdown in reverse dependency order" lives: `mesh-node`'s `main`
//! constructs one `RootResource`, registers each component's resource group,
//! and blocks on `wait()`.

use std::sync::Arc;

use mesh_common::errors::Result;

use crate::cancellation::CancellationToken;
use crate::resource::{wait_for_termination, ServiceResource, ServiceResourceReport, ServiceResourceState};
use crate::resource_dependencies::ServiceResourceDependencies;

pub struct RootResource {
    deps: Arc<ServiceResourceDependencies>,
}

impl Default for RootResource {
    fn default() -> Self {
        Self::new()
    }
}

impl RootResource {
    pub fn new() -> Self {
        Self {
            deps: Arc::new(ServiceResourceDependencies::new(ServiceResourceReport {
                resource_name: "root".to_string(),
                self_state: ServiceResourceState::Ready,
                self_message: None,
                dependencies: vec![],
            })),
        }
    }

    pub async fn register_dependency(&self, resource: Arc<dyn ServiceResource>) {
        self.deps.register_dependency(resource).await;
    }

    /// Signals graceful shutdown: every registered resource's cancellation
    /// tokens fire, and `wait()` will return once they have all finished.
    pub async fn shutdown(&self) {
        self.deps
            .update_parent_report(ServiceResourceReport {
                resource_name: "root".to_string(),
                self_state: ServiceResourceState::Done,
                self_message: None,
                dependencies: vec![],
            })
            .await;
    }

    pub async fn wait(&self) -> Result<()> {
        let subscriber = self.deps.new_resource_subscriber().await;
        wait_for_termination(subscriber).await
    }
}
