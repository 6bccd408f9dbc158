//! `ServiceResource` lifecycle, adapted from the teacher's
//! `executor_multitask::resource` module: every long-lived task in a node
//! (link reader/writer, consensus apply loop, outbox dispatcher, scheduler)
//! is a `ServiceResource` so the composition root can observe aggregate
//! health and drive ordered shutdown without a back-pointer to the rest of
//! the node (spec.md §9's "capability interfaces" note).

use std::fmt;
use std::sync::Arc;

use crate::cancellation::CancellationToken;

#[async_trait::async_trait]
pub trait ServiceResource: Send + Sync + 'static {
    /// Registers a token which, once cancelled, should begin this resource's
    /// shutdown.
    async fn add_cancellation_token(&self, token: Arc<dyn CancellationToken>);

    /// A fresh subscriber for observing this resource's current/ future
    /// reports.
    async fn new_resource_subscriber(&self) -> Box<dyn ServiceResourceSubscriber>;

    async fn wait_for_termination(&self) -> mesh_common::errors::Result<()> {
        let subscriber = self.new_resource_subscriber().await;
        wait_for_termination(subscriber).await
    }
}

pub(crate) async fn wait_for_termination(
    mut subscriber: Box<dyn ServiceResourceSubscriber>,
) -> mesh_common::errors::Result<()> {
    loop {
        let report = subscriber.value().await;
        match report.overall_state() {
            ServiceResourceState::PermanentFailure => {
                return Err(mesh_common::errors::format_err!(
                    "resource failed: {}",
                    report.overall_message().unwrap_or_default()
                ));
            }
            ServiceResourceState::Done => return Ok(()),
            _ => subscriber.wait_for_change().await,
        }
    }
}

#[async_trait::async_trait]
pub trait ServiceResourceSubscriber: Send + Sync + 'static {
    async fn wait_for_change(&mut self);
    async fn value(&mut self) -> ServiceResourceReport;
}

#[derive(Clone)]
pub struct ServiceResourceReport {
    pub resource_name: String,
    pub self_state: ServiceResourceState,
    pub self_message: Option<String>,
    pub dependencies: Vec<ServiceResourceReport>,
}

impl ServiceResourceReport {
    pub fn overall_state(&self) -> ServiceResourceState {
        let mut state = self.self_state;
        for dep in &self.dependencies {
            state = state.merge(dep.overall_state());
        }
        state
    }

    pub fn overall_message(&self) -> Option<String> {
        if self.self_message.is_some() {
            return self.self_message.clone();
        }
        self.dependencies.iter().find_map(|d| d.overall_message())
    }
}

impl fmt::Debug for ServiceResourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.resource_name, self.self_state)?;
        for dep in &self.dependencies {
            write!(f, "\n  - {:?}", dep)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ServiceResourceState {
    Loading,
    Ready,
    Stopping,
    TemporaryFailure,
    PermanentFailure,
    Done,
}

impl ServiceResourceState {
    pub fn merge(&self, other: Self) -> Self {
        use ServiceResourceState::*;
        if *self == PermanentFailure || other == PermanentFailure {
            return PermanentFailure;
        }
        if *self == TemporaryFailure || other == TemporaryFailure {
            return TemporaryFailure;
        }
        if *self == Stopping || other == Stopping {
            return Stopping;
        }
        if *self == Loading || other == Loading {
            return Loading;
        }
        if *self == Done && other == Done {
            return Done;
        }
        Ready
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PermanentFailure | Self::Done)
    }
}
