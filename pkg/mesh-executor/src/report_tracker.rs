//! Versioned container for a `ServiceResourceReport`, adapted from the
//! teacher's `ServiceResourceReportTracker`.

use std::sync::Arc;

use async_std::sync::Mutex;
use event_listener::Event;

use crate::resource::{ServiceResourceReport, ServiceResourceState, ServiceResourceSubscriber};

#[derive(Clone)]
pub struct ServiceResourceReportTracker {
    shared: Arc<Shared>,
}

struct Shared {
    value: Mutex<(u64, ServiceResourceReport)>,
    event: Event,
}

impl ServiceResourceReportTracker {
    pub fn new(initial: ServiceResourceReport) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new((1, initial)),
                event: Event::new(),
            }),
        }
    }

    pub async fn current_value(&self) -> ServiceResourceReport {
        self.shared.value.lock().await.1.clone()
    }

    pub async fn update(&self, report: ServiceResourceReport) {
        let mut v = self.shared.value.lock().await;
        v.0 += 1;
        v.1 = report;
        self.shared.event.notify(usize::MAX);
    }

    pub async fn update_self(&self, state: ServiceResourceState, message: Option<String>) {
        let mut v = self.shared.value.lock().await;
        v.0 += 1;
        v.1.self_state = state;
        v.1.self_message = message;
        if state == ServiceResourceState::PermanentFailure {
            eprintln!(
                "resource permanent failure: {}: {}",
                v.1.resource_name,
                v.1.self_message.as_deref().unwrap_or("")
            );
        }
        self.shared.event.notify(usize::MAX);
    }

    pub fn subscribe(&self) -> Box<dyn ServiceResourceSubscriber> {
        Box::new(Subscriber {
            last_version: 0,
            shared: self.shared.clone(),
        })
    }
}

struct Subscriber {
    shared: Arc<Shared>,
    last_version: u64,
}

#[async_trait::async_trait]
impl ServiceResourceSubscriber for Subscriber {
    async fn wait_for_change(&mut self) {
        loop {
            {
                let v = self.shared.value.lock().await;
                if v.0 > self.last_version {
                    return;
                }
            }
            let listener = self.shared.event.listen();
            {
                let v = self.shared.value.lock().await;
                if v.0 > self.last_version {
                    return;
                }
            }
            listener.await;
        }
    }

    async fn value(&mut self) -> ServiceResourceReport {
        let v = self.shared.value.lock().await;
        self.last_version = v.0;
        v.1.clone()
    }
}
