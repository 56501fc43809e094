//! Hook event dispatch.

use async_trait::async_trait;
use std::sync::Arc;
use taker_types::HookEvent;
use tracing::debug;

/// Operator-supplied event callback.
#[async_trait]
pub trait HookHandler: Send + Sync {
	fn name(&self) -> &str;

	async fn on_event(&self, event: &HookEvent);
}

/// Fans events out to all registered handlers.
///
/// Dispatch is fire-and-forget: a slow or failing handler never stalls the
/// pipeline.
#[derive(Default)]
pub struct HookDispatcher {
	handlers: Vec<Arc<dyn HookHandler>>,
}

impl HookDispatcher {
	pub fn new(handlers: Vec<Arc<dyn HookHandler>>) -> Self {
		Self { handlers }
	}

	pub fn dispatch(&self, event: HookEvent) {
		debug!(kind = event.kind(), "dispatching hook event");
		for handler in &self.handlers {
			let handler = handler.clone();
			let event = event.clone();
			tokio::spawn(async move {
				handler.on_event(&event).await;
			});
		}
	}

	pub fn is_empty(&self) -> bool {
		self.handlers.is_empty()
	}
}
