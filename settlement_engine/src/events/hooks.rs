use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    DisputeClosedEvent,
    EventHandler,
    EventProducer,
    Handler,
    PurchaseSettledEvent,
    RefundSettledEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub purchase_settled_producer: Vec<EventProducer<PurchaseSettledEvent>>,
    pub refund_settled_producer: Vec<EventProducer<RefundSettledEvent>>,
    pub dispute_closed_producer: Vec<EventProducer<DisputeClosedEvent>>,
}

pub struct EventHandlers {
    pub on_purchase_settled: Option<EventHandler<PurchaseSettledEvent>>,
    pub on_refund_settled: Option<EventHandler<RefundSettledEvent>>,
    pub on_dispute_closed: Option<EventHandler<DisputeClosedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_purchase_settled = hooks.on_purchase_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_settled = hooks.on_refund_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_dispute_closed = hooks.on_dispute_closed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_purchase_settled, on_refund_settled, on_dispute_closed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_purchase_settled {
            result.purchase_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_settled {
            result.refund_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispute_closed {
            result.dispute_closed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_purchase_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_dispute_closed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_purchase_settled: Option<Handler<PurchaseSettledEvent>>,
    pub on_refund_settled: Option<Handler<RefundSettledEvent>>,
    pub on_dispute_closed: Option<Handler<DisputeClosedEvent>>,
}

impl EventHooks {
    pub fn on_purchase_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PurchaseSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_purchase_settled = Some(Arc::new(f));
        self
    }

    pub fn on_refund_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_refund_settled = Some(Arc::new(f));
        self
    }

    pub fn on_dispute_closed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DisputeClosedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_dispute_closed = Some(Arc::new(f));
        self
    }
}
