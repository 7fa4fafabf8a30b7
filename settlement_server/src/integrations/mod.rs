pub mod processor;

pub use processor::PaymentGateway;
