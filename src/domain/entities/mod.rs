pub mod billing_period;
pub mod event;
pub mod invoice;
pub mod money;
pub mod paddle_payload;
pub mod payment;
pub mod user;
