pub mod checkout;
pub mod reconciliation;
pub mod subscription_admin;
