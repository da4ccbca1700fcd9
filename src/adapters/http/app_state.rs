use std::sync::Arc;

use crate::{
    application::use_cases::{
        checkout::CheckoutUseCases, reconciliation::ReconciliationUseCases,
        subscription_admin::SubscriptionAdminUseCases,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub reconciliation_use_cases: Arc<ReconciliationUseCases>,
    pub checkout_use_cases: Arc<CheckoutUseCases>,
    pub subscription_admin_use_cases: Arc<SubscriptionAdminUseCases>,
}
