//! `TestAppStateBuilder` creates an `AppState` over the in-memory ledger and
//! the Paddle mock, for HTTP-level tests.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::http::HeaderValue;
use secrecy::SecretString;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        checkout::CheckoutUseCases,
        reconciliation::{ReconcilePolicy, ReconciliationUseCases},
        subscription_admin::SubscriptionAdminUseCases,
    },
    domain::entities::{
        invoice::{Invoice, InvoiceItem},
        user::User,
    },
    infra::config::AppConfig,
    test_utils::{InMemoryLedger, MockPaddleApi, reconcile_deps_with_policy},
};

pub const TEST_WEBHOOK_SECRET: &str = "pdl_ntfset_test_secret";
pub const TEST_ADMIN_TOKEN: &str = "admin_test_token";

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/unused".to_string(),
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        paddle_api_key: SecretString::new("pdl_test_key".into()),
        paddle_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
        paddle_sandbox: true,
        signature_max_age_secs: 300,
        paddle_http_timeout: Duration::from_secs(5),
        lock_on_chargeback: true,
        lock_on_chargeback_warning: false,
        unlock_on_chargeback_reverse: true,
        admin_api_token: Some(SecretString::new(TEST_ADMIN_TOKEN.into())),
        checkout_custom_data: vec![],
        disable_postback_log: false,
    }
}

pub struct TestAppStateBuilder {
    ledger: InMemoryLedger,
    paddle: MockPaddleApi,
    config: AppConfig,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            ledger: InMemoryLedger::new(),
            paddle: MockPaddleApi::new(),
            config: test_config(),
        }
    }

    pub fn with_invoice(mut self, invoice: Invoice) -> Self {
        self.ledger = self.ledger.with_invoice(invoice);
        self
    }

    pub fn with_items(mut self, invoice_id: Uuid, items: Vec<InvoiceItem>) -> Self {
        self.ledger = self.ledger.with_items(invoice_id, items);
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.ledger = self.ledger.with_user(user);
        self
    }

    pub fn with_paddle(mut self, paddle: MockPaddleApi) -> Self {
        self.paddle = paddle;
        self
    }

    pub fn with_config(mut self, overrides: impl FnOnce(&mut AppConfig)) -> Self {
        overrides(&mut self.config);
        self
    }

    /// Returns the state plus the mocks behind it for assertions.
    pub fn build_with_mocks(self) -> (AppState, Arc<InMemoryLedger>, Arc<MockPaddleApi>) {
        let ledger = Arc::new(self.ledger);
        let paddle = Arc::new(self.paddle);
        let policy: ReconcilePolicy = self.config.reconcile_policy();

        let reconciliation = ReconciliationUseCases::new(reconcile_deps_with_policy(
            ledger.clone(),
            paddle.clone(),
            policy,
        ));
        let checkout = CheckoutUseCases::new(
            ledger.clone(),
            ledger.clone(),
            paddle.clone(),
            self.config.checkout_custom_data.clone(),
        );
        let admin = SubscriptionAdminUseCases::new(ledger.clone(), ledger.clone(), paddle.clone());

        let app_state = AppState {
            config: Arc::new(self.config),
            reconciliation_use_cases: Arc::new(reconciliation),
            checkout_use_cases: Arc::new(checkout),
            subscription_admin_use_cases: Arc::new(admin),
        };
        (app_state, ledger, paddle)
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().0
    }
}
