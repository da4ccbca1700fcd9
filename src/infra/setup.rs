use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::{
            ledger::{InvoiceLogRepo, InvoiceRepo, PaymentRepo, UserRepo},
            paddle::PaddleApi,
        },
        use_cases::{
            checkout::CheckoutUseCases,
            reconciliation::{ReconcileDeps, ReconciliationUseCases},
            subscription_admin::SubscriptionAdminUseCases,
        },
    },
    infra::{
        config::AppConfig,
        error::InfraError,
        paddle_client::{PaddleClient, PaddleClientConfig},
        postgres_persistence,
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> Result<AppState, InfraError> {
    let config = AppConfig::from_env()?;

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);

    let invoice_repo_arc = postgres_arc.clone() as Arc<dyn InvoiceRepo>;
    let payment_repo_arc = postgres_arc.clone() as Arc<dyn PaymentRepo>;
    let user_repo_arc = postgres_arc.clone() as Arc<dyn UserRepo>;
    let invoice_log_arc = postgres_arc.clone() as Arc<dyn InvoiceLogRepo>;

    let paddle = Arc::new(
        PaddleClient::new(
            PaddleClientConfig {
                api_key: config.paddle_api_key.clone(),
                sandbox: config.paddle_sandbox,
                request_timeout: config.paddle_http_timeout,
                log_requests: !config.disable_postback_log,
            },
            invoice_log_arc.clone(),
        )
        .map_err(InfraError::PaddleClient)?,
    ) as Arc<dyn PaddleApi>;

    let reconciliation_use_cases = ReconciliationUseCases::new(ReconcileDeps {
        invoices: invoice_repo_arc.clone(),
        payments: payment_repo_arc.clone(),
        users: user_repo_arc.clone(),
        invoice_log: invoice_log_arc,
        paddle: paddle.clone(),
        policy: config.reconcile_policy(),
    });

    let checkout_use_cases = CheckoutUseCases::new(
        invoice_repo_arc.clone(),
        user_repo_arc,
        paddle.clone(),
        config.checkout_custom_data.clone(),
    );

    let subscription_admin_use_cases =
        SubscriptionAdminUseCases::new(invoice_repo_arc, payment_repo_arc, paddle);

    tracing::info!(
        sandbox = config.paddle_sandbox,
        signature_max_age_secs = config.signature_max_age_secs,
        admin_routes = config.admin_api_token.is_some(),
        "Application state initialized"
    );

    Ok(AppState {
        config: Arc::new(config),
        reconciliation_use_cases: Arc::new(reconciliation_use_cases),
        checkout_use_cases: Arc::new(checkout_use_cases),
        subscription_admin_use_cases: Arc::new(subscription_admin_use_cases),
    })
}

pub fn init_tracing() -> Result<(), InfraError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "paddle_reconciler=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs)
    let file = File::create("app.log").map_err(InfraError::LogFile)?;
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
    Ok(())
}
