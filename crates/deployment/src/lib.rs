use db::DBService;
use services::services::{
    auth::{AuthError, AuthVerifier},
    config::Config,
    copywriting::Copywriter,
    credits::CreditLedger,
    gemini_api::GeminiApiError,
    generation::GenerationRelay,
    payments::{PaymentError, PaymentService},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Gemini(#[from] GeminiApiError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Everything a request handler can reach. Cheap to clone.
pub trait Deployment: Clone + Send + Sync + 'static {
    fn config(&self) -> &Config;

    fn db(&self) -> &DBService;

    fn relay(&self) -> &GenerationRelay;

    fn copywriter(&self) -> &Copywriter;

    fn ledger(&self) -> &CreditLedger;

    fn payments(&self) -> &PaymentService;

    fn auth(&self) -> &AuthVerifier;
}
