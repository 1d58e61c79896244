use std::sync::Arc;

use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    auth::AuthVerifier,
    config::Config,
    copywriting::Copywriter,
    credits::CreditLedger,
    gemini_api::GeminiApiClient,
    generation::{GenerationRelay, TextGenerator},
    payments::{CashfreeClient, PaymentGateway, PaymentService},
};

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<Config>,
    db: DBService,
    relay: GenerationRelay,
    copywriter: Copywriter,
    ledger: CreditLedger,
    payments: PaymentService,
    auth: AuthVerifier,
}

impl LocalDeployment {
    /// Wires the real backends described by `config`.
    pub async fn from_config(config: Config) -> Result<Self, DeploymentError> {
        let db = DBService::new(&config.database_url).await?;

        let gemini = GeminiApiClient::new(
            config.gemini.api_key.clone(),
            config.gemini.model.clone(),
            config.gemini.base_url.clone(),
        )?;
        if config.gemini.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; generation requests will fail");
        }

        let gateway = match &config.cashfree {
            Some(cashfree) => {
                tracing::info!(environment = %cashfree.environment, "Cashfree payments enabled");
                Some(Arc::new(CashfreeClient::new(cashfree)?) as Arc<dyn PaymentGateway>)
            }
            None => {
                tracing::info!("Cashfree credentials not set; payments disabled");
                None
            }
        };

        let auth = AuthVerifier::from_config(&config.auth)?;

        Ok(Self::from_parts(config, db, Arc::new(gemini), gateway, auth))
    }

    /// Assembles a deployment from already-built parts.
    pub fn from_parts(
        config: Config,
        db: DBService,
        generator: Arc<dyn TextGenerator>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        auth: AuthVerifier,
    ) -> Self {
        let ledger = CreditLedger::new(
            db.pool.clone(),
            config.daily_credits,
            config.admin_email.clone(),
        );
        let payments =
            PaymentService::new(db.pool.clone(), gateway, ledger.clone(), config.app_url.clone());

        Self {
            relay: GenerationRelay::new(generator.clone()),
            copywriter: Copywriter::new(generator),
            config: Arc::new(config),
            db,
            ledger,
            payments,
            auth,
        }
    }
}

impl Deployment for LocalDeployment {
    fn config(&self) -> &Config {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn relay(&self) -> &GenerationRelay {
        &self.relay
    }

    fn copywriter(&self) -> &Copywriter {
        &self.copywriter
    }

    fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    fn payments(&self) -> &PaymentService {
        &self.payments
    }

    fn auth(&self) -> &AuthVerifier {
        &self.auth
    }
}
