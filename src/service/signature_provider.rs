// service/signature_provider.rs
use async_trait::async_trait;

use crate::{
    models::{accountmodel::Account, bidmodel::ProfessionalBid},
    service::error::CollaboratorError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SignatureOutcome {
    Signed { reference: String },
    Declined { reason: String },
}

#[async_trait]
pub trait SignatureProvider: Send + Sync + std::fmt::Debug {
    async fn request_signature(
        &self,
        bid: &ProfessionalBid,
        signer: &Account,
    ) -> Result<SignatureOutcome, CollaboratorError>;
}

/// Signs everything immediately. Development only.
#[derive(Debug, Clone, Default)]
pub struct AutoSignatureProvider;

#[async_trait]
impl SignatureProvider for AutoSignatureProvider {
    async fn request_signature(
        &self,
        bid: &ProfessionalBid,
        signer: &Account,
    ) -> Result<SignatureOutcome, CollaboratorError> {
        tracing::info!("✍️ Auto-signing bid {} for {}", bid.id, signer.email);
        Ok(SignatureOutcome::Signed {
            reference: format!("auto-{}", bid.id),
        })
    }
}
