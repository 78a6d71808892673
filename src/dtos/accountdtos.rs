use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{
    models::accountmodel::{ApprovalStatus, BankingDetails, ProfessionalDocuments, Role},
    service::account_service::{NewProfessionalProfile, Registration},
};

/// 14 digits passing the Luhn check.
pub fn validate_siret(siret: &str) -> Result<(), ValidationError> {
    let digits: Vec<u32> = siret
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default();

    let luhn_ok = digits.len() == 14 && {
        let sum: u32 = digits
            .iter()
            .rev()
            .enumerate()
            .map(|(i, d)| {
                if i % 2 == 1 {
                    let doubled = d * 2;
                    if doubled > 9 { doubled - 9 } else { doubled }
                } else {
                    *d
                }
            })
            .sum();
        sum % 10 == 0
    };

    if luhn_ok {
        Ok(())
    } else {
        let mut error = ValidationError::new("invalid_siret");
        error.message = Some(Cow::from("SIRET must be 14 digits with a valid checksum"));
        Err(error)
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankingDetailsDto {
    #[validate(length(min = 15, max = 34, message = "IBAN must be between 15-34 characters"))]
    pub iban: String,
    #[validate(length(min = 8, max = 11, message = "BIC must be 8 or 11 characters"))]
    pub bic: String,
    #[validate(length(min = 1, message = "Account holder is required"))]
    pub holder: String,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalProfileDto {
    #[validate(length(min = 1, max = 200, message = "Company name is required"))]
    pub company_name: String,
    #[validate(custom = "validate_siret")]
    pub siret: String,
    #[validate]
    pub banking_details: BankingDetailsDto,
    #[serde(default)]
    pub documents: ProfessionalDocuments,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAccountDto {
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "Display name must be between 1-100 characters"))]
    pub display_name: String,
    pub role: Role,
    #[validate]
    pub professional: Option<ProfessionalProfileDto>,
}

impl From<RegisterAccountDto> for Registration {
    fn from(dto: RegisterAccountDto) -> Self {
        Registration {
            email: dto.email,
            display_name: dto.display_name,
            role: dto.role,
            professional: dto.professional.map(|p| NewProfessionalProfile {
                company_name: p.company_name,
                siret: p.siret.split_whitespace().collect(),
                banking_details: BankingDetails {
                    iban: p.banking_details.iban.replace(' ', "").to_uppercase(),
                    bic: p.banking_details.bic.to_uppercase(),
                    holder: p.banking_details.holder,
                },
                documents: p.documents,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetApprovalDto {
    pub approval_status: ApprovalStatus,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProfessionalQueryDto {
    pub status: Option<ApprovalStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn siret_checksum() {
        assert!(validate_siret("73282932000074").is_ok());
        assert!(validate_siret("732 829 320 00074").is_ok());
        assert!(validate_siret("73282932000075").is_err());
        assert!(validate_siret("7328293200007").is_err());
        assert!(validate_siret("7328293200007A").is_err());
    }

    #[test]
    fn professional_block_is_validated() {
        let dto = RegisterAccountDto {
            email: "pro@example.fr".into(),
            display_name: "Toitures du Sud".into(),
            role: Role::Professional,
            professional: Some(ProfessionalProfileDto {
                company_name: "Toitures du Sud".into(),
                siret: "123".into(),
                banking_details: BankingDetailsDto {
                    iban: "FR7630006000011234567890189".into(),
                    bic: "AGRIFRPP".into(),
                    holder: "Toitures du Sud".into(),
                },
                documents: ProfessionalDocuments::default(),
            }),
        };
        assert!(dto.validate().is_err());
    }
}
