use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::{
    models::quotemodel::Address,
    service::quote_service::{NewQuoteRequest, QuoteRequestChanges},
};

fn validate_postal_code(postal_code: &str) -> Result<(), ValidationError> {
    if postal_code.len() == 5 && postal_code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut error = ValidationError::new("invalid_postal_code");
        error.message = Some(Cow::from("Postal code must be 5 digits"));
        Err(error)
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressDto {
    #[validate(length(min = 1, max = 255, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(custom = "validate_postal_code")]
    pub postal_code: String,
}

impl From<AddressDto> for Address {
    fn from(dto: AddressDto) -> Self {
        Address {
            street: dto.street.trim().to_string(),
            city: dto.city.trim().to_string(),
            postal_code: dto.postal_code,
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuoteRequestDto {
    #[validate(length(min = 1, max = 100, message = "Project type is required"))]
    pub project_type: String,
    #[validate(range(min = 0.1, max = 100000.0, message = "Surface area must be a positive number of m²"))]
    pub surface_area: f64,
    #[validate(length(min = 1, max = 5000, message = "Description must be between 1-5000 characters"))]
    pub description: String,
    #[validate]
    pub address: AddressDto,
    #[serde(default)]
    pub photos: Vec<String>,
}

impl From<CreateQuoteRequestDto> for NewQuoteRequest {
    fn from(dto: CreateQuoteRequestDto) -> Self {
        NewQuoteRequest {
            project_type: dto.project_type,
            surface_area: dto.surface_area,
            description: dto.description,
            address: dto.address.into(),
            photos: dto.photos,
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuoteRequestDto {
    #[validate(length(min = 1, max = 100, message = "Project type cannot be empty"))]
    pub project_type: Option<String>,
    #[validate(range(min = 0.1, max = 100000.0, message = "Surface area must be a positive number of m²"))]
    pub surface_area: Option<f64>,
    #[validate(length(min = 1, max = 5000, message = "Description must be between 1-5000 characters"))]
    pub description: Option<String>,
    #[validate]
    pub address: Option<AddressDto>,
}

impl From<UpdateQuoteRequestDto> for QuoteRequestChanges {
    fn from(dto: UpdateQuoteRequestDto) -> Self {
        QuoteRequestChanges {
            project_type: dto.project_type,
            surface_area: dto.surface_area,
            description: dto.description,
            address: dto.address.map(Address::from),
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RefuseDto {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoQueryDto {
    #[validate(length(min = 1, max = 200, message = "fileName is required"))]
    pub file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(postal_code: &str) -> AddressDto {
        AddressDto {
            street: "12 rue Paradis".into(),
            city: "Marseille".into(),
            postal_code: postal_code.into(),
        }
    }

    #[test]
    fn nested_address_is_checked() {
        let mut dto = CreateQuoteRequestDto {
            project_type: "etancheite_terrasse".into(),
            surface_area: 40.0,
            description: "Terrasse de 40 m² à refaire".into(),
            address: address("13001"),
            photos: vec![],
        };
        assert!(dto.validate().is_ok());

        dto.address = address("1300");
        assert!(dto.validate().is_err());
    }

    #[test]
    fn surface_must_be_positive() {
        let dto = CreateQuoteRequestDto {
            project_type: "etancheite_toiture".into(),
            surface_area: 0.0,
            description: "Toit".into(),
            address: address("13001"),
            photos: vec![],
        };
        assert!(dto.validate().is_err());
    }
}
