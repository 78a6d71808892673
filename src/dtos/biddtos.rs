use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::bidmodel::{BidOrigin, LineItem, ProfessionalBid},
    service::bid_service::{BidLines, NewBid, SubmittedBid},
    utils::pricing::{ClientTotals, Money},
};

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemDto {
    #[validate(length(min = 1, max = 500, message = "Description is required"))]
    pub description: String,
    #[validate(range(min = 0.001, max = 1000000.0, message = "Quantity must be between 0.001 and 1000000"))]
    pub quantity: f64,
    #[validate(range(min = 0.0, max = 10000000.0, message = "Unit price must be zero or more"))]
    pub unit_price: f64,
}

impl From<LineItemDto> for LineItem {
    fn from(dto: LineItemDto) -> Self {
        LineItem {
            description: dto.description,
            quantity: dto.quantity,
            unit_price: Money::from_euros(dto.unit_price),
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidLinesDto {
    #[validate]
    pub labor_details: LineItemDto,
    #[validate]
    #[serde(default)]
    pub consumable_materials: Vec<LineItemDto>,
    #[validate]
    #[serde(default)]
    pub non_consumable_materials: Vec<LineItemDto>,
}

impl From<BidLinesDto> for BidLines {
    fn from(dto: BidLinesDto) -> Self {
        BidLines {
            labor: dto.labor_details.into(),
            consumables: dto.consumable_materials.into_iter().map(LineItem::from).collect(),
            non_consumables: dto
                .non_consumable_materials
                .into_iter()
                .map(LineItem::from)
                .collect(),
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBidDto {
    #[validate]
    #[serde(flatten)]
    pub lines: BidLinesDto,
    /// Totals as displayed to the professional; only compared.
    pub totals: Option<ClientTotals>,
    #[serde(default)]
    pub origin: BidOrigin,
}

impl From<CreateBidDto> for NewBid {
    fn from(dto: CreateBidDto) -> Self {
        NewBid {
            lines: dto.lines.into(),
            client_totals: dto.totals,
            origin: dto.origin,
        }
    }
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftBidDto {
    #[validate(length(min = 1, message = "requestId is required"))]
    pub request_id: String,
    #[validate]
    #[serde(flatten)]
    pub lines: BidLinesDto,
    #[serde(default)]
    pub origin: BidOrigin,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SubmitDraftDto {
    pub totals: Option<ClientTotals>,
}

#[derive(Validate, Debug, Default, Clone, Serialize, Deserialize)]
pub struct RefuseBidDto {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleTotalsWarning {
    pub field: &'static str,
    pub client: f64,
    pub computed: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedBidDto {
    pub bid: ProfessionalBid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_totals: Option<StaleTotalsWarning>,
}

impl From<SubmittedBid> for SubmittedBidDto {
    fn from(submitted: SubmittedBid) -> Self {
        SubmittedBidDto {
            bid: submitted.bid,
            stale_totals: submitted.stale_totals.map(|stale| StaleTotalsWarning {
                field: stale.field,
                client: stale.client,
                computed: stale.computed,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDataDto {
    pub bid_id: String,
    pub reference: String,
}

/// Body of the payment provider callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhookDto {
    pub event: String,
    pub data: PaymentDataDto,
}
