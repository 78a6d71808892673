use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::service::moderation_service::NewMessage;

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageDto {
    #[validate(length(min = 1, message = "recipientId is required"))]
    pub recipient_id: String,
    pub request_id: Option<String>,
    #[validate(length(min = 1, max = 5000, message = "Message must be between 1-5000 characters"))]
    pub content: String,
    #[validate(length(max = 10, message = "At most 10 attachments"))]
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl From<SendMessageDto> for NewMessage {
    fn from(dto: SendMessageDto) -> Self {
        NewMessage {
            recipient_id: dto.recipient_id,
            request_id: dto.request_id.filter(|id| !id.is_empty()),
            content: dto.content,
            attachments: dto.attachments,
        }
    }
}
