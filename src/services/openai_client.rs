use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;

use super::ml_client::{MlError, ModelBackend, ModelPrediction};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Chat-completion model asked to answer with `{"label", "confidence"}`.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        OpenAiBackend {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn predict(&self, text: &str, labels: &[String]) -> Result<ModelPrediction, MlError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(build_prompt(text, labels))
                .build()
                .map_err(to_ml_error)?
                .into()])
            .max_tokens(100_u32)
            .temperature(0.0)
            .build()
            .map_err(to_ml_error)?;

        let response = self.client.chat().create(request).await.map_err(to_ml_error)?;
        log::debug!("OpenAI usage: {:?}", response.usage);

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| MlError::InvalidResponse("no content in completion".to_string()))?;

        parse_prediction(&content)
    }

    async fn health(&self) -> bool {
        match self.client.models().list().await {
            Ok(_) => true,
            Err(e) => {
                log::debug!("OpenAI health check failed. Error: {}", e);
                false
            }
        }
    }
}

fn build_prompt(text: &str, labels: &[String]) -> String {
    let choices = match labels.is_empty() {
        true => "any short industry name".to_string(),
        false => labels.join(", "),
    };
    format!(
        r#"Classify the business described below into exactly one industry.
Choose from: {}.
Answer only with JSON like {{"label": "<industry>", "confidence": <0.0 to 1.0>}}.

Business text:
{}"#,
        choices, text
    )
}

/// Pulls the first JSON object out of a completion, tolerating code fences
/// and chatter around it.
fn parse_prediction(content: &str) -> Result<ModelPrediction, MlError> {
    let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) else {
        return Err(MlError::InvalidResponse(content.to_string()));
    };
    if end < start {
        return Err(MlError::InvalidResponse(content.to_string()));
    }

    serde_json::from_str(&content[start..=end]).map_err(|e| MlError::InvalidResponse(e.to_string()))
}

fn to_ml_error(e: OpenAIError) -> MlError {
    match e {
        OpenAIError::Reqwest(e) => MlError::ServiceUnavailable(e.to_string()),
        OpenAIError::ApiError(e) => {
            match rejection_status(e.r#type.as_deref(), e.code.as_deref()) {
                Some(status) => MlError::Rejected(status),
                None => MlError::ServiceUnavailable(e.message),
            }
        }
        OpenAIError::InvalidArgument(_) => MlError::Rejected(400),
        other => MlError::InvalidResponse(other.to_string()),
    }
}

/// Status for API errors caused by our own request or credentials. Those
/// never count against the breaker.
fn rejection_status(error_type: Option<&str>, code: Option<&str>) -> Option<u16> {
    match (error_type, code) {
        (_, Some("invalid_api_key")) | (Some("authentication_error"), _) => Some(401),
        (Some("permission_error"), _) => Some(403),
        (_, Some("model_not_found")) => Some(404),
        (Some("invalid_request_error"), _) => Some(400),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{build_prompt, parse_prediction, rejection_status};
    use crate::services::ml_client::MlError;

    #[test]
    fn parses_fenced_json() {
        let prediction =
            parse_prediction("```json\n{\"label\": \"Restaurants\", \"confidence\": 0.82}\n```")
                .unwrap();

        assert_eq!(prediction.label, "Restaurants");
        assert_eq!(prediction.confidence, 0.82);
    }

    #[test]
    fn rejects_text_without_json() {
        assert!(matches!(
            parse_prediction("I think it is a restaurant"),
            Err(MlError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_prediction("} nope {"),
            Err(MlError::InvalidResponse(_))
        ));
    }

    #[test]
    fn client_side_api_errors_are_rejections() {
        assert_eq!(
            rejection_status(Some("invalid_request_error"), Some("invalid_api_key")),
            Some(401)
        );
        assert_eq!(
            rejection_status(Some("invalid_request_error"), Some("model_not_found")),
            Some(404)
        );
        assert_eq!(rejection_status(Some("invalid_request_error"), None), Some(400));
        assert_eq!(rejection_status(Some("permission_error"), None), Some(403));

        assert_eq!(rejection_status(Some("server_error"), None), None);
        assert_eq!(rejection_status(Some("requests"), Some("rate_limit_exceeded")), None);
        assert_eq!(rejection_status(None, None), None);
        assert!(!MlError::Rejected(401).counts_as_failure());
    }

    #[test]
    fn prompt_lists_labels() {
        let prompt = build_prompt("pizza", &["Restaurants".to_string(), "Retail".to_string()]);

        assert!(prompt.contains("Choose from: Restaurants, Retail."));
        assert!(prompt.contains(r#"{"label": "<industry>""#));
    }
}
