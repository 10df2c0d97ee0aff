//! [`Generator`] backed by the Gemini API.

use super::{parse_sentence, prompt, GenerationError, GenerationOutcome, GenerationRequest, Generator};
use crate::config::Config;
use async_trait::async_trait;
use gemini::{Content, Gemini, Request};

/// Upper bound on reply length; one sentence wrapped in a small JSON object.
const DEFAULT_MAX_OUTPUT_TOKENS: usize = 256;

/// Generates sentences with a Gemini model.
///
/// The key travels with each request. When a request carries none, the
/// deployment-level default is used; with neither, the call fails as
/// [`FailureKind::CredentialInvalid`](super::FailureKind::CredentialInvalid)
/// without touching the network.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Gemini,
    default_credential: Option<String>,
    temperature: Option<f32>,
    max_output_tokens: usize,
}

impl GeminiGenerator {
    /// Wrap an existing client. Its own key is ignored in favour of per-request keys.
    pub fn new(client: Gemini) -> Self {
        Self {
            client,
            default_credential: None,
            temperature: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    /// Build a generator from runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut client = Gemini::new("")
            .with_model(&config.model)
            .with_base_url(&config.api_base);
        if let Some(timeout) = config.request_timeout {
            client = client.with_timeout(timeout);
        }

        let mut generator = Self::new(client).with_max_output_tokens(config.max_output_tokens);
        generator.temperature = config.temperature;
        generator.default_credential = config.default_credential.clone();
        generator
    }

    /// Key used when a request does not carry one.
    pub fn with_default_credential(mut self, credential: impl Into<String>) -> Self {
        self.default_credential = Some(credential.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    fn resolve_credential<'a>(&'a self, request: &'a GenerationRequest) -> Option<&'a str> {
        request
            .credential()
            .or(self.default_credential.as_deref())
            .filter(|key| !key.trim().is_empty())
    }

    fn build_request(&self, request: &GenerationRequest) -> Request {
        let mut api_request = Request::new(vec![Content::user(prompt::render(request))])
            .with_max_output_tokens(self.max_output_tokens)
            .with_response_schema(prompt::response_schema());
        if let Some(temperature) = self.temperature {
            api_request = api_request.with_temperature(temperature);
        }
        api_request
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        let Some(key) = self.resolve_credential(request) else {
            return Err(GenerationError::credential_invalid(
                "no API key supplied and no default key configured",
            ));
        };

        let response = self
            .client
            .with_api_key(key)
            .generate(self.build_request(request))
            .await
            .map_err(classify_client_error)?;

        match response.text() {
            Some(text) => parse_sentence(text),
            None => Err(GenerationError::malformed(match &response.block_reason {
                Some(reason) => format!("service returned no candidates (blocked: {reason})"),
                None => "service returned no candidates".to_string(),
            })),
        }
    }
}

/// Map a client error onto the failure taxonomy.
fn classify_client_error(err: gemini::Error) -> GenerationError {
    match err {
        gemini::Error::Parse(detail) => GenerationError::malformed(detail),
        other => GenerationError::from_failure_message(other.to_string()),
    }
}
