use serde::Serialize;
use thiserror::Error;
use url::Url;

pub const MAX_NAME_CHARS: usize = 256;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("business name must not be empty")]
    EmptyName,
    #[error("business name is longer than {MAX_NAME_CHARS} characters")]
    NameTooLong,
    #[error("invalid website url {0:?}: {1}")]
    InvalidUrl(String, String),
    #[error("unsupported website url scheme {0:?}")]
    UnsupportedScheme(String),
}

/// A business submitted for classification. Only constructible through
/// [`BusinessInput::new`], so a value in hand is always valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusinessInput {
    name: String,
    description: Option<String>,
    website_url: Option<Url>,
}

impl BusinessInput {
    pub fn new(
        name: &str,
        description: Option<&str>,
        website_url: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(ValidationError::NameTooLong);
        }

        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let website_url = match website_url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(raw) => Some(parse_website_url(raw)?),
            None => None,
        };

        Ok(BusinessInput {
            name: name.to_string(),
            description,
            website_url,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn website_url(&self) -> Option<&Url> {
        self.website_url.as_ref()
    }
}

/// Accepts bare hosts like `example.com` by assuming https.
fn parse_website_url(raw: &str) -> Result<Url, ValidationError> {
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{}", raw))
            .map_err(|e| ValidationError::InvalidUrl(raw.to_string(), e.to_string()))?,
        Err(e) => return Err(ValidationError::InvalidUrl(raw.to_string(), e.to_string())),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidUrl(
            raw.to_string(),
            "missing host".to_string(),
        ));
    }

    Ok(parsed)
}
