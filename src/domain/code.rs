use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CodeType {
    Mcc,
    Naics,
    Sic,
}

impl CodeType {
    pub const ALL: [CodeType; 3] = [CodeType::Mcc, CodeType::Naics, CodeType::Sic];

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::Mcc => "MCC",
            CodeType::Naics => "NAICS",
            CodeType::Sic => "SIC",
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MCC" => Ok(CodeType::Mcc),
            "NAICS" => Ok(CodeType::Naics),
            "SIC" => Ok(CodeType::Sic),
            other => Err(format!("{} is not a supported code type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodeOrigin {
    IndustryMapping,
    KeywordMatch,
    Crosswalk,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndustryCode {
    pub code_type: CodeType,
    pub code: String,
    pub description: String,
    pub confidence_within_type: f64,
    pub origin: CodeOrigin,
}
