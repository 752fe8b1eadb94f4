//! AI Provider Config - AI 服务商配置
//!
//! 每个服务商（按名称）至多一条记录，与书籍无关

use serde::{Deserialize, Serialize};

use super::serde_ext::null_as_default;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiProviderConfig {
    #[serde(deserialize_with = "null_as_default")]
    pub model: String,
    #[serde(deserialize_with = "null_as_default")]
    pub api_key: String,
    #[serde(
        rename = "baseURL",
        alias = "baseUrl",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_url: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AiProviderConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            api_key: String::new(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 2000,
            top_p: 1.0,
            system_prompt: None,
        }
    }
}

impl AiProviderConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }
}
