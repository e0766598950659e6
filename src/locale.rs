use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resolved UI locale. Drives both the translated messages and the language
/// the model is asked to answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Zh,
    En,
}

impl Locale {
    pub fn tag(self) -> &'static str {
        match self {
            Locale::Zh => "zh",
            Locale::En => "en",
        }
    }

    /// Natural-language name embedded in the prompt.
    pub fn output_language(self) -> &'static str {
        match self {
            Locale::Zh => "Chinese",
            Locale::En => "English",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" => Ok(Locale::Zh),
            "en" | "en-us" => Ok(Locale::En),
            other => Err(anyhow!("Unsupported locale: {}", other)),
        }
    }
}

/// User-facing strings the UI boundary hands to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Messages {
    pub empty_input: String,
    pub too_long: String,
    pub search_failed: String,
    pub copy_failed: String,
}

impl Messages {
    pub fn for_locale(locale: Locale) -> Self {
        match locale {
            Locale::Zh => Self {
                empty_input: "请输入搜索内容".to_string(),
                too_long: "搜索内容不能超过100个字符".to_string(),
                search_failed: "搜索失败，请稍后重试".to_string(),
                copy_failed: "复制失败，请重试".to_string(),
            },
            Locale::En => Self {
                empty_input: "Please enter a search term".to_string(),
                too_long: "Search term must be 100 characters or fewer".to_string(),
                search_failed: "Search failed, please try again later".to_string(),
                copy_failed: "Copy failed, please try again".to_string(),
            },
        }
    }
}

impl Default for Messages {
    fn default() -> Self {
        Self::for_locale(Locale::default())
    }
}
