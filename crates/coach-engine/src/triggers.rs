//! Keyword classifiers over user text and assistant replies.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use coach_settings::TriggerSettings;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

/// Product names from the catalog; any of them in a reply counts as a recommendation.
pub const RECOMMENDATION_KEYWORDS: &[&str] = &[
    "Pack 1 a 1",
    "Pack Premium",
    "Pack BASIC",
    "Quebrantahuesos",
    "Base por Frecuencia Cardíaca",
    "Pack 8 semanas",
    "Pack 12 semanas",
    "Fuerza específica",
];

pub const CLOSING_PHRASES: &[&str] = &[
    "adiós",
    "adios",
    "hasta luego",
    "hasta pronto",
    "nos vemos",
    "chao",
    "gracias eso es todo",
    "gracias, eso es todo",
    "bye",
    "goodbye",
    "that's all",
];

pub const SUMMARY_REQUEST_PHRASES: &[&str] = &[
    "envíame el resumen",
    "enviame el resumen",
    "envía el resumen",
    "envia el resumen",
    "mándame el resumen",
    "mandame el resumen",
    "enviar resumen",
    "send me the summary",
    "send the summary",
    "send summary",
    "email me the summary",
];

/// Reply language requested for one exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Language {
    Spanish,
    English,
    Other(String),
}

impl Language {
    /// Explicit client hint such as `es`, `en-GB`.
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_lowercase();
        let primary = code.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "" => None,
            "es" => Some(Self::Spanish),
            "en" => Some(Self::English),
            _ => Some(Self::Other(code)),
        }
    }

    /// Spanish-only characters mark Spanish; otherwise no opinion.
    pub fn detect(text: &str) -> Option<Self> {
        text.chars()
            .any(|c| matches!(c.to_lowercase().next(), Some('ñ' | '¿' | '¡' | 'á' | 'é' | 'í' | 'ó' | 'ú' | 'ü')))
            .then_some(Self::Spanish)
    }

    /// Explicit hint first, heuristic second.
    pub fn resolve(hint: Option<&str>, text: &str) -> Option<Self> {
        hint.and_then(Self::parse).or_else(|| Self::detect(text))
    }

    pub fn directive(&self) -> String {
        match self {
            Self::Spanish => "Responde en español.".to_string(),
            Self::English => "Reply in English.".to_string(),
            Self::Other(code) => format!("Reply in the language with code '{code}'."),
        }
    }
}

/// Compiled trigger catalogs.
pub struct Triggers {
    recommendation: Regex,
    closing: Regex,
    summary_request: Regex,
}

fn any_of(phrases: &[String], word_bounded: bool) -> Result<Regex, regex::Error> {
    let alternatives: Vec<String> = phrases
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| regex::escape(p).replace(' ', r"\s+"))
        .collect();

    // No phrases: a pattern that never matches.
    if alternatives.is_empty() {
        return Regex::new(r"[^\s\S]");
    }

    let body = alternatives.join("|");
    let pattern = if word_bounded {
        format!(r"\b(?:{body})\b")
    } else {
        format!("(?:{body})")
    };
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Triggers {
    /// Built-in catalogs, each replaceable from settings.
    pub fn new(settings: &TriggerSettings) -> Result<Self, regex::Error> {
        let recommendation = settings
            .recommendation_keywords
            .clone()
            .unwrap_or_else(|| owned(RECOMMENDATION_KEYWORDS));
        let closing = settings
            .closing_phrases
            .clone()
            .unwrap_or_else(|| owned(CLOSING_PHRASES));
        let summary = settings
            .summary_request_phrases
            .clone()
            .unwrap_or_else(|| owned(SUMMARY_REQUEST_PHRASES));

        Ok(Self {
            recommendation: any_of(&recommendation, false)?,
            closing: any_of(&closing, true)?,
            summary_request: any_of(&summary, false)?,
        })
    }

    /// First email-shaped token in `text`.
    pub fn find_email<'a>(&self, text: &'a str) -> Option<&'a str> {
        EMAIL.find(text).map(|m| m.as_str())
    }

    pub fn is_recommendation(&self, reply: &str) -> bool {
        self.recommendation.is_match(reply)
    }

    pub fn is_closing(&self, text: &str) -> bool {
        self.closing.is_match(text)
    }

    pub fn is_summary_request(&self, text: &str) -> bool {
        self.summary_request.is_match(text)
    }
}
