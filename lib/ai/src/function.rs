//! The fixed set of AI functions an `ai-node` can request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An AI function, each mapped to a fixed system instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiFunction {
    /// Positive/negative/neutral with confidence and keywords.
    SentimentAnalysis,
    /// Two to three sentence condensation.
    Summarize,
    /// Structured professional email.
    GenerateEmail,
    /// Extract phone, email, name and address.
    NormalizeData,
    /// Urgent/high/normal/low priority with a reason.
    Classify,
    /// Array of actionable tasks.
    GenerateTasks,
    /// Caller-supplied instruction.
    Custom,
}

const CUSTOM_FALLBACK_INSTRUCTION: &str = "You are a versatile AI assistant. Answer the user's request accurately and helpfully.";

impl AiFunction {
    /// All functions, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::SentimentAnalysis,
        Self::Summarize,
        Self::GenerateEmail,
        Self::NormalizeData,
        Self::Classify,
        Self::GenerateTasks,
        Self::Custom,
    ];

    /// Returns the wire name of the function.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SentimentAnalysis => "sentiment_analysis",
            Self::Summarize => "summarize",
            Self::GenerateEmail => "generate_email",
            Self::NormalizeData => "normalize_data",
            Self::Classify => "classify",
            Self::GenerateTasks => "generate_tasks",
            Self::Custom => "custom",
        }
    }

    /// Returns the system instruction for this function.
    ///
    /// `custom_prompt` replaces the instruction for [`AiFunction::Custom`] and
    /// is ignored by every other function.
    #[must_use]
    pub fn system_instruction<'a>(&self, custom_prompt: Option<&'a str>) -> &'a str {
        match self {
            Self::SentimentAnalysis => {
                "You are a sentiment analysis expert. Analyze the provided text and return:\n\
                 - sentiment: \"positive\", \"negative\", or \"neutral\"\n\
                 - confidence: a score from 0 to 100\n\
                 - keywords: the words that drive the sentiment\n\
                 Respond in JSON only."
            }
            Self::Summarize => {
                "You are an expert at summarizing text. Write a concise, clear summary of the provided text.\n\
                 The summary must capture the essential points in 2-3 sentences at most."
            }
            Self::GenerateEmail => {
                "You are an expert at writing professional emails. Write an email based on the provided context.\n\
                 The email must be professional, clear and concise. Include a subject, a greeting, the body and a signature."
            }
            Self::NormalizeData => {
                "You are an expert at data extraction and normalization. Extract and structure the information in the text:\n\
                 - phone: international format (+33...)\n\
                 - email: standard format\n\
                 - name: first and last name separated\n\
                 - address: separate components (street, city, postal code, country)\n\
                 Respond in JSON only."
            }
            Self::Classify => {
                "You are a classification expert. Classify the text into one of the following categories:\n\
                 - urgent: requires immediate action\n\
                 - high: high priority\n\
                 - normal: standard priority\n\
                 - low: low priority\n\
                 Return: { \"priority\": \"...\", \"reason\": \"...\" } as JSON."
            }
            Self::GenerateTasks => {
                "You are a project management expert. From the provided text, generate a list of actionable tasks.\n\
                 Each task must have: title, description, priority (high/medium/low), estimatedHours.\n\
                 Respond in JSON with a \"tasks\" array."
            }
            Self::Custom => custom_prompt.unwrap_or(CUSTOM_FALLBACK_INSTRUCTION),
        }
    }
}

impl fmt::Display for AiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name an [`AiFunction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFunction {
    /// The rejected name.
    pub name: String,
}

impl fmt::Display for UnknownFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown AI function: {}", self.name)
    }
}

impl std::error::Error for UnknownFunction {}

impl FromStr for AiFunction {
    type Err = UnknownFunction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|function| function.as_str() == s)
            .ok_or_else(|| UnknownFunction {
                name: s.to_string(),
            })
    }
}
