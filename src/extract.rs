//! Code block extraction from model output.
//!
//! Models are asked for a single fenced Python block, but they do not always
//! comply. Extraction prefers a block tagged as Python, then any fenced block,
//! and finally falls back to the whole answer.

use regex::Regex;
use std::sync::LazyLock;

/// Fenced block tagged `python`, `python3` or `py`. Non-greedy, spans lines.
static TAGGED_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:python3?|py)\b(.*?)```").expect("tagged fence pattern is valid")
});

/// Any fenced block. A language word alone on the opening line is not code.
static GENERIC_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[\w+.-]*[ \t]*\n)?(.*?)```").expect("generic fence pattern is valid")
});

/// How the code was located in the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Confidence {
    /// Found inside a block tagged as Python.
    Tagged,
    /// Found inside an untagged (or non-Python) fenced block.
    Generic,
    /// No fence found; the whole answer is used as-is.
    Raw,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tagged => write!(f, "tagged"),
            Self::Generic => write!(f, "generic"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Extraction {
    pub code: String,
    pub confidence: Confidence,
}

/// Extracts one runnable program body from `raw`. Never fails.
pub(crate) fn extract(raw: &str) -> Extraction {
    if let Some(body) = TAGGED_FENCE.captures(raw).and_then(|c| c.get(1)) {
        return Extraction {
            code: body.as_str().trim().to_string(),
            confidence: Confidence::Tagged,
        };
    }

    if let Some(body) = GENERIC_FENCE.captures(raw).and_then(|c| c.get(1)) {
        return Extraction {
            code: body.as_str().trim().to_string(),
            confidence: Confidence::Generic,
        };
    }

    Extraction {
        code: raw.trim().to_string(),
        confidence: Confidence::Raw,
    }
}
