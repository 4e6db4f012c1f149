//! Merge provider answers into one labelled response with provenance

use serde::Serialize;

use crate::ai::ProviderKind;

/// Returned when no provider contributed anything
pub const UNAVAILABLE: &str = "Unable to retrieve medical information.";

/// Appended to every non-empty answer
pub const DISCLAIMER: &str = "⚠️ Disclaimer: For educational purposes only. Consult professionals.";

/// Combined answer text plus the "Sources: ..." line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateAnswer {
    pub answer: String,
    pub source: String,
}

/// Combine results in the fixed order chat, research, search.
///
/// Blank strings count as absent.
pub fn aggregate(
    chat: Option<&str>,
    research: Option<&str>,
    search: Option<&str>,
) -> AggregateAnswer {
    let mut sections = Vec::with_capacity(3);
    let mut sources = Vec::with_capacity(3);

    for (kind, text) in ProviderKind::ORDER.into_iter().zip([chat, research, search]) {
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        sections.push(format!("**{}:** {}", kind.heading(), text));
        sources.push(kind.source_name());
    }

    if sections.is_empty() {
        return AggregateAnswer {
            answer: UNAVAILABLE.to_string(),
            source: String::new(),
        };
    }

    let mut answer = sections.join("\n\n");
    answer.push_str("\n\n");
    answer.push_str(DISCLAIMER);

    AggregateAnswer {
        answer,
        source: format!("Sources: {}", sources.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_available() {
        let result = aggregate(None, None, None);
        assert_eq!(result.answer, UNAVAILABLE);
        assert_eq!(result.source, "");
    }

    #[test]
    fn test_chat_only() {
        let result = aggregate(Some("X"), None, None);
        assert!(result.answer.starts_with("**AI Analysis:** X"));
        assert!(!result.answer.contains("Research Findings"));
        assert!(!result.answer.contains("Additional Context"));
        assert!(result.answer.ends_with(DISCLAIMER));
        assert_eq!(result.source, "Sources: ChatGPT");
    }

    #[test]
    fn test_all_three_in_fixed_order() {
        let result = aggregate(Some("X"), Some("Y"), Some("Z"));
        assert_eq!(
            result.answer,
            format!(
                "**AI Analysis:** X\n\n**Research Findings:** Y\n\n**Additional Context:** Z\n\n{}",
                DISCLAIMER
            )
        );
        assert_eq!(
            result.source,
            "Sources: ChatGPT, Perplexity AI, Google Search"
        );
    }

    #[test]
    fn test_gaps_are_skipped() {
        let result = aggregate(None, Some("Y"), Some("Z"));
        let research = result.answer.find("Research Findings").unwrap();
        let search = result.answer.find("Additional Context").unwrap();
        assert!(research < search);
        assert_eq!(result.source, "Sources: Perplexity AI, Google Search");
    }

    #[test]
    fn test_blank_text_counts_as_absent() {
        let result = aggregate(Some(""), Some("  "), None);
        assert_eq!(result.answer, UNAVAILABLE);
        assert_eq!(result.source, "");
    }
}
