//! Prompt template and answer extraction.
//!
//! The model was fine-tuned on `질문: … \n답변: …` pairs, so the same two
//! markers build the prompt and later re-locate the answer in the decoded
//! output. The runtime gives no structured output; extraction is purely
//! syntactic.

/// Marker preceding the user's question.
pub const QUESTION_MARKER: &str = "질문:";
/// Marker after which the model writes its answer.
pub const ANSWER_MARKER: &str = "답변:";
/// Start of stray markup the model sometimes emits after its answer.
pub const MARKUP_START: char = '<';

/// Wrap a question in the fine-tuning prompt template.
pub fn build_prompt(question: &str) -> String {
    format!("{QUESTION_MARKER} {question}\n{ANSWER_MARKER}")
}

/// One truncation step applied to the text after the answer marker.
#[derive(Debug, Clone, Copy)]
enum Rule {
    /// The model hallucinated a follow-up question.
    CutAtMarker(&'static str),
    /// The model started echoing markup.
    CutAtChar(char),
}

impl Rule {
    fn apply(self, text: &str) -> &str {
        let cut = match self {
            Rule::CutAtMarker(m) => text.find(m),
            Rule::CutAtChar(c) => text.find(c),
        };
        cut.map_or(text, |pos| &text[..pos]).trim()
    }
}

const RULES: [Rule; 2] = [Rule::CutAtMarker(QUESTION_MARKER), Rule::CutAtChar(MARKUP_START)];

/// Isolate the model's answer from the full decoded output.
///
/// 1. Take the text after the first answer marker. Without a marker the whole
///    text (trimmed) is the answer and no further rule applies.
/// 2. Cut at the first question marker.
/// 3. Cut at the first `<`.
///
/// Every step trims surrounding whitespace.
pub fn extract_answer(full_output: &str) -> String {
    let Some((_, after)) = full_output.split_once(ANSWER_MARKER) else {
        return full_output.trim().to_string();
    };
    RULES
        .iter()
        .fold(after.trim(), |text, rule| rule.apply(text))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_template() {
        assert_eq!(
            build_prompt("오답노트는 어떻게 정리할까요?"),
            "질문: 오답노트는 어떻게 정리할까요?\n답변:"
        );
    }

    #[test]
    fn test_plain_answer_after_marker() {
        assert_eq!(extract_answer("질문: q\n답변:   매일 복습하세요.  \n"), "매일 복습하세요.");
    }

    #[test]
    fn test_truncates_hallucinated_question() {
        let full = "질문: 오답노트는 어떻게 정리할까요?\n답변: 매일 복습하세요. 질문: 다음은?";
        assert_eq!(extract_answer(full), "매일 복습하세요.");
    }

    #[test]
    fn test_truncates_markup() {
        assert_eq!(extract_answer("답변: 개념부터 <br>정리"), "개념부터");
    }

    #[test]
    fn test_question_cut_before_markup_cut() {
        assert_eq!(extract_answer("답변: A 질문: B <i>"), "A");
        assert_eq!(extract_answer("답변: A <b> 질문: B"), "A");
    }

    #[test]
    fn test_no_answer_marker_is_identity_trimmed() {
        assert_eq!(extract_answer("  질문: 무엇? <tag> \n"), "질문: 무엇? <tag>");
    }

    #[test]
    fn test_only_first_answer_marker_counts() {
        assert_eq!(extract_answer("답변: 첫째 답변: 둘째"), "첫째 답변: 둘째");
    }

    #[test]
    fn test_empty_answer() {
        assert_eq!(extract_answer("질문: q\n답변:"), "");
        assert_eq!(extract_answer("답변: <eos>"), "");
    }

    #[test]
    fn test_prompt_roundtrip_extracts_continuation() {
        let full = format!("{} 시간표를 짜세요.", build_prompt("계획은?"));
        assert_eq!(extract_answer(&full), "시간표를 짜세요.");
    }
}
