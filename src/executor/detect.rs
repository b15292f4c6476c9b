//! Input-wait detection heuristics
//!
//! A process blocked reading stdin is indistinguishable, at the OS level,
//! from one that is merely slow. The detector classifies the output tail
//! instead, after every stdout chunk. It is deliberately permissive: a false
//! positive costs the caller one extra pause, while a miss looks like a hung
//! execution. Legitimate output that happens to end in a colon or question
//! mark will trip it.

use regex::Regex;

use super::types::InterpreterProfile;

/// Words conventionally used when asking for input
const INPUT_WORDS: &str = r"(?i)\b(enter|input|password)\b";

/// Decides whether a process is blocked awaiting interactive input
///
/// Implementations see the stdout transcript so far and the chunk that was
/// just appended, and return the extracted prompt on a positive.
pub trait InputWaitDetector: Send + Sync {
    fn detect(&self, transcript: &str, chunk: &str) -> Option<String>;
}

/// Pattern-based detector, tuned per interpreter profile
pub struct HeuristicDetector {
    prompt_markers: Vec<String>,
    continuation_markers: Vec<String>,
    input_words: Option<Regex>,
}

impl HeuristicDetector {
    pub fn from_profile(profile: &InterpreterProfile) -> Self {
        Self {
            prompt_markers: profile.prompt_markers.clone(),
            continuation_markers: profile.continuation_markers.clone(),
            input_words: Regex::new(INPUT_WORDS).ok(),
        }
    }

    fn chunk_requests_input(&self, chunk: &str) -> bool {
        self.input_words
            .as_ref()
            .map(|re| re.is_match(chunk))
            .unwrap_or(false)
    }
}

impl InputWaitDetector for HeuristicDetector {
    fn detect(&self, transcript: &str, chunk: &str) -> Option<String> {
        // The final line may still be incomplete; a prompt almost always ends
        // the stream without a newline.
        let final_line = transcript.rsplit('\n').next().unwrap_or("");
        let prompt = final_line.trim();
        if prompt.is_empty() {
            return None;
        }
        if self
            .continuation_markers
            .iter()
            .any(|m| final_line.starts_with(m.as_str()))
        {
            return None;
        }

        let has_prompt_marker = self
            .prompt_markers
            .iter()
            .any(|m| transcript.contains(m.as_str()));
        let ends_with_colon = chunk.trim_end().ends_with(':');
        let has_input_word = self.chunk_requests_input(chunk);
        let has_question = chunk.contains('?');

        if has_prompt_marker || ends_with_colon || has_input_word || has_question {
            Some(prompt.to_string())
        } else {
            None
        }
    }
}
