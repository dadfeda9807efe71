//! Per-turn transcript accumulation.

use super::base::TurnPair;

/// Collapse runs of whitespace to a single space and trim both ends.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Input and output transcript buffers for the turn in progress.
///
/// Deltas are appended verbatim since they already carry their own spacing.
/// Both buffers are cleared together at a turn boundary and at no other time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptAggregator {
    input: String,
    output: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&mut self, delta: &str) {
        self.input.push_str(delta);
    }

    pub fn push_output(&mut self, delta: &str) {
        self.output.push_str(delta);
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    /// Close the current turn.
    ///
    /// Returns a pair when either normalized side has text. Both buffers are
    /// cleared whether or not a pair was produced.
    pub fn on_turn_boundary(&mut self) -> Option<TurnPair> {
        let question = normalize(&self.input);
        let answer = normalize(&self.output);
        self.input.clear();
        self.output.clear();

        if question.is_empty() && answer.is_empty() {
            None
        } else {
            Some(TurnPair { question, answer })
        }
    }
}
