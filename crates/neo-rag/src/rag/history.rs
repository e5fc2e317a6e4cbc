use std::collections::VecDeque;

use super::prompt::Message;

/// One question and the answer given to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Sliding window over the most recent turns; the oldest turn is evicted first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    window: usize,
    turns: VecDeque<Turn>,
}

impl ConversationHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            turns: VecDeque::with_capacity(window),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        if self.window == 0 {
            return;
        }
        while self.turns.len() >= self.window {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Replay the window as alternating user/assistant messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .flat_map(|t| [Message::user(t.question.clone()), Message::assistant(t.answer.clone())])
            .collect()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut history = ConversationHistory::default();
        history.push("q1", "a1");
        history.push("q2", "a2");
        history.push("q3", "a3");
        let questions: Vec<_> = history.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3"]);
    }

    #[test]
    fn test_zero_window_keeps_nothing() {
        let mut history = ConversationHistory::new(0);
        history.push("q", "a");
        assert!(history.is_empty());
    }

    #[test]
    fn test_messages_alternate() {
        let mut history = ConversationHistory::new(3);
        history.push("q1", "a1");
        let messages = history.messages();
        assert_eq!(messages, vec![Message::user("q1"), Message::assistant("a1")]);
    }
}
