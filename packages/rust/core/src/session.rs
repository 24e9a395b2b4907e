//! Interactive chat session loop.
//!
//! The loop reads questions from a line source until the source is
//! exhausted or the user types `quit` (any casing). Each answered
//! question appends exactly one turn to the in-memory history; the
//! history grows without bound for the life of the session. A piped
//! stdin makes the same loop a batch runner: questions are answered in
//! order and EOF ends the session.

use tracing::instrument;

use sitechat_shared::{ChatHistory, ConversationTurn, Result};

use crate::answerer::{Answerer, AnswerOutcome};

/// The word that ends a session, compared case-insensitively.
const QUIT_COMMAND: &str = "quit";

/// How a session ended and what it did.
#[derive(Debug)]
pub struct SessionSummary {
    /// Number of questions answered.
    pub questions_answered: usize,
}

/// Whether a line of input ends the session.
pub fn is_quit(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(QUIT_COMMAND)
}

/// Drive a chat session over a line source.
///
/// Blank lines are skipped. `on_answer` is called once per answered
/// question, after the turn is recorded; the app uses it to print the
/// top source URL (answer tokens are printed by the answerer's sink as
/// they stream).
#[instrument(skip_all)]
pub async fn run_session<A, I, F>(
    answerer: &A,
    input: I,
    mut on_answer: F,
) -> Result<SessionSummary>
where
    A: Answerer + ?Sized,
    I: IntoIterator<Item = String>,
    F: FnMut(&str, &AnswerOutcome),
{
    let mut history: ChatHistory = Vec::new();

    for line in input {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_quit(question) {
            break;
        }

        let outcome = answerer.answer(question, &history).await?;
        history.push(ConversationTurn {
            question: question.to_string(),
            answer: outcome.answer.clone(),
        });
        on_answer(question, &outcome);
    }

    Ok(SessionSummary {
        questions_answered: history.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sitechat_openai::TokenUsage;
    use std::sync::Mutex;

    /// Scripted answerer that records every call it receives.
    #[derive(Default)]
    struct ScriptedAnswerer {
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl Answerer for ScriptedAnswerer {
        async fn answer(&self, question: &str, history: &ChatHistory) -> Result<AnswerOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((question.to_string(), history.len()));
            Ok(AnswerOutcome {
                answer: format!("answer to: {question}"),
                sources: Vec::new(),
                usage: TokenUsage::default(),
            })
        }
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn quit_terminates_without_invoking_answerer() {
        let answerer = ScriptedAnswerer::default();
        let summary = run_session(&answerer, lines(&["quit"]), |_, _| {})
            .await
            .unwrap();

        assert_eq!(summary.questions_answered, 0);
        assert!(answerer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn quit_is_case_insensitive() {
        for raw in ["QUIT", "Quit", "  qUiT  "] {
            let answerer = ScriptedAnswerer::default();
            let summary = run_session(&answerer, lines(&[raw]), |_, _| {})
                .await
                .unwrap();
            assert_eq!(summary.questions_answered, 0);
            assert!(answerer.calls.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn eof_terminates_like_quit() {
        let answerer = ScriptedAnswerer::default();
        let summary = run_session(&answerer, Vec::<String>::new(), |_, _| {})
            .await
            .unwrap();
        assert_eq!(summary.questions_answered, 0);
        assert!(answerer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_question_appends_one_turn() {
        let answerer = ScriptedAnswerer::default();
        let summary = run_session(
            &answerer,
            lines(&["first question", "", "second question", "quit", "never seen"]),
            |_, _| {},
        )
        .await
        .unwrap();

        assert_eq!(summary.questions_answered, 2);

        // The answerer saw the history grow by exactly one turn per call.
        let calls = answerer.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ("first question".to_string(), 0));
        assert_eq!(calls[1], ("second question".to_string(), 1));
    }

    #[tokio::test]
    async fn batch_input_answers_in_order_until_exhausted() {
        let answerer = ScriptedAnswerer::default();
        let mut answered = Vec::new();
        let summary = run_session(
            &answerer,
            lines(&["one", "two", "three"]),
            |question, outcome| {
                answered.push((question.to_string(), outcome.answer.clone()));
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.questions_answered, 3);
        assert_eq!(answered.len(), 3);
        assert_eq!(answered[2].0, "three");
        assert_eq!(answered[2].1, "answer to: three");
    }
}
