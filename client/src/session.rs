use esg_shared::{ChatExchange, PageType, Role};

use crate::classifier::StreamAccumulator;
use crate::error::ClientError;

pub const FAILURE_NOTICE: &str =
    "⚠️ Error: Unable to get a response right now. Please try again in a moment.";

const DASHBOARD_EXAMPLES: &[&str] = &[
    "What are Scope 1, 2, and 3 emissions?",
    "How can we reduce our carbon footprint?",
    "Explain the GHG Protocol standards",
    "What does Net Zero mean for our company?",
    "How do I calculate total GHG emissions?",
];

const REPORT_EXAMPLES: &[&str] = &[
    "Summarize all emissions data",
    "What is the highest emission source?",
    "Explain what Stationary Combustion means",
    "Compare Scope 1 vs Scope 2 vs Scope 3",
    "Summarize the Purchased Goods data",
    "Which site has the highest emissions?",
    "Explain Fugitive Emissions",
    "What does 'Loop' mean in Purchased Goods?",
];

/// Events produced by the transport task for the active exchange.
#[derive(Debug)]
pub enum StreamEvent {
    Model(String),
    Delta(String),
    Finished,
    Failed(ClientError),
}

/// In-memory message list of one sidebar session.
pub struct ChatSession {
    page: PageType,
    messages: Vec<ChatExchange>,
    pending: Option<(usize, StreamAccumulator)>,
    asked: Vec<String>,
    model: Option<String>,
}

impl ChatSession {
    pub fn new(page: PageType) -> Self {
        let greeting = match page {
            PageType::Dashboard => "Hello! I'm your ESG AI Assistant. Ask me anything about your GHG emissions data, sustainability metrics, or how to improve your environmental impact.",
            PageType::Report => "Hello! I'm your GHG Report AI Assistant. I can help you summarize emissions data, explain specific emission categories, compare scopes, or analyze any field in this report. What would you like to know?",
        };
        Self {
            page,
            messages: vec![ChatExchange::new(Role::Assistant, greeting)],
            pending: None,
            asked: Vec::new(),
            model: None,
        }
    }

    pub fn page(&self) -> PageType {
        self.page
    }

    pub fn messages(&self) -> &[ChatExchange] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Index of the message whose stream is still open.
    pub fn streaming_index(&self) -> Option<usize> {
        self.pending.as_ref().map(|(index, _)| *index)
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Example questions not asked yet.
    pub fn remaining_examples(&self) -> Vec<&'static str> {
        let examples = match self.page {
            PageType::Dashboard => DASHBOARD_EXAMPLES,
            PageType::Report => REPORT_EXAMPLES,
        };
        examples
            .iter()
            .copied()
            .filter(|q| !self.asked.iter().any(|a| a == q))
            .collect()
    }

    /// Opens a new exchange; returns the trimmed question to send, or `None`
    /// when it is blank or another answer is still streaming.
    pub fn begin(&mut self, question: &str) -> Option<String> {
        let question = question.trim();
        if question.is_empty() || self.is_loading() {
            return None;
        }
        self.messages.push(ChatExchange::new(Role::User, question));
        self.messages.push(ChatExchange::new(Role::Assistant, ""));
        self.pending = Some((self.messages.len() - 1, StreamAccumulator::new()));
        Some(question.to_string())
    }

    /// Like [`ChatSession::begin`], and hides the example once it is sent.
    pub fn begin_example(&mut self, question: &str) -> Option<String> {
        let sent = self.begin(question)?;
        self.asked.push(sent.clone());
        Some(sent)
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Model(model) => self.model = Some(model),
            StreamEvent::Delta(text) => {
                if let Some((index, acc)) = self.pending.as_mut() {
                    acc.push(&text);
                    if let Some(message) = self.messages.get_mut(*index) {
                        message.set_content(acc.content());
                    }
                }
            }
            StreamEvent::Finished => {
                if let Some((index, acc)) = self.pending.take() {
                    tracing::debug!(structured = acc.is_structured(), "answer complete");
                    if let Err(e) = acc.finish() {
                        self.fail(index, &e);
                    }
                }
            }
            StreamEvent::Failed(e) => {
                if let Some((index, _)) = self.pending.take() {
                    self.fail(index, &e);
                }
            }
        }
    }

    fn fail(&mut self, index: usize, error: &ClientError) {
        tracing::error!("Error while contacting AI backend: {}", error);
        if let Some(message) = self.messages.get_mut(index) {
            message.set_content(FAILURE_NOTICE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{CardView, MessageView, Section, Summary};

    fn view(session: &ChatSession) -> MessageView {
        let index = session.messages().len() - 1;
        let streaming = session.streaming_index() == Some(index);
        MessageView::for_content(&session.messages()[index].content, streaming)
    }

    #[test]
    fn analysis_card_fills_in_token_by_token() {
        let mut session = ChatSession::new(PageType::Dashboard);
        session.begin("Pros and cons of our solar PPA?").unwrap();

        let tokens = [
            "{",
            "\"format\":\"analysis\",",
            "\"positives\":[\"Cuts cost\"],",
            "\"negatives\":[],",
            "\"summary\":\"Good\"}",
        ];
        session.apply(StreamEvent::Delta(tokens[0].to_string()));
        assert_eq!(view(&session), MessageView::Analysis(CardView::skeleton()));

        session.apply(StreamEvent::Delta(tokens[1].to_string()));
        session.apply(StreamEvent::Delta(tokens[2].to_string()));
        assert_eq!(
            view(&session),
            MessageView::Analysis(CardView {
                summary: Summary::Analyzing,
                positives: Section::Items(vec!["Cuts cost".to_string()]),
                negatives: Section::Thinking,
            })
        );

        session.apply(StreamEvent::Delta(tokens[3].to_string()));
        session.apply(StreamEvent::Delta(tokens[4].to_string()));
        session.apply(StreamEvent::Finished);
        assert!(!session.is_loading());
        assert_eq!(
            view(&session),
            MessageView::Analysis(CardView {
                summary: Summary::Text("Good".to_string()),
                positives: Section::Items(vec!["Cuts cost".to_string()]),
                negatives: Section::Omitted,
            })
        );
    }

    #[test]
    fn empty_stream_shows_failure_notice() {
        let mut session = ChatSession::new(PageType::Report);
        session.begin("Summarize all emissions data").unwrap();
        session.apply(StreamEvent::Finished);
        assert!(!session.is_loading());
        assert_eq!(session.messages().last().unwrap().content, FAILURE_NOTICE);
    }

    #[test]
    fn transport_failure_replaces_partial_answer() {
        let mut session = ChatSession::new(PageType::Dashboard);
        session.begin("hi").unwrap();
        session.apply(StreamEvent::Delta("Hel".to_string()));
        session.apply(StreamEvent::Failed(ClientError::Api {
            status: 502,
            body: String::new(),
        }));
        assert_eq!(session.messages().last().unwrap().content, FAILURE_NOTICE);
        assert!(session.begin("again").is_some());
    }

    #[test]
    fn prose_streams_and_model_is_recorded() {
        let mut session = ChatSession::new(PageType::Dashboard);
        session.begin("What are Scope 1 emissions?").unwrap();
        session.apply(StreamEvent::Model("upstage/solar-pro-3:free".to_string()));
        session.apply(StreamEvent::Delta("Direct ".to_string()));
        session.apply(StreamEvent::Delta("emissions.".to_string()));
        session.apply(StreamEvent::Finished);
        assert_eq!(session.model(), Some("upstage/solar-pro-3:free"));
        assert_eq!(
            view(&session),
            MessageView::Prose("Direct emissions.".to_string())
        );
    }

    #[test]
    fn one_question_at_a_time() {
        let mut session = ChatSession::new(PageType::Dashboard);
        assert_eq!(session.begin("   "), None);
        assert_eq!(session.begin("  first "), Some("first".to_string()));
        assert_eq!(session.begin("second"), None);
        assert_eq!(session.messages().len(), 3);
    }

    #[test]
    fn picked_examples_are_removed() {
        let mut session = ChatSession::new(PageType::Dashboard);
        let first = session.remaining_examples()[0];
        session.begin_example(first).unwrap();
        assert!(!session.remaining_examples().contains(&first));
        assert_eq!(session.remaining_examples().len(), DASHBOARD_EXAMPLES.len() - 1);
    }

    #[test]
    fn typed_questions_keep_matching_examples() {
        let mut session = ChatSession::new(PageType::Report);
        assert_eq!(
            session.remaining_examples().last(),
            Some(&"What does 'Loop' mean in Purchased Goods?")
        );
        session.begin("Explain Fugitive Emissions").unwrap();
        session.apply(StreamEvent::Delta("Leaks.".to_string()));
        session.apply(StreamEvent::Finished);
        assert!(session.remaining_examples().contains(&"Explain Fugitive Emissions"));
        assert_eq!(session.remaining_examples().len(), REPORT_EXAMPLES.len());
    }

    #[test]
    fn example_is_not_hidden_when_refused() {
        let mut session = ChatSession::new(PageType::Dashboard);
        session.begin("first").unwrap();
        let example = session.remaining_examples()[0];
        assert_eq!(session.begin_example(example), None);
        assert!(session.remaining_examples().contains(&example));
    }
}
