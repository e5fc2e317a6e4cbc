//! Retrieval-augmented answering: search, bound the context, render the
//! prompt for the configured model family and hand it to the generator.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use super::budget::{estimate_tokens, BudgetTracker};
use super::context::build_context;
use super::history::ConversationHistory;
use super::prompt::{Message, PromptTemplate};
use crate::config::{GenerationConfig, SearchConfig};
use crate::error::RagError;
use crate::llm::{Generator, TokenStream};
use crate::store::VectorStore;
use crate::types::SearchHit;

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Hits whose content made it into the prompt, best first.
    pub sources: Vec<SearchHit>,
    /// Cost charged for this query alone.
    pub cost: f64,
}

pub struct QueryEngine {
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    template: &'static PromptTemplate,
    persona: String,
    history: Arc<Mutex<ConversationHistory>>,
    k: usize,
    max_context_chars: usize,
    cost_per_1k: f64,
}

/// Prompt ready for the generator plus the hits it was built from.
struct Prepared {
    prompt: String,
    sources: Vec<SearchHit>,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        generation: &GenerationConfig,
        search: &SearchConfig,
    ) -> Self {
        let template = PromptTemplate::for_model(&generation.model_name);
        tracing::debug!(
            model = %generation.model_name,
            family = %template.family,
            "prompt template selected"
        );
        Self {
            store,
            generator,
            template,
            persona: generation.persona.clone(),
            history: Arc::new(Mutex::new(ConversationHistory::new(generation.history_window))),
            k: search.default_k,
            max_context_chars: search.max_context_chars,
            cost_per_1k: generation.cost_per_1k_tokens,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn template(&self) -> &'static PromptTemplate {
        self.template
    }

    pub fn history(&self) -> ConversationHistory {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    async fn prepare(&self, question: &str) -> Result<Prepared> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidArgument("question is empty".into()).into());
        }

        // query embedding and the full scan are CPU-bound
        let store = Arc::clone(&self.store);
        let query = question.to_string();
        let k = self.k;
        let hits = tokio::task::spawn_blocking(move || store.search(&query, k)).await??;
        let (context, used) = build_context(&hits, self.max_context_chars);

        let mut messages = vec![Message::system(format!(
            "{}\n\nContext:\n{}",
            self.persona, context
        ))];
        messages.extend(self.history.lock().messages());
        messages.push(Message::user(question));

        let prompt = self.template.render(&messages);
        tracing::debug!(
            hits = hits.len(),
            used,
            prompt_chars = prompt.len(),
            "prompt assembled"
        );

        Ok(Prepared {
            prompt,
            sources: hits.into_iter().take(used).collect(),
        })
    }

    /// Answer `question` from the store, charging prompt and answer tokens to `budget`.
    pub async fn answer(&self, question: &str, budget: &mut BudgetTracker) -> Result<Answer> {
        let prepared = self.prepare(question).await?;
        let text = self.generator.generate(&prepared.prompt).await?;

        let tokens = estimate_tokens(&prepared.prompt) + estimate_tokens(&text);
        budget.record(tokens, self.cost_per_1k);
        self.history.lock().push(question, text.clone());

        tracing::info!(
            sources = prepared.sources.len(),
            tokens,
            cost = budget.last_query_cost(),
            "answered query"
        );
        Ok(Answer {
            text,
            sources: prepared.sources,
            cost: budget.last_query_cost(),
        })
    }

    /// Streaming variant of [`Self::answer`]. Cost and history are settled by
    /// [`StreamingAnswer::finish`].
    pub async fn answer_stream(&self, question: &str) -> Result<StreamingAnswer> {
        let prepared = self.prepare(question).await?;
        let tokens = self.generator.generate_stream(&prepared.prompt).await?;

        Ok(StreamingAnswer {
            tokens,
            text: String::new(),
            sources: prepared.sources,
            question: question.to_string(),
            prompt_tokens: estimate_tokens(&prepared.prompt),
            cost_per_1k: self.cost_per_1k,
            history: Arc::clone(&self.history),
        })
    }
}

pub struct StreamingAnswer {
    tokens: TokenStream,
    text: String,
    sources: Vec<SearchHit>,
    question: String,
    prompt_tokens: usize,
    cost_per_1k: f64,
    history: Arc<Mutex<ConversationHistory>>,
}

impl StreamingAnswer {
    pub fn sources(&self) -> &[SearchHit] {
        &self.sources
    }

    /// Next token from the generator, or `None` once it is done.
    pub async fn next(&mut self) -> Option<String> {
        let token = self.tokens.next().await?;
        self.text.push_str(&token);
        Some(token)
    }

    /// Drain whatever is left, charge the budget and record the turn.
    pub async fn finish(mut self, budget: &mut BudgetTracker) -> Answer {
        while self.next().await.is_some() {}

        let tokens = self.prompt_tokens + estimate_tokens(&self.text);
        budget.record(tokens, self.cost_per_1k);
        self.history.lock().push(self.question, self.text.clone());

        Answer {
            text: self.text,
            sources: self.sources,
            cost: budget.last_query_cost(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingModel, HashingEmbedder};
    use crate::store::NeoStore;
    use crate::types::{Chunk, SimilarityMetric};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::thread::{self, ThreadId};

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok("Paris.".to_string())
        }

        async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
            self.prompts.lock().push(prompt.to_string());
            Ok(TokenStream::from_tokens(vec!["Par".into(), "is.".into()]))
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    fn store() -> Arc<dyn VectorStore> {
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbedder::default());
        let mut store = NeoStore::new(embedder, SimilarityMetric::Cosine);
        store
            .build_store(
                vec![
                    Chunk::new("Paris is the capital of France", "geo.txt", 0),
                    Chunk::new("Berlin is the capital of Germany", "geo.txt", 1),
                    Chunk::new("Bananas are yellow", "fruit.txt", 0),
                ],
                8,
                false,
                Path::new(""),
            )
            .unwrap();
        Arc::new(store)
    }

    fn engine(generator: Arc<RecordingGenerator>, generation: GenerationConfig) -> QueryEngine {
        let search = SearchConfig {
            default_k: 2,
            ..Default::default()
        };
        QueryEngine::new(store(), generator, &generation, &search)
    }

    #[tokio::test]
    async fn test_answer_renders_context_and_question() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(generator.clone(), GenerationConfig::default());
        let mut budget = BudgetTracker::new();

        let answer = engine.answer("What is the capital of France?", &mut budget).await.unwrap();
        assert_eq!(answer.text, "Paris.");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].chunk.content, "Paris is the capital of France");

        let prompts = generator.prompts.lock();
        let prompt = &prompts[0];
        assert!(prompt.starts_with("<s>[INST] \n"));
        assert!(prompt.contains("Paris is the capital of France"));
        assert!(prompt.ends_with("[INST] What is the capital of France? [/INST]\n"));
    }

    #[tokio::test]
    async fn test_budget_and_history_are_updated() {
        let generator = Arc::new(RecordingGenerator::default());
        let generation = GenerationConfig {
            cost_per_1k_tokens: 1.0,
            ..Default::default()
        };
        let engine = engine(generator.clone(), generation);
        let mut budget = BudgetTracker::new();

        let first = engine.answer("capital of France", &mut budget).await.unwrap();
        assert!(first.cost > 0.0);
        assert!(budget.total_tokens() > 0);

        engine.answer("and of Germany", &mut budget).await.unwrap();
        assert!(generator.prompts.lock()[1].contains(" capital of France [/INST]\n Paris. "));

        for q in ["q3", "q4"] {
            engine.answer(q, &mut budget).await.unwrap();
        }
        let history = engine.history();
        let questions: Vec<_> = history.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["q3", "q4"]);
        assert_eq!(budget.queries(), 4);
    }

    #[tokio::test]
    async fn test_context_budget_limits_sources() {
        let generator = Arc::new(RecordingGenerator::default());
        let search = SearchConfig {
            default_k: 3,
            max_context_chars: 40,
            ..Default::default()
        };
        let engine = QueryEngine::new(store(), generator, &GenerationConfig::default(), &search);
        let answer = engine.answer("capital", &mut BudgetTracker::new()).await.unwrap();
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_answer_settles_on_finish() {
        let generator = Arc::new(RecordingGenerator::default());
        let engine = engine(generator, GenerationConfig::default());
        let mut budget = BudgetTracker::new();

        let mut stream = engine.answer_stream("capital of France").await.unwrap();
        assert_eq!(stream.next().await.as_deref(), Some("Par"));
        let answer = stream.finish(&mut budget).await;
        assert_eq!(answer.text, "Paris.");
        assert_eq!(budget.queries(), 1);
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn test_unbuilt_store_asks_for_build() {
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(HashingEmbedder::default());
        let empty: Arc<dyn VectorStore> =
            Arc::new(NeoStore::new(embedder, SimilarityMetric::Cosine));
        let engine = QueryEngine::new(
            empty,
            Arc::new(RecordingGenerator::default()),
            &GenerationConfig::default(),
            &SearchConfig::default(),
        );
        let err = engine.answer("anything", &mut BudgetTracker::new()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RagError>(), Some(RagError::EmptyStore)));
    }

    /// Delegates to a real store and notes which thread ran each search.
    struct ThreadRecordingStore {
        inner: Arc<dyn VectorStore>,
        threads: Mutex<Vec<ThreadId>>,
    }

    impl VectorStore for ThreadRecordingStore {
        fn backend(&self) -> crate::store::StoreBackend {
            self.inner.backend()
        }

        fn build(&mut self, _chunks: Vec<Chunk>) -> crate::error::Result<usize> {
            Ok(self.inner.len())
        }

        fn search(&self, query: &str, k: usize) -> crate::error::Result<Vec<SearchHit>> {
            self.threads.lock().push(thread::current().id());
            self.inner.search(query, k)
        }

        fn persist(&self, path: &Path) -> crate::error::Result<PathBuf> {
            self.inner.persist(path)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[tokio::test]
    async fn test_search_runs_off_the_runtime_thread() {
        let recording = Arc::new(ThreadRecordingStore {
            inner: store(),
            threads: Mutex::new(Vec::new()),
        });
        let engine = QueryEngine::new(
            recording.clone(),
            Arc::new(RecordingGenerator::default()),
            &GenerationConfig::default(),
            &SearchConfig::default(),
        );

        let answer = engine.answer("capital of France", &mut BudgetTracker::new()).await.unwrap();
        assert_eq!(answer.sources[0].chunk.content, "Paris is the capital of France");

        let threads = recording.threads.lock();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], thread::current().id());
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let engine = engine(Arc::new(RecordingGenerator::default()), GenerationConfig::default());
        assert!(engine.answer("   ", &mut BudgetTracker::new()).await.is_err());
    }
}
