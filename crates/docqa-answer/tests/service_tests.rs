mod common;

use std::sync::Arc;
use std::time::Duration;

use docqa_answer::{cancellation, CancellationListener, RagService};
use docqa_core::chunker::ChunkingConfig;
use docqa_core::config::{RagSettings, Settings};
use docqa_core::error::Error;
use docqa_core::registry::ChunkerRegistry;
use docqa_core::traits::{EmbeddingGateway, VectorStore};
use docqa_core::types::{Metadata, Query};
use docqa_embed::HashEmbedder;
use docqa_vector::MemoryStore;

use common::{FailingGenerator, RecordingGenerator, ScriptedEmbedder, StalledGenerator};

const GUIDE: &str = "Tomatoes need full sun and deep watering twice a week.\n\n\
Store seed packets in a cool dry place away from light.\n\n\
Compost piles should be turned every two weeks to stay aerobic.";

fn meta(content: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert("content".into(), content.into());
    m.insert("chunkIndex".into(), 0.into());
    m
}

fn hash_service(generator: Arc<RecordingGenerator>) -> RagService {
    let embedder: Arc<dyn EmbeddingGateway> = Arc::new(HashEmbedder::new(256));
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    RagService::new(embedder, generator, store)
        .with_registry(ChunkerRegistry::new(ChunkingConfig { max_chars: 70 }))
}

/// One fragment at [1, 0]; "far" embeds at cosine 0.3 from it, "near" at 1.0.
fn scripted_store() -> anyhow::Result<(Arc<dyn EmbeddingGateway>, Arc<dyn VectorStore>)> {
    let far = vec![0.3, (1.0f32 - 0.09).sqrt()];
    let embedder: Arc<dyn EmbeddingGateway> =
        Arc::new(ScriptedEmbedder::new(2).with("far", far).with("near", vec![2.0, 0.0]));
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());
    store.insert("doc", "doc:0", vec![1.0, 0.0], meta("the stored fact"))?;
    Ok((embedder, store))
}

#[tokio::test]
async fn ingest_then_ask_answers_from_matching_fragment() -> anyhow::Result<()> {
    let generator = Arc::new(RecordingGenerator::new("Full sun [Source 1]."));
    let service = hash_service(Arc::clone(&generator));

    let report = service.ingest("guide", GUIDE.as_bytes(), "garden.txt").await?;
    assert_eq!(report.chunks_stored, 3);

    let question = "Store seed packets in a cool dry place away from light.";
    let query = Query::new(question)?.with_session_id("s-1").with_max_sources(2)?;
    let answer = service.ask(query, &CancellationListener::never()).await;

    assert!(answer.succeeded, "{:?}", answer.error_detail);
    assert_eq!(answer.error_detail, None);
    assert_eq!(answer.text, "Full sun [Source 1].");
    assert_eq!(answer.session_id, "s-1");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].fragment_id, "guide:1");
    assert!((answer.sources[0].score - 1.0).abs() < 1e-5);
    assert!(answer.token_estimate > 0);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("Based on the following information:"));
    assert!(prompts[0].contains(&format!("[Source 1]\n{question}")));
    assert!(prompts[0].contains(&format!("Question: {question}")));
    Ok(())
}

#[tokio::test]
async fn low_scores_yield_the_no_results_answer() -> anyhow::Result<()> {
    let (embedder, store) = scripted_store()?;
    let generator = Arc::new(RecordingGenerator::new("unused"));
    let service = RagService::new(embedder, Arc::clone(&generator) as Arc<dyn docqa_core::traits::GenerationGateway>, store);

    let answer = service.ask(Query::new("far")?, &CancellationListener::never()).await;

    assert!(answer.succeeded);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.text, RagSettings::default().no_results_message);
    assert_eq!(answer.token_estimate, 0);
    assert!(generator.prompts().is_empty());
    Ok(())
}

#[tokio::test]
async fn lower_threshold_admits_the_weak_match() -> anyhow::Result<()> {
    let (embedder, store) = scripted_store()?;
    let service = RagService::new(embedder, Arc::new(RecordingGenerator::new("ok")), store);

    let query = Query::new("far")?.with_min_score(0.25)?;
    let answer = service.ask(query, &CancellationListener::never()).await;

    assert!(answer.succeeded);
    assert_eq!(answer.sources.len(), 1);
    assert!((answer.sources[0].score - 0.3).abs() < 1e-4);
    Ok(())
}

#[tokio::test]
async fn generation_failure_becomes_a_failed_answer() -> anyhow::Result<()> {
    let (embedder, store) = scripted_store()?;
    let generator = Arc::new(FailingGenerator { message: "model overloaded".into() });
    let service = RagService::new(embedder, generator, store);

    let answer = service
        .ask(Query::new("near")?.with_session_id("s-9"), &CancellationListener::never())
        .await;

    assert!(!answer.succeeded);
    assert_eq!(answer.error_detail.as_deref(), Some("model overloaded"));
    assert_eq!(answer.text, RagSettings::default().error_message);
    assert_eq!(answer.session_id, "s-9");
    assert!(answer.elapsed > Duration::ZERO);
    Ok(())
}

#[tokio::test]
async fn embedding_failure_becomes_a_failed_answer() -> anyhow::Result<()> {
    let (embedder, store) = scripted_store()?;
    let service = RagService::new(embedder, Arc::new(RecordingGenerator::new("x")), store);

    let answer = service.ask(Query::new("unknown")?, &CancellationListener::never()).await;

    assert!(!answer.succeeded);
    assert_eq!(answer.error_detail.as_deref(), Some("no vector scripted for 'unknown'"));
    Ok(())
}

#[tokio::test]
async fn configured_messages_are_used() -> anyhow::Result<()> {
    let (embedder, store) = scripted_store()?;
    let mut settings = Settings::default();
    settings.rag.no_results_message = "Nothing found.".into();
    let service = RagService::from_settings(
        &settings,
        embedder,
        Arc::new(RecordingGenerator::new("x")),
        store,
    );

    let answer = service.ask(Query::new("far")?, &CancellationListener::never()).await;
    assert_eq!(answer.text, "Nothing found.");
    Ok(())
}

#[tokio::test]
async fn cancelling_a_stalled_ask_returns_promptly() -> anyhow::Result<()> {
    let (embedder, store) = scripted_store()?;
    let service = Arc::new(RagService::new(embedder, Arc::new(StalledGenerator), store));
    let (handle, listener) = cancellation();

    let query = Query::new("near")?;
    let task = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.ask(query, &listener).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    let answer = tokio::time::timeout(Duration::from_secs(2), task).await??;
    assert!(!answer.succeeded);
    assert_eq!(answer.error_detail.as_deref(), Some("operation cancelled"));
    Ok(())
}

#[tokio::test]
async fn already_cancelled_ask_does_not_call_the_generator() -> anyhow::Result<()> {
    let (embedder, store) = scripted_store()?;
    let generator = Arc::new(RecordingGenerator::new("x"));
    let service = RagService::new(embedder, Arc::clone(&generator) as Arc<dyn docqa_core::traits::GenerationGateway>, store);
    let (handle, listener) = cancellation();
    handle.cancel();

    let answer = service.ask(Query::new("near")?, &listener).await;
    assert!(!answer.succeeded);
    assert!(generator.prompts().is_empty());
    Ok(())
}

#[tokio::test]
async fn generate_answer_returns_generator_text_verbatim() -> anyhow::Result<()> {
    let (embedder, store) = scripted_store()?;
    let generator = Arc::new(RecordingGenerator::new("  spaced reply \n"));
    let service = RagService::new(embedder, Arc::clone(&generator) as Arc<dyn docqa_core::traits::GenerationGateway>, Arc::clone(&store));

    let sources = store.search(&[1.0, 0.0], 1)?;
    let text = service
        .generate_answer("what is stored?", &sources, &CancellationListener::never())
        .await?;
    assert_eq!(text, "  spaced reply \n");
    assert!(generator.prompts()[0].contains("[Source 1]\nthe stored fact"));
    Ok(())
}

#[tokio::test]
async fn concurrent_asks_share_the_store() -> anyhow::Result<()> {
    let generator = Arc::new(RecordingGenerator::new("answer"));
    let service = Arc::new(hash_service(Arc::clone(&generator)));
    service.ingest("guide", GUIDE.as_bytes(), "garden.txt").await?;

    let questions = [
        "Tomatoes need full sun and deep watering twice a week.",
        "Store seed packets in a cool dry place away from light.",
        "Compost piles should be turned every two weeks to stay aerobic.",
    ];
    let queries = questions
        .iter()
        .enumerate()
        .map(|(i, q)| Query::new(*q).map(|q| q.with_session_id(format!("s-{i}"))))
        .collect::<Result<Vec<_>, _>>()?;
    let asks = queries.into_iter().map(|query| {
        let service = Arc::clone(&service);
        async move { service.ask(query, &CancellationListener::never()).await }
    });
    let answers = futures::future::join_all(asks).await;

    for (i, answer) in answers.into_iter().enumerate() {
        assert!(answer.succeeded);
        assert_eq!(answer.session_id, format!("s-{i}"));
        assert_eq!(answer.sources[0].fragment_id, format!("guide:{i}"));
    }
    assert_eq!(generator.prompts().len(), 3);
    Ok(())
}

#[tokio::test]
async fn delete_document_reports_removed_fragments() -> anyhow::Result<()> {
    let service = hash_service(Arc::new(RecordingGenerator::new("x")));
    service.ingest("guide", GUIDE.as_bytes(), "garden.txt").await?;

    assert_eq!(service.delete_document("guide")?.deleted_count, 3);
    assert_eq!(service.delete_document("guide")?.deleted_count, 0);
    assert!(service.delete_document("  ").is_err());

    let answer = service
        .ask(Query::new("Tomatoes need full sun")?, &CancellationListener::never())
        .await;
    assert!(answer.succeeded);
    assert!(answer.sources.is_empty());
    Ok(())
}

#[tokio::test]
async fn documents_and_inspection_reflect_the_latest_ingest() -> anyhow::Result<()> {
    let service = hash_service(Arc::new(RecordingGenerator::new("x")));
    service.ingest("guide", GUIDE.as_bytes(), "garden.txt").await?;
    service.ingest("memo", "Buy more seed trays.".as_bytes(), "memo.txt").await?;

    let docs = service.documents()?;
    let listed: Vec<_> = docs.iter().map(|d| (d.document_id.as_str(), d.fragment_count)).collect();
    assert_eq!(listed, vec![("guide", 3), ("memo", 1)]);
    assert_eq!(docs[0].file_name.as_deref(), Some("garden.txt"));
    assert!(docs[0].preview.starts_with("Tomatoes need full sun"));

    service.ingest("guide", "Only one line now.".as_bytes(), "garden.txt").await?;
    let fragments = service.inspect_document("guide")?;
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].content, "Only one line now.");

    assert!(matches!(service.inspect_document("missing"), Err(Error::NotFound(_))));
    assert!(matches!(service.inspect_document(" "), Err(Error::Validation(_))));
    Ok(())
}
