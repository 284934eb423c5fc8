use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use docqa_answer::{Ingestor, Retriever};
use docqa_core::config::{Config, Settings, StoreKind};
use docqa_core::registry::file_extension;
use docqa_core::traits::{EmbeddingGateway, VectorStore};
use docqa_core::types::meta_keys;
use docqa_embed::embedder_from_settings;
use docqa_vector::store_from_settings;

const USAGE: &str = "\
Usage: docqa <command> [args...]

Commands:
  ingest <path>                     index a file or every supported file under a directory
  search <question> [--top N] [--min-score X]
                                    list the best matching fragments
  delete <document-id>              remove a document's fragments
  list                              list indexed documents
  inspect <document-id>             print a document's fragments in order
  formats                           list supported file extensions";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

struct Components {
    settings: Settings,
    embedder: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
}

impl Components {
    fn load() -> anyhow::Result<Self> {
        let config = Config::load().context("loading configuration")?;
        let settings = config.settings()?;
        if settings.store.kind == StoreKind::Memory {
            warn!("store.kind is memory; nothing persists after this command");
        }
        let embedder = embedder_from_settings(&settings.embedding)?;
        let store = store_from_settings(&settings.store, &env::current_dir()?)?;
        Ok(Self { settings, embedder, store })
    }

    fn ingestor(&self) -> Ingestor {
        Ingestor::from_settings(
            &self.settings,
            Arc::clone(&self.embedder),
            Arc::clone(&self.store),
        )
    }
}

/// Files to ingest under `root` paired with their document ids.
fn collect_files(root: &Path, supported: &[String]) -> anyhow::Result<Vec<(String, PathBuf)>> {
    if root.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("path has no file name")?;
        return Ok(vec![(name, root.to_path_buf())]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let ext = file_extension(&name);
        if !supported.iter().any(|s| s.eq_ignore_ascii_case(&ext)) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let id = relative.to_string_lossy().replace('\\', "/");
        files.push((id, entry.path().to_path_buf()));
    }
    Ok(files)
}

async fn ingest(components: &Components, args: &[String]) -> anyhow::Result<()> {
    let Some(root) = args.first().map(PathBuf::from) else {
        bail!("ingest needs a file or directory");
    };
    let ingestor = components.ingestor();
    let files = collect_files(&root, &ingestor.supported_formats())?;
    if files.is_empty() {
        println!("No supported files under {}", root.display());
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}",
            )?
            .progress_chars("#>-"),
    );

    let (mut chunks, mut failed) = (0usize, 0usize);
    for (document_id, path) in &files {
        pb.set_message(document_id.clone());
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| document_id.clone());
        let reader = BufReader::new(File::open(path)?);
        match ingestor.ingest(document_id, reader, &file_name).await {
            Ok(report) => chunks += report.chunks_stored,
            Err(err) => {
                failed += 1;
                pb.suspend(|| eprintln!("{}: {err}", path.display()));
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message("done");

    info!(files = files.len(), chunks, failed, "ingest finished");
    println!("Ingested {} files ({chunks} fragments, {failed} failed)", files.len() - failed);
    Ok(())
}

fn flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> anyhow::Result<Option<T>> {
    match args.iter().position(|a| a == flag) {
        None => Ok(None),
        Some(i) => match args.get(i + 1).and_then(|v| v.parse().ok()) {
            Some(v) => Ok(Some(v)),
            None => bail!("{flag} requires a value"),
        },
    }
}

async fn search(components: &Components, args: &[String]) -> anyhow::Result<()> {
    let Some(question) = args.first().filter(|q| !q.starts_with("--")) else {
        bail!("search needs a question");
    };
    let top = flag_value(args, "--top")?.unwrap_or(components.settings.rag.max_sources);
    let min_score =
        flag_value(args, "--min-score")?.unwrap_or(components.settings.rag.min_score);

    let retriever =
        Retriever::new(Arc::clone(&components.embedder), Arc::clone(&components.store));
    let hits = retriever.retrieve(question, top, min_score).await?;
    if hits.is_empty() {
        println!("{}", components.settings.rag.no_results_message);
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        let preview: String = hit.content.chars().take(160).collect();
        println!("[{}] {:.3}  {} #{}", i + 1, hit.score, hit.document_id, hit.sequence);
        println!("    {}", preview.replace('\n', " "));
    }
    Ok(())
}

fn delete(components: &Components, args: &[String]) -> anyhow::Result<()> {
    let Some(document_id) = args.first() else {
        bail!("delete needs a document id");
    };
    let removed = components.store.delete_by_document(document_id)?;
    println!("Removed {removed} fragments of {document_id}");
    Ok(())
}

fn list(components: &Components) -> anyhow::Result<()> {
    let documents = components.store.documents()?;
    if documents.is_empty() {
        println!("No documents indexed");
        return Ok(());
    }
    for doc in &documents {
        let file_name = doc.file_name.as_deref().unwrap_or("-");
        println!("{}  {}  {} fragments", doc.document_id, file_name, doc.fragment_count);
        println!("    {}", doc.preview.replace('\n', " "));
    }
    println!("{} documents, {} fragments", documents.len(), components.store.len());
    Ok(())
}

fn inspect(components: &Components, args: &[String]) -> anyhow::Result<()> {
    let Some(document_id) = args.first() else {
        bail!("inspect needs a document id");
    };
    let fragments = components.store.document_fragments(document_id)?;
    if fragments.is_empty() {
        bail!("no document {document_id}");
    }
    for fragment in &fragments {
        let page = fragment
            .metadata
            .get(meta_keys::PAGE_NUMBER)
            .map(|p| format!(" page {p}"))
            .unwrap_or_default();
        println!("--- #{}{page} ({} chars)", fragment.sequence, fragment.content.chars().count());
        println!("{}", fragment.content);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (cmd, args) = parse_args();
    let components = Components::load()?;
    match cmd.as_str() {
        "ingest" => ingest(&components, &args).await?,
        "search" => search(&components, &args).await?,
        "delete" => delete(&components, &args)?,
        "list" => list(&components)?,
        "inspect" => inspect(&components, &args)?,
        "formats" => {
            for ext in components.ingestor().supported_formats() {
                println!("{ext}");
            }
        }
        other => {
            eprintln!("Unknown command '{other}'\n\n{USAGE}");
            std::process::exit(1);
        }
    }
    Ok(())
}
