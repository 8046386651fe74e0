//! Optimize over a JSONL corpus and print the exam report.
//!
//! Usage: `bo-search <run-config.json> <corpus.jsonl>`

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use bo_corpus::{ComposedCorpus, Corpus, HashingEmbedder, JsonlStorage};
use bo_optimizer::{
    bleu_scorer, field_scorer, telemetry, CorpusOptimizer, Evaluate, Examinator, RunConfig,
};

fn main() -> Result<()> {
    telemetry::init_tracing("info");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config_path, corpus_path] = args.as_slice() else {
        bail!("usage: bo-search <run-config.json> <corpus.jsonl>");
    };

    let config = RunConfig::from_json_file(config_path)
        .with_context(|| format!("failed to load run config {config_path}"))?;
    let storage = JsonlStorage::from_jsonl_file(corpus_path)
        .with_context(|| format!("failed to load corpus {corpus_path}"))?;
    let scorer: Evaluate = match &config.bleu {
        Some(bleu) => Box::new(bleu_scorer(
            &storage,
            &bleu.target_key,
            &bleu.references_key,
            bleu.method.scorer(),
        )?),
        None => Box::new(field_scorer(&storage, &config.score_key)?),
    };

    let embedder = HashingEmbedder::new(config.embedding_dims);
    let corpus = ComposedCorpus::index_storage(
        Box::new(storage),
        &embedder,
        &config.storage_key,
        &config.index,
    )?;

    let mut optimizer = match &config.kmedoids {
        Some(options) => {
            CorpusOptimizer::kmedoids(Arc::clone(corpus.index()), scorer, options, config.direction)?
        }
        None => CorpusOptimizer::for_corpus(
            &corpus,
            scorer,
            &config.steps,
            config.direction,
            config.seed,
        )?,
    };
    optimizer.run(config.max_steps)?;

    if let Some(best) = optimizer.best() {
        info!(
            "Best item {:?} scored {} at trial {}",
            best.result.indices.first(),
            best.evaluation,
            best.trial
        );
    }

    let report = Examinator::presets().examine(optimizer.index(), &optimizer.evaluations())?;
    println!("{}", serde_json::to_string_pretty(&report.to_records())?);
    Ok(())
}
