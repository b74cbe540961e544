use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use scriptorium::driver::{build_index, search_index};
use scriptorium::eval::{evaluate, parse_query_file};
use scriptorium::index::InvertedIndex;
use scriptorium::posting::PostingClass;
use scriptorium::ranker::{
    ranker_factory, Bm25OptimizedRanker, Bm25Ranker, Ranker, TfIdfOptimizedRanker, TfIdfRanker,
};
use scriptorium::record_parser::RecordParser;
use scriptorium::spimi::SpimiIndexer;
use scriptorium::tokenizer::Tokenizer;

#[derive(Parser)]
#[command(name = "scriptorium", version, about = "SPIMI indexer and ranked search engine")]
struct Cli {
    /// Raise logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an inverted index from a set of CSV/TSV record files
    Index {
        #[arg(long, num_args = 1..)]
        documents: Vec<PathBuf>,
        #[arg(long)]
        stop_words: Option<PathBuf>,
        #[arg(long, default_value_t = 2)]
        min_token_length: usize,
        #[arg(long, default_value = "english")]
        language: String,
        #[arg(long, default_value = "frequency")]
        posting_list_type: String,
        #[arg(long, default_value_t = 100_000)]
        max_block_size: usize,
        #[arg(long, default_value_t = 80)]
        max_ram: u8,
        #[arg(long, default_value = "BM25")]
        ranker: String,
        #[arg(long, default_value_t = 1.2)]
        k: f64,
        #[arg(long, default_value_t = 0.75)]
        b: f64,
        #[arg(long, default_value = "index.out")]
        output: PathBuf,
        #[arg(long, default_value = "doc_id")]
        doc_id_column: String,
        #[arg(long, num_args = 1.., value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long, default_value = ",")]
        delimiter: String,
        #[arg(long)]
        scratch_dir: Option<PathBuf>,
    },
    /// Run a ranked query against a previously built index
    Search {
        #[arg(long)]
        index_path: PathBuf,
        #[arg(long, num_args = 1..)]
        query: Vec<String>,
        #[arg(long, default_value_t = 10)]
        n: usize,
        #[arg(long, default_value_t = false)]
        show_score: bool,
    },
    /// Evaluate a ranker against a labeled relevance query file
    Eval {
        #[arg(long)]
        index_path: PathBuf,
        #[arg(long)]
        queries: PathBuf,
        #[arg(long, default_value_t = 10)]
        n: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    match cli.command {
        Commands::Index {
            documents,
            stop_words,
            min_token_length,
            language,
            posting_list_type,
            max_block_size,
            max_ram,
            ranker,
            k,
            b,
            output,
            doc_id_column,
            columns,
            delimiter,
            scratch_dir,
        } => run_index(
            documents,
            stop_words,
            min_token_length,
            language,
            posting_list_type,
            max_block_size,
            max_ram,
            ranker,
            k,
            b,
            output,
            doc_id_column,
            columns,
            delimiter,
            scratch_dir,
        ),
        Commands::Search { index_path, query, n, show_score } => {
            run_search(index_path, query, n, show_score)
        }
        Commands::Eval { index_path, queries, n } => run_eval(index_path, queries, n),
    }
}

/// Instantiate the ranker named in `--ranker`, applying `k`/`b` where the
/// chosen ranker accepts them. Constructed directly rather than through
/// `ranker_factory` so `--k`/`--b` can be threaded in at build time, before
/// any metadata exists to load them back from.
fn ranker_for_build(name: &str, k: f64, b: f64) -> Result<Box<dyn Ranker>> {
    Ok(match name {
        "BM25" => Box::new(Bm25Ranker::with_params(k, b)),
        "BM25_OPTIMIZED" => {
            let mut r = Bm25OptimizedRanker::default();
            r.set_bm25_params(k, b);
            Box::new(r)
        }
        "TF_IDF" => Box::new(TfIdfRanker::default()),
        "TF_IDF_OPTIMIZED" => Box::new(TfIdfOptimizedRanker::default()),
        "NONE" => Box::new(scriptorium::ranker::NoOpRanker),
        other => anyhow::bail!("unknown ranker: {other}"),
    })
}

#[allow(clippy::too_many_arguments)]
fn run_index(
    documents: Vec<PathBuf>,
    stop_words: Option<PathBuf>,
    min_token_length: usize,
    language: String,
    posting_list_type: String,
    max_block_size: usize,
    max_ram: u8,
    ranker_name: String,
    k: f64,
    b: f64,
    output: PathBuf,
    doc_id_column: String,
    columns: Vec<String>,
    delimiter: String,
    scratch_dir: Option<PathBuf>,
) -> Result<()> {
    let posting_class = match posting_list_type.as_str() {
        "boolean" => PostingClass::Boolean,
        "frequency" => PostingClass::Frequency,
        "positional" => PostingClass::Positional,
        other => anyhow::bail!("unknown posting-list-type: {other}"),
    };

    let delimiter_byte = *delimiter.as_bytes().first().unwrap_or(&b',');
    let parser = RecordParser::new(doc_id_column, columns, delimiter_byte);
    let tokenizer = Tokenizer::new(min_token_length, stop_words.as_deref(), Some(language.as_str()))
        .context("building tokenizer")?;

    let mut ranker = ranker_for_build(&ranker_name, k, b)?;

    let scratch_dir = scratch_dir.unwrap_or_else(|| output.with_extension("scratch"));
    let indexer = SpimiIndexer::new(&scratch_dir, max_block_size, max_ram, posting_class)
        .context("creating SPIMI indexer")?;

    let doc_mapping_path = output.with_extension("docmap");
    let total = build_index(
        &documents,
        &parser,
        &tokenizer,
        indexer,
        ranker.as_mut(),
        &output,
        &doc_mapping_path,
        stop_words.as_deref(),
    )
    .context("building index")?;

    log::info!("indexed {total} documents into {}", output.display());
    Ok(())
}

fn run_search(index_path: PathBuf, query: Vec<String>, n: usize, show_score: bool) -> Result<()> {
    let query_text = query.join(" ");
    let ranker_name = peek_ranker_name(&index_path)?;
    let mut ranker = ranker_factory(&ranker_name);

    let results = search_index(&index_path, &query_text, n, ranker.as_mut()).context("running search")?;

    for (doc_id, score) in results {
        if show_score {
            println!("{doc_id}\t{score:.6}");
        } else {
            println!("{doc_id}");
        }
    }
    Ok(())
}

fn run_eval(index_path: PathBuf, queries: PathBuf, n: usize) -> Result<()> {
    let mut index = InvertedIndex::open(&index_path).context("opening index")?;
    let ranker_name = index
        .metadata
        .get("ranker")
        .and_then(|v| v.as_str())
        .unwrap_or("NONE")
        .to_string();
    let mut ranker = ranker_factory(&ranker_name);
    ranker.load_metadata(&index.metadata).context("loading ranker metadata")?;

    let min_token_length = index.metadata.get("min_token_length").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
    let language = index.metadata.get("language").and_then(|v| v.as_str()).map(|s| s.to_string());
    let stop_words = index.metadata.get("stop_words").and_then(|v| v.as_str());
    let tokenizer =
        Tokenizer::new(min_token_length, stop_words.map(std::path::Path::new), language.as_deref())
            .context("building tokenizer")?;

    let labeled_queries = parse_query_file(&queries).context("parsing labeled query file")?;
    let report = evaluate(&mut index, ranker.as_ref(), &tokenizer, &labeled_queries, n)
        .context("evaluating queries")?;

    println!("queries:          {}", report.per_query.len());
    println!("mean precision:   {:.4}", report.mean_precision);
    println!("mean recall:      {:.4}", report.mean_recall);
    println!("mean F1:          {:.4}", report.mean_f1);
    println!("mean NDCG:        {:.4}", report.mean_ndcg);
    println!("throughput (q/s): {:.2}", report.throughput_qps);
    Ok(())
}

fn peek_ranker_name(index_path: &PathBuf) -> Result<String> {
    let index = InvertedIndex::open(index_path).context("opening index")?;
    Ok(index.metadata.get("ranker").and_then(|v| v.as_str()).unwrap_or("NONE").to_string())
}
