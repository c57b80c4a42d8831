use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use evp_core::config::AppConfig;
use evp_core::error::AppError;
use evp_core::logging;
use evp_retrieval::context::AuditContext;
use evp_retrieval::evidence::EvidenceFilters;
use evp_retrieval::pack::{PackRequest, RedactionRequest};
use serde::Serialize;
use tracing::error;

#[derive(Parser)]
#[command(name = "evidencepack")]
#[command(author, version, about = "Evidence retrieval and audit-pack assembly")]
struct Cli {
    /// YAML config file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "evidencepack.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a plain-text file, or every plain-text file under a directory.
    Ingest { path: PathBuf },

    /// Semantic search over ingested fragments.
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },

    /// Build an audit pack from a query, a case's draft provenance, or both.
    Pack {
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        case_id: Option<String>,
        #[arg(long)]
        max_items: Option<usize>,
        /// Redaction regex; repeatable. Merged with the redaction config file.
        #[arg(long = "pattern")]
        patterns: Vec<String>,
        /// Restrict evidence to these document ids; repeatable.
        #[arg(long = "doc-id")]
        doc_ids: Vec<String>,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long, default_value = "dev")]
        created_by: String,
        /// Ignore draft provenance even when a case id is given.
        #[arg(long)]
        no_provenance: bool,
    },

    /// Print a pack's manifest.
    Manifest { pack_id: String },

    /// Print the archive path and hash of a finished pack.
    Download { pack_id: String },

    /// Re-hash a pack against its manifest and chain of custody.
    Verify { pack_id: String },
}

fn to_json<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new("CLI_OUTPUT_ENCODE_FAILED", "Failed to encode output").with_details(e.to_string())
    })
}

/// Returns the JSON to print and whether the command succeeded.
fn run(command: Commands, config: AppConfig) -> Result<(String, bool), AppError> {
    let packs_dir = config.packs_dir.clone();
    match command {
        Commands::Ingest { path } => {
            let ctx = AuditContext::open(config)?;
            Ok((to_json(&evidencepack_lib::ingest(&ctx, &path)?)?, true))
        }
        Commands::Search { query, top_k } => {
            let ctx = AuditContext::open(config)?;
            Ok((to_json(&evidencepack_lib::search(&ctx, &query, top_k)?)?, true))
        }
        Commands::Pack {
            query,
            case_id,
            max_items,
            patterns,
            doc_ids,
            mode,
            created_by,
            no_provenance,
        } => {
            let ctx = AuditContext::open(config)?;
            let req = PackRequest {
                created_by,
                case_id,
                query,
                filters: EvidenceFilters { doc_ids },
                include_provenance: !no_provenance,
                redaction: RedactionRequest { mode, patterns },
                max_items,
            };
            Ok((to_json(&evidencepack_lib::create_pack(&ctx, &req)?)?, true))
        }
        Commands::Manifest { pack_id } => Ok((
            to_json(&evidencepack_lib::get_manifest(&packs_dir, &pack_id)?)?,
            true,
        )),
        Commands::Download { pack_id } => Ok((
            to_json(&evidencepack_lib::download_pack(&packs_dir, &pack_id)?)?,
            true,
        )),
        Commands::Verify { pack_id } => {
            let report = evidencepack_lib::verify(&packs_dir, &pack_id)?;
            Ok((to_json(&report)?, report.ok))
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            logging::init(None);
            return fail(&e);
        }
    };
    logging::init(config.log_dir.as_deref());

    match run(cli.command, config) {
        Ok((out, ok)) => {
            println!("{out}");
            if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => fail(&e),
    }
}

fn fail(e: &AppError) -> ExitCode {
    error!(code = %e.code, kind = ?e.kind(), "{}", e.message);
    match serde_json::to_string_pretty(e) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("{e}"),
    }
    ExitCode::FAILURE
}
