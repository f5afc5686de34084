//! catmig - catalog migration command line
//!
//! Subcommands:
//! - `reconcile`: reconcile a record file against the authority catalog
//! - `fetch`: save authority MARCXML for every identifier in a record file
//! - `compare`: list local identifiers the authority has renumbered
//! - `load-cache`: seed the authority cache from a MARCXML collection
//! - `modify`: apply the institution policy only

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use catmig_common::config::{load_toml_config, resolve_config_path, TomlConfig};
use catmig_common::marc::{Iso2709Reader, Iso2709Writer, TextWriter};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catmig_recon::audit::AuditLog;
use catmig_recon::authority::{CacheStore, ReconciliationSource, SqliteCache, WorldCatClient};
use catmig_recon::output::{Outcome, OutputRouter, RecordSink};
use catmig_recon::policy::policy_by_name;
use catmig_recon::substitution::{Strategy, SubstitutionEngine, SubstitutionRules};
use catmig_recon::{config, tasks, PipelineOptions, ReconciliationPipeline};

/// Command-line arguments for catmig
#[derive(Parser, Debug)]
#[command(name = "catmig")]
#[command(about = "Reconcile catalog records against an authority catalog")]
#[command(version)]
struct Cli {
    /// Config file (overrides CATMIG_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for record outputs, audit logs and MARCXML
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a record file against the authority catalog
    Reconcile(ReconcileArgs),
    /// Save the authority record for every identifier in a record file
    Fetch(LookupArgs),
    /// Report local identifiers that differ from the authority's
    Compare(LookupArgs),
    /// Load a MARCXML collection into the authority cache
    LoadCache {
        /// MARCXML collection file
        collection: PathBuf,
    },
    /// Apply only the institution policy to a record file
    Modify {
        /// ISO 2709 record file
        source: PathBuf,

        /// Institution policy (none, art-school)
        #[arg(long)]
        policy: Option<String>,

        /// Write ISO 2709 instead of pretty text
        #[arg(long)]
        binary_output: bool,
    },
}

/// Authority access shared by every subcommand that resolves identifiers
#[derive(Args, Debug)]
struct LookupOptions {
    /// Answer lookups from the cache only, never the network
    #[arg(long)]
    cache: bool,

    /// Store every live lookup in the cache
    #[arg(long, conflicts_with = "cache")]
    cache_insert: bool,

    /// Authority API key (overrides CATMIG_API_KEY and the config file)
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Args, Debug)]
struct LookupArgs {
    /// ISO 2709 record file
    source: PathBuf,

    #[command(flatten)]
    lookup: LookupOptions,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// ISO 2709 record file
    source: PathBuf,

    #[command(flatten)]
    lookup: LookupOptions,

    /// Require an exact title match; imperfect matches are substituted and flagged
    #[arg(long)]
    perfect_match: bool,

    /// Skip title verification entirely
    #[arg(long)]
    no_title_check: bool,

    /// Write the field substitution audit log
    #[arg(long)]
    track_fields: bool,

    /// Write the title comparison audit log
    #[arg(long)]
    track_title_matches: bool,

    /// Save every authority record as a MARCXML collection
    #[arg(long)]
    save_authority: bool,

    /// Write ISO 2709 instead of pretty text
    #[arg(long)]
    binary_output: bool,

    /// Substitution strategy (replace_and_add, replace_only)
    #[arg(long)]
    strategy: Option<String>,

    /// Minimum fuzzy title ratio (0-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    min_ratio: Option<u8>,

    /// Institution policy (none, art-school)
    #[arg(long)]
    policy: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let toml_config =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting catmig v{}", env!("CARGO_PKG_VERSION"));

    let root = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| toml_config.output_dir());

    match cli.command {
        Command::Reconcile(args) => {
            let layout = OutputLayout::create(&root)?;
            reconcile(args, &toml_config, &layout).await
        }
        Command::Fetch(args) => {
            let layout = OutputLayout::create(&root)?;
            let mut source = build_source(&args.lookup, &toml_config).await?;
            let path = layout.xml_file("authority-records");
            let mut out = create_file(&path)?;
            tasks::fetch_authority_records(open_records(&args.source)?, &mut source, &mut out)
                .await?;
            info!("Authority records written to {}", path.display());
            Ok(())
        }
        Command::Compare(args) => {
            let layout = OutputLayout::create(&root)?;
            let mut source = build_source(&args.lookup, &toml_config).await?;
            let path = layout.audit_file("identifier-comparison", "txt");
            let mut out = create_file(&path)?;
            tasks::compare_identifiers(open_records(&args.source)?, &mut source, &mut out).await?;
            info!("Identifier comparison written to {}", path.display());
            Ok(())
        }
        Command::LoadCache { collection } => {
            let xml = std::fs::read_to_string(&collection)
                .with_context(|| format!("Failed to read {}", collection.display()))?;
            let cache = open_cache(&toml_config).await?;
            tasks::load_cache(&xml, &cache).await?;
            info!("Cache now holds {} records", cache.count().await?);
            Ok(())
        }
        Command::Modify {
            source,
            policy,
            binary_output,
        } => {
            let layout = OutputLayout::create(&root)?;
            let mut policy =
                policy_by_name(policy.as_deref().unwrap_or(&toml_config.reconcile.policy))?;
            let mut out = record_sink(&layout.records_file("modified-records", binary_output), binary_output)?;
            let mut online =
                record_sink(&layout.records_file("modified-online-records", binary_output), binary_output)?;
            tasks::modify_records(
                open_records(&source)?,
                policy.as_mut(),
                out.as_mut(),
                Some(online.as_mut()),
            )?;
            for (name, count) in policy.counters() {
                info!("{}: {}", name, count);
            }
            Ok(())
        }
    }
}

async fn reconcile(args: ReconcileArgs, toml_config: &TomlConfig, layout: &OutputLayout) -> Result<()> {
    let strategy: Strategy = args
        .strategy
        .as_deref()
        .unwrap_or(&toml_config.reconcile.strategy)
        .parse()?;
    let rules = SubstitutionRules::new(toml_config.reconcile.tags.as_slice(), strategy)?;
    let policy = policy_by_name(args.policy.as_deref().unwrap_or(&toml_config.reconcile.policy))?;
    let has_policy = policy.name() != "none";

    let options = PipelineOptions {
        require_perfect_match: args.perfect_match,
        title_check: !args.no_title_check,
        min_ratio: args.min_ratio.unwrap_or(toml_config.reconcile.min_ratio),
    };
    let source = build_source(&args.lookup, toml_config).await?;

    // Output sinks are opened before the first record is read
    let binary = args.binary_output;
    let sink = |name: &str| record_sink(&layout.records_file(name, binary), binary);
    let mut router = OutputRouter::new()
        .with_bucket(Outcome::Modified, sink("updated-records")?)
        .with_bucket(Outcome::FuzzyModified, sink("fuzzy-modified-records")?)
        .with_bucket(Outcome::Unmodified, sink("unmodified-records")?)
        .with_missing_fields(sink("missing-title-records")?)
        .with_bad(Box::new(create_file(&layout.records_file("bad-records", true))?));
    if has_policy {
        router = router
            .with_online_bucket(Outcome::Modified, sink("updated-online-records")?)
            .with_online_bucket(Outcome::FuzzyModified, sink("fuzzy-online-records")?)
            .with_online_bucket(Outcome::Unmodified, sink("unmodified-online-records")?);
    }
    if args.perfect_match {
        router = router.with_fuzzy_originals(sink("fuzzy-original-records")?);
    }

    let mut audit = AuditLog::new()
        .with_cancelled(audit_sink(layout, "cancelled-identifiers")?)
        .with_bad_responses(audit_sink(layout, "bad-authority-responses")?);
    if args.track_fields {
        audit = audit.with_fields(audit_sink(layout, "field-substitutions")?);
    }
    if args.track_title_matches {
        audit = audit.with_titles(audit_sink(layout, "title-matches")?);
    }
    if args.save_authority {
        let path = layout.xml_file("authority-records");
        audit = audit.with_authority_xml(Box::new(create_file(&path)?));
    }
    if has_policy {
        audit = audit.with_material_types(audit_sink(layout, "material-type-analysis")?);
    }

    let pipeline = ReconciliationPipeline::new(source, SubstitutionEngine::new(rules), options)
        .with_policy(policy)
        .with_audit(audit)
        .with_router(router);
    let stats = pipeline.run(open_records(&args.source)?).await?;
    stats.log_summary();

    let summary_path = layout.audit_file("run-summary", "json");
    let summary = create_file(&summary_path)?;
    serde_json::to_writer_pretty(summary, &stats).context("Failed to write run summary")?;
    info!("Run summary written to {}", summary_path.display());
    Ok(())
}

async fn build_source(opts: &LookupOptions, toml_config: &TomlConfig) -> Result<ReconciliationSource> {
    let backoff = config::backoff(toml_config);
    if opts.cache {
        let cache = open_cache(toml_config).await?;
        info!("Resolving identifiers from cache only");
        return Ok(ReconciliationSource::cache_only(Box::new(cache)).with_backoff(backoff));
    }

    let api_key = config::resolve_api_key(opts.api_key.as_deref(), toml_config)?;
    let client = WorldCatClient::new(
        toml_config.authority.base_url.as_str(),
        api_key,
        Duration::from_secs(toml_config.authority.timeout_secs),
    )
    .context("Failed to create authority client")?;

    let persist: Option<Box<dyn CacheStore>> = if opts.cache_insert {
        Some(Box::new(open_cache(toml_config).await?))
    } else {
        None
    };
    Ok(ReconciliationSource::live(Box::new(client), persist).with_backoff(backoff))
}

async fn open_cache(toml_config: &TomlConfig) -> Result<SqliteCache> {
    let path = toml_config.cache_database();
    SqliteCache::open(&path)
        .await
        .with_context(|| format!("Failed to open cache database {}", path.display()))
}

fn open_records(path: &Path) -> Result<Iso2709Reader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Iso2709Reader::new(BufReader::new(file)))
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn record_sink(path: &Path, binary: bool) -> Result<Box<dyn RecordSink>> {
    let out = create_file(path)?;
    Ok(if binary {
        Box::new(Iso2709Writer::new(out))
    } else {
        Box::new(TextWriter::new(out))
    })
}

fn audit_sink(layout: &OutputLayout, name: &str) -> Result<Box<dyn Write + Send>> {
    Ok(Box::new(create_file(&layout.audit_file(name, "txt"))?))
}

/// Timestamped output files under one root
struct OutputLayout {
    root: PathBuf,
    stamp: String,
}

impl OutputLayout {
    fn create(root: &Path) -> Result<Self> {
        for dir in ["updated-records", "audit", "xml"] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            stamp: chrono::Local::now().format("%Y-%m-%dT%H-%M-%S").to_string(),
        })
    }

    fn records_file(&self, name: &str, binary: bool) -> PathBuf {
        let ext = if binary { "mrc" } else { "txt" };
        self.root
            .join("updated-records")
            .join(format!("{name}-{}.{ext}", self.stamp))
    }

    fn audit_file(&self, name: &str, ext: &str) -> PathBuf {
        self.root.join("audit").join(format!("{name}-{}.{ext}", self.stamp))
    }

    fn xml_file(&self, name: &str) -> PathBuf {
        self.root.join("xml").join(format!("{name}-{}.xml", self.stamp))
    }
}
