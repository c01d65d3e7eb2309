use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dialoguer::Confirm;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tweetvault_archive::media::format_bytes;
use tweetvault_archive::{
    ArchiveInput, AutoApprove, Consent, EnrichmentDriver, HttpMediaSource, MediaPlanner,
    MediaUpgrader, OutcomeStore, RecordCache, RemoteFetcher,
};
use tweetvault_common::{Config, RetentionPolicy};
use twitter_lookup::TwitterClient;

#[derive(Parser)]
#[command(name = "tweetvault")]
#[command(about = "Reconcile a Twitter archive export with the API and upgrade its media")]
#[command(version)]
struct Cli {
    /// Archive export root (the folder containing `data/`)
    #[arg(long, default_value = ".")]
    archive: PathBuf,

    /// Where caches and upgraded media are written
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Answer yes to every prompt
    #[arg(short, long)]
    yes: bool,

    /// Skip the API enrichment rounds
    #[arg(long)]
    skip_enrichment: bool,

    /// Skip the media upgrade
    #[arg(long)]
    skip_media: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Interactive yes/no on the terminal. A failed prompt counts as "no".
struct PromptConsent;

impl Consent for PromptConsent {
    fn confirm(&self, prompt: &str) -> bool {
        Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()
            .unwrap_or(false)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("tweetvault={level}").parse()?)
                .add_directive(format!("twitter_lookup={level}").parse()?),
        )
        .init();

    info!("tweetvault starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let consent: Box<dyn Consent> = if cli.yes {
        Box::new(AutoApprove)
    } else {
        Box::new(PromptConsent)
    };

    let input = ArchiveInput::discover(&cli.archive)?;
    let cache_dir = cli.output.join("cache");
    let record_cache = RecordCache::new(cache_dir.join("tweets.json"), config.retention);
    let user_cache = RecordCache::new(cache_dir.join("users.json"), RetentionPolicy::KeepAll);

    let mut store = record_cache.load(config.merge.clone());
    input.load_into(&mut store)?;
    record_cache.save(&store)?;

    if cli.skip_enrichment {
        info!("Skipping enrichment");
    } else {
        let client = TwitterClient::with_options(
            config.fetch.bearer_token.clone(),
            &config.fetch.api_base_url,
            config.fetch.request_timeout,
        )?;
        let fetcher = RemoteFetcher::new(client, config.fetch.clone());
        let driver = EnrichmentDriver::new(&fetcher, consent.as_ref(), config.max_enrichment_rounds)
            .with_cache(&record_cache);

        let summary = driver.run(&mut store).await?;
        info!(
            rounds = summary.rounds.len(),
            fetched = summary.fetched(),
            conflicts = summary.conflicts(),
            stop = ?summary.stop,
            "Enrichment finished"
        );

        let mut users = user_cache.load(config.merge.clone());
        if let Some(report) = driver.run_users(&store, &mut users).await {
            if !report.is_complete() {
                warn!(remaining = report.remaining.len(), "Some accounts were not looked up");
            }
            user_cache.save(&users)?;
        }
    }
    record_cache.save(&store)?;

    if cli.skip_media {
        info!("Skipping media upgrade");
        return Ok(());
    }

    let media_dir = cli.output.join("media");
    let plan = MediaPlanner::new(&input.media_dir, &media_dir, &config.media).plan(&store)?;
    if plan.candidates.is_empty() {
        info!("No media to check");
        return Ok(());
    }

    let prompt = format!(
        "Check {} media files for better-quality originals?",
        plan.candidates.len()
    );
    if !consent.confirm(&prompt) {
        info!("Media upgrade declined");
        return Ok(());
    }

    let upgrader = MediaUpgrader::new(HttpMediaSource::new(&config.media)?, config.media.clone());
    let mut outcomes = OutcomeStore::load(cache_dir.join("media_state.json"));
    let summary = upgrader.run(&plan.candidates, &mut outcomes).await?;
    outcomes.save()?;

    info!(
        checked = summary.total,
        best_quality = summary.verified(),
        upgraded = summary.upgraded(),
        inconclusive = summary.inconclusive(),
        still_failing = summary.failed.len(),
        downloaded = %format_bytes(summary.downloaded),
        "Done"
    );
    Ok(())
}
