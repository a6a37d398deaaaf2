mod config;

use std::{num::NonZeroU32, path::PathBuf};

use anyhow::Context;
use bangumi::{
    fetch::{BackendKind, SegmentedFetcher},
    merge::FfmpegMuxer,
    util::sanitize_filename,
    AcquisitionPipeline, PipelineOptions,
};
use bangumi_bilibili::BiliClient;
use clap::Parser;
use config::Config;
use fake_user_agent::get_chrome_rua;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;

/// Download every episode of a bilibili bangumi and mux it into mkv.
#[derive(Parser, Debug, Clone)]
#[clap(version, author)]
pub struct BangumiArgs {
    /// Episode, season or media page url
    ///
    /// eg. https://www.bilibili.com/bangumi/play/ep327584
    url: String,

    /// Download directory. Defaults to the season title in the current directory.
    #[clap(short, long)]
    directory: Option<PathBuf>,

    /// Quality code, e.g. 127 (8K), 120 (4K), 116 (1080P60), 112 (1080P+), 80 (1080P), 64 (720P)
    #[clap(short, long)]
    quality: Option<u32>,

    /// Connections per file
    #[clap(short, long)]
    threads: Option<NonZeroU32>,

    /// Delete the audio and video files after merging
    #[clap(short, long)]
    cleanup: bool,

    /// External downloader, aria2 or axel
    #[clap(short = 'D', long)]
    downloader: Option<BackendKind>,

    /// Only download episodes whose title contains this keyword
    #[clap(short, long)]
    keyword: Option<String>,

    /// Cookie of a logged-in account
    #[clap(long, env = "BILI_COOKIE", hide_env_values = true)]
    cookie: Option<String>,

    /// Config file path
    #[clap(long)]
    config: Option<PathBuf>,

    /// Debug output
    #[clap(short, long, alias = "debug")]
    verbose: bool,
}

impl BangumiArgs {
    fn downloader(&self, config: &Config) -> anyhow::Result<BackendKind> {
        match self.downloader {
            Some(kind) => Ok(kind),
            None => config
                .download
                .default_downloader
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e)),
        }
    }

    fn options(&self, config: &Config, season_title: &str, user_agent: &str) -> PipelineOptions {
        let dest_dir = self
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(sanitize_filename(season_title)));

        let mut options = PipelineOptions::new(dest_dir)
            .quality(self.quality.unwrap_or(config.download.default_quality))
            .connections(
                self.threads
                    .map(NonZeroU32::get)
                    .unwrap_or(config.download.default_threads),
            )
            .cleanup_after_merge(self.cleanup || config.download.cleanup_after_merge)
            .keyword(self.keyword.clone())
            .referer(config.network.referer.clone())
            .header("User-Agent", user_agent);
        for (key, value) in config.network.header_pairs() {
            options = options.header(key, value);
        }
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = BangumiArgs::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::resolve(args.config.as_deref())?;

    // external tools are required before anything is requested
    let fetcher = SegmentedFetcher::new(args.downloader(&config)?, config.download.max_retry)?;
    let muxer = FfmpegMuxer::new()?;
    tracing::info!("Using downloader: {}", fetcher.kind());

    let user_agent = config
        .network
        .user_agent
        .clone()
        .unwrap_or_else(|| get_chrome_rua().to_string());
    let mut client = BiliClient::new(&user_agent)?;
    if let Some(cookie) = &args.cookie {
        client = client.with_cookie(cookie);
    }

    let season = client
        .season_from_url(&args.url)
        .await
        .with_context(|| format!("fetch season of {}", args.url))?;
    tracing::info!(
        "Season {} ({}): {} episode(s)",
        season.title,
        season.season_id,
        season.episodes.len()
    );

    let mut options = args.options(&config, &season.title, &user_agent);
    if let Some(cookie) = client.cookie() {
        options = options.header("Cookie", cookie);
    }

    let cancel = CancellationToken::new();
    let cancel_inner = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("Ctrl-C received, stopping after the current step.");
        cancel_inner.cancel();

        // wait for the second ctrl-c to force exit
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received again, force exit.");
            std::process::exit(1);
        }
    });

    let merged = AcquisitionPipeline::new(client, fetcher, muxer, options)
        .with_cancellation(cancel)
        .run(&season.episodes)
        .await?;

    for file in merged {
        println!("{}", file.display());
    }

    Ok(())
}
