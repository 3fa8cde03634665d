use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use participant_directory::avatar::{AvatarCache, ObjectUrlRegistry, RenderContext};
use participant_directory::config;
use participant_directory::search::SearchEngine;
use participant_directory::storage::{load_dump, MemoryStore};

/// Search a participant document dump / 搜索参与者文档
#[derive(Debug, Parser)]
#[command(name = "participant-directory", version)]
struct Cli {
    /// Config file (created with defaults if missing) / 配置文件
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Document dump, overrides store.data_file / 文档文件
    #[arg(long)]
    data: Option<PathBuf>,

    /// Do not allocate avatar handles / 不生成头像句柄
    #[arg(long)]
    headless: bool,

    /// Comma-separated search terms; empty lists everyone / 逗号分隔的搜索词
    query: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = std::env::var("RUST_LOG").ok();

    // Initialize logging before configuration / 先初始化日志再加载配置
    let startup_filter = config::LoggingConfig::default().effective_filter(env_filter.as_deref());
    let (filter_layer, filter_handle) = reload::Layer::new(EnvFilter::new(startup_filter));
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration / 加载配置
    config::init_config(&cli.config)
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration")?;
    let app_config = config::config();

    let filter = app_config.logging.effective_filter(env_filter.as_deref());
    if let Err(e) = filter_handle.reload(EnvFilter::new(&filter)) {
        tracing::warn!("Failed to apply log filter {:?}: {}", filter, e);
    }

    let data_file = cli.data.unwrap_or_else(|| app_config.get_data_file());
    let store = Arc::new(MemoryStore::new());
    load_dump(&store, &data_file, app_config.dump_options())
        .await
        .with_context(|| format!("Failed to load participants from {:?}", data_file))?;

    let registry = Arc::new(ObjectUrlRegistry::new());
    let cache = Arc::new(
        AvatarCache::new(registry.clone())
            .with_image_field(&app_config.search.image_field, &app_config.search.image_text_key),
    );
    let engine = SearchEngine::new(store, cache).with_token_field(&app_config.search.token_field);

    let context = RenderContext::from_client_flag(!cli.headless);
    let query = cli.query.unwrap_or_default();
    let participants = engine.search(&query, context).await;

    println!("{}", serde_json::to_string_pretty(&participants)?);
    tracing::info!(
        "{} participants matched, {} avatar handles live",
        participants.len(),
        registry.live_count()
    );

    engine.cache().release_all();
    Ok(())
}
