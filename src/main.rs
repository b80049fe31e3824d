use allergen_scout::analyzer::{EnrichmentCache, RetryPolicy};
use allergen_scout::cli::{Cli, Commands};
use allergen_scout::config::Config;
use allergen_scout::matcher::{AllergenMatcher, BatchRequest, DishRequest, MatchRequest, MatcherSettings};
use allergen_scout::pipeline::{EnrichmentPipeline, PipelineOptions, RecordOutcome};
use allergen_scout::store::{ingest_path, MemoryStore};
use allergen_scout::picker;
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_store(path: &Path) -> Result<Arc<MemoryStore>> {
    let store = MemoryStore::open(path)
        .with_context(|| format!("コーパスを開けません: {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load().context("設定の読み込みに失敗しました")?;
    let tables = Arc::new(config.load_tables().context("食材マッピングの読み込みに失敗しました")?);
    let settings = MatcherSettings::from_config(&config);

    match cli.command {
        Commands::Search { dish, allergens } => {
            let store = open_store(&cli.corpus)?;
            let matcher = AllergenMatcher::new(store, tables, settings);
            print_json(&matcher.search(&dish, &allergens).await?)?;
        }

        Commands::Detect { dish, allergens } => {
            let store = open_store(&cli.corpus)?;
            let matcher = AllergenMatcher::new(store, tables, settings);
            print_json(&matcher.detect(&dish, &allergens).await?)?;
        }

        Commands::Check { dish, allergens, ingredients, offline } => {
            let allergens = if allergens.is_empty() {
                picker::pick_allergens(&tables)?
            } else {
                allergens
            };
            if allergens.is_empty() {
                println!("アレルゲンが選択されていません");
                return Ok(());
            }

            let store = open_store(&cli.corpus)?;
            let mut matcher = AllergenMatcher::new(store, Arc::clone(&tables), settings);
            if !offline {
                let cache_path = config.cache_file()?;
                matcher = matcher.with_cache(EnrichmentCache::load(&cache_path), Some(cache_path));
                match cli.ai_provider.build(&config) {
                    Ok(provider) => matcher = matcher.with_provider(provider),
                    Err(e) => tracing::warn!(error = %e, "解析プロバイダなしで実行します"),
                }
            }

            let request = MatchRequest {
                dish,
                main_ingredients: ingredients,
                user_allergens: allergens,
            };
            print_json(&matcher.match_dish(&request).await?)?;
        }

        Commands::Analyze { dish, allergens, ingredients, normalized } => {
            let store = open_store(&cli.corpus)?;
            let matcher = AllergenMatcher::new(store, tables, settings);
            let request = DishRequest {
                dish_name: dish,
                main_ingredients: ingredients,
                normalized_ingredients: normalized,
            };
            print_json(&matcher.ingredient_analysis(&request, &allergens).await?)?;
        }

        Commands::Batch { input, output } => {
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("メニューファイルを読めません: {}", input.display()))?;
            let request: BatchRequest = serde_json::from_str(&content)
                .with_context(|| format!("メニューファイルが不正です: {}", input.display()))?;

            let store = open_store(&cli.corpus)?;
            let matcher = AllergenMatcher::new(store, tables, settings);
            let report = matcher
                .batch_ingredient_analysis(&request.dishes, &request.user_allergens)
                .await;

            let failed = report.results.iter().filter(|r| r.is_failed()).count();
            tracing::info!(
                dishes = report.results.len(),
                failed,
                seconds = report.processing_time,
                "一括解析完了"
            );

            match output {
                Some(path) => {
                    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
                    println!("✔ 結果を保存: {}", path.display());
                }
                None => print_json(&report)?,
            }
        }

        Commands::Enrich { trial, sample, page_size, workers } => {
            let store = open_store(&cli.corpus)?;
            let provider = cli
                .ai_provider
                .build(&config)
                .context("解析プロバイダを準備できません")?;
            let options = PipelineOptions {
                page_size: page_size.unwrap_or(config.page_size),
                max_workers: workers.unwrap_or(config.max_workers),
                retry: config.retry_policy(),
            };
            let pipeline = EnrichmentPipeline::new(store.clone(), provider, options);

            if trial {
                println!("🧪 トライアル（書き込みなし、{}件）\n", sample);
                for (record, outcome) in pipeline.trial(sample).await? {
                    println!("■ {} ({})", record.title, record.id);
                    match outcome {
                        RecordOutcome::Enriched(analysis) => print_json(&analysis)?,
                        RecordOutcome::Errored(reason) => println!("  終端エラー: {}", reason),
                        RecordOutcome::Failed(reason) => println!("  失敗: {}", reason),
                    }
                    println!();
                }
                return Ok(());
            }

            let (total, complete, _) = store.progress().await;
            let pending = (total - complete) as u64;
            println!("🍽  エンリッチ開始: 未処理 {}件 / 全 {}件\n", pending, total);

            let bar = ProgressBar::new(pending);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            let summary = pipeline
                .run_with_progress(|report| {
                    bar.inc(report.fetched as u64);
                    bar.set_message(format!("batch {} (失敗 {})", report.batch, report.failed));
                })
                .await?;
            bar.finish_and_clear();

            store.save().await?;

            println!("✔ バッチ数: {}", summary.batches);
            println!("  処理: {}件 (成功 {} / エラー {} / 失敗 {})",
                summary.processed, summary.enriched, summary.errored, summary.failed);
            if summary.failed > 0 {
                println!("⚠ {}件は未処理のままです。再実行で残りを処理します", summary.failed);
            }
            println!("\n✅ 完了");
        }

        Commands::Ingest { source } => {
            println!("📥 取り込み中: {}", source.display());
            let records = ingest_path(&source)?;
            let store = MemoryStore::open_or_create(&cli.corpus)?;
            let (inserted, replaced) = store.insert_many(records).await;
            store.save().await?;
            println!("✔ 追加 {}件 / 置換 {}件 → {}", inserted, replaced, cli.corpus.display());
        }

        Commands::Cache { clear, info } => {
            let cache_path = config.cache_file()?;

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                if cache_path.exists() {
                    let cache = EnrichmentCache::load(&cache_path);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  件数: {}", cache.len());
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match EnrichmentCache::remove_file(&cache_path) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                let RetryPolicy { max_attempts, base_delay, timeout } = config.retry_policy();
                println!("設定:");
                println!("  モデル: {}", config.model);
                println!("  閾値: タイトル {} / 食材 {} / キャッシュ {}",
                    config.title_threshold, config.ingredient_threshold, config.cache_threshold);
                println!("  あいまい範囲: {} < p < {}", config.ambiguous_low, config.ambiguous_high);
                println!("  バッチ: {}件 / 同時 {}", config.page_size, config.max_workers);
                println!("  リトライ: {}回 / 初回待ち {:?} / タイムアウト {:?}", max_attempts, base_delay, timeout);
                println!("  APIキー: {}", if config.api_key.is_some() { "設定済み" } else { "未設定" });
            }
        }
    }

    Ok(())
}
