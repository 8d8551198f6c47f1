//! Media Catalog CLI
//!
//! Scan a media root, import metadata and build the thumbnail cache.

use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use media_catalog::{
    CatalogError, ImportSummary, LibraryConfig, MediaLibrary, ScanResult, ThumbnailSummary,
};

const ABOUT: &str = r#"
Media Catalog - 媒体库编目工具

使用示例:
  media_catalog scan -r /path/to/media              扫描新增媒体文件
  media_catalog import -r /path/to/media            后台导入元数据并等待完成
  media_catalog thumbs -r /path/to/media -t 4       生成缩略图缓存
  media_catalog run -r /path/to/media --json        依次执行全部三个阶段
  media_catalog scan -r /media -d catalog.db        指定数据库文件
"#;

/// Media catalog pipeline
#[derive(Parser)]
#[command(name = "media_catalog")]
#[command(author, version, about = ABOUT, long_about = None)]
#[command(help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 显示帮助信息
    #[arg(short = 'h', long = "help", action = clap::ArgAction::Help, global = true)]
    help: Option<bool>,
}

/// Flags shared by every stage
#[derive(Args)]
struct LibraryArgs {
    /// 媒体库根目录
    #[arg(short = 'r', long, help = "媒体库根目录")]
    root: PathBuf,

    /// 数据库文件路径
    #[arg(short = 'd', long, help = "SQLite数据库文件路径，默认 <root>/catalog.db")]
    db: Option<PathBuf>,

    /// 缩略图缓存目录
    #[arg(long, help = "缩略图缓存目录，相对路径基于根目录")]
    cache_dir: Option<PathBuf>,

    /// ffmpeg 可执行文件
    #[arg(long, default_value = "ffmpeg", help = "ffmpeg 可执行文件路径")]
    ffmpeg: String,

    /// ffprobe 可执行文件
    #[arg(long, default_value = "ffprobe", help = "ffprobe 可执行文件路径")]
    ffprobe: String,

    /// 同时编目文本文件
    #[arg(long, help = "同时编目文本文件")]
    include_text: bool,

    /// 并行线程数（0 = 自动检测）
    #[arg(short = 't', long, default_value = "0", help = "并行线程数，0表示自动检测")]
    threads: usize,

    /// 以 JSON 格式输出结果
    #[arg(long, help = "输出JSON格式的结果")]
    json: bool,
}

impl LibraryArgs {
    fn config(&self) -> LibraryConfig {
        let mut builder = LibraryConfig::builder()
            .root(self.root.clone())
            .catalog_text(self.include_text)
            .num_threads(self.threads)
            .ffmpeg_path(self.ffmpeg.clone())
            .ffprobe_path(self.ffprobe.clone());
        if let Some(db) = &self.db {
            builder = builder.db_path(db.clone());
        }
        if let Some(cache_dir) = &self.cache_dir {
            builder = builder.cache_dir(cache_dir.clone());
        }
        builder.build()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 扫描目录中的新媒体文件
    #[command(about = "扫描目录中的新媒体文件")]
    Scan(LibraryArgs),

    /// 导入待处理文件的元数据
    #[command(about = "导入待处理文件的元数据")]
    Import(LibraryArgs),

    /// 生成缩略图缓存
    #[command(about = "生成缩略图缓存")]
    Thumbs(LibraryArgs),

    /// 依次执行扫描、导入和缩略图生成
    #[command(about = "依次执行扫描、导入和缩略图生成")]
    Run(LibraryArgs),
}

#[derive(Serialize)]
struct RunReport {
    scan: ScanResult,
    import: ImportSummary,
    thumbnails: ThumbnailSummary,
}

fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        // 没有子命令时显示帮助
        println!("{}", ABOUT);
        println!("使用 'media_catalog scan -h' 查看扫描命令的详细帮助");
        println!("使用 'media_catalog --help' 查看完整帮助信息");
        return ExitCode::SUCCESS;
    };

    match execute(command) {
        Ok(status) => {
            println!("{}", status);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run a command and return the final status line
fn execute(command: Commands) -> Result<String, CatalogError> {
    match command {
        Commands::Scan(args) => {
            let library = open(&args)?;
            let result = library.scan()?;
            if args.json {
                print_json(&result)?;
            } else {
                print_scan(&result);
            }
            Ok(library.status())
        }
        Commands::Import(args) => {
            let library = open(&args)?;
            let ticket = library.spawn_import()?;
            let summary = ticket.wait()?;
            if args.json {
                print_json(&summary)?;
            } else {
                print_import(&summary);
            }
            Ok(library.status())
        }
        Commands::Thumbs(args) => {
            let library = open(&args)?;
            let summary = library.generate_thumbnails()?;
            if args.json {
                print_json(&summary)?;
            } else {
                print_thumbnails(&summary);
            }
            Ok(library.status())
        }
        Commands::Run(args) => {
            let library = open(&args)?;
            let report = RunReport {
                scan: library.scan()?,
                import: library.import()?,
                thumbnails: library.generate_thumbnails()?,
            };
            if args.json {
                print_json(&report)?;
            } else {
                print_scan(&report.scan);
                print_import(&report.import);
                print_thumbnails(&report.thumbnails);
            }
            Ok(library.status())
        }
    }
}

fn open(args: &LibraryArgs) -> Result<MediaLibrary, CatalogError> {
    let config = args.config();
    info!("Root: {}", config.root.display());
    info!("Database: {}", config.database_path().display());
    info!(
        "Threads: {}",
        if config.num_threads == 0 {
            "auto".to_string()
        } else {
            config.num_threads.to_string()
        }
    );
    MediaLibrary::open(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CatalogError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_scan(result: &ScanResult) {
    println!("Scan completed:");
    println!("  Total files: {}", result.total_files);
    println!("  New files: {}", result.new_files());
    println!("  Known files: {}", result.known_files);
    println!("  Skipped files: {}", result.skipped_files);
    println!("  Errors: {}", result.error_count());
    println!("  Duration: {}ms", result.duration_ms);
}

fn print_import(summary: &ImportSummary) {
    println!("Import completed:");
    println!("  Images: {}", summary.images);
    println!("  Videos: {}", summary.videos);
    println!("  Complete: {}", summary.complete);
    println!("  Partial: {}", summary.partial);
    println!("  Failed: {}", summary.failed);
    println!("  Unsaved: {}", summary.unsaved);
    println!("  Duration: {}ms", summary.duration_ms);
}

fn print_thumbnails(summary: &ThumbnailSummary) {
    println!("Thumbnails completed:");
    println!("  Entries: {}", summary.total);
    println!("  Generated: {}", summary.generated);
    println!("  Cached: {}", summary.skipped);
    println!("  Failed: {}", summary.failed);
    println!("  Duration: {}ms", summary.duration_ms);
}
