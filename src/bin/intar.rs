// パス: src/bin/intar.rs
// 役割: Binary entrypoint that launches the REPL
// 意図: Layer config file, flags and environment over the default parameters
// 関連ファイル: src/repl/mod.rs, src/params.rs, src/lib.rs
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use intar::{Params, ReplResult, Value};

#[derive(Parser, Debug)]
#[command(name = "intar")]
#[command(version)]
#[command(about = "Interactive evaluation loop with metacommands and nested sessions")]
struct Cli {
    /// プロンプトテンプレート
    #[arg(long)]
    prompt: Option<String>,

    /// 履歴ファイル（ホームディレクトリ基準）
    #[arg(long)]
    histfile: Option<String>,

    /// 保存する履歴の最大件数
    #[arg(long)]
    histmax: Option<i64>,

    /// 色付けを無効にする
    #[arg(long)]
    no_color: bool,

    /// 結果表示の最大行数（0 は無制限）
    #[arg(long)]
    show: Option<i64>,

    /// JSON 設定ファイル
    #[arg(long, env = "INTAR_CONFIG")]
    config: Option<PathBuf>,

    /// ログのフィルタ（例: debug, intar=trace）
    #[arg(long, env = "INTAR_LOG", default_value = "warn")]
    log_level: String,
}

fn build_params(cli: &Cli) -> ReplResult<Params> {
    let mut params = Params::default();
    if let Some(path) = &cli.config {
        params.merge_file(path)?;
    }
    if let Some(prompt) = &cli.prompt {
        params.set("prompt", Value::str(prompt.as_str()));
    }
    if let Some(histfile) = &cli.histfile {
        params.set("histfile", Value::str(histfile.as_str()));
    }
    if let Some(histmax) = cli.histmax {
        params.set("histmax", Value::Int(histmax));
    }
    if cli.no_color {
        params.set("color", Value::Bool(false));
    }
    if let Some(show) = cli.show {
        params.set("show", Value::Int(show));
    }
    if params.histfile().is_none() {
        if let Ok(histfile) = std::env::var("INTAR_HISTFILE") {
            params.set("histfile", Value::Str(histfile));
        }
    }
    Ok(params)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let params = match build_params(&cli) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };
    match intar::repl::run_repl(params) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("REPL 実行中にエラーが発生しました: {}", e);
            ExitCode::FAILURE
        }
    }
}
