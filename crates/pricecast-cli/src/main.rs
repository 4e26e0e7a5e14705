//! 가격 변동 이벤트 파이프라인 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 라벨 생성
//! pricecast labels -i benzin -f 2024-01-01 -t 2024-12-31
//!
//! # 폴드 구성 확인
//! pricecast folds -i benzin -f 2021-01-01 -t 2025-01-31
//!
//! # 전체 상품 학습 후 오늘 알람 결정
//! pricecast train -f 2021-01-01 -t 2025-01-31
//! pricecast predict
//!
//! # 백테스트 리포트
//! pricecast backtest -f 2021-01-01 -t 2025-01-31 -o reports/backtest.md
//! ```

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use pricecast_cli::commands::backtest::{run_backtest, BacktestCliConfig};
use pricecast_cli::commands::folds::run_folds;
use pricecast_cli::commands::labels::{run_labels, LabelsCliConfig};
use pricecast_cli::commands::predict::{run_predict, PredictCliConfig};
use pricecast_cli::commands::train::run_train;
use pricecast_cli::commands::{parse_date, parse_range};
use pricecast_cli::Pipeline;
use pricecast_core::{init_logging, AppConfig, Instrument, LogConfig};

#[derive(Parser)]
#[command(name = "pricecast")]
#[command(about = "가격 변동 이벤트 예측 파이프라인", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 가격 이력에서 이벤트 라벨 생성
    Labels {
        /// 상품 코드 (예: benzin, motorin, lpg)
        #[arg(short, long)]
        instrument: String,

        /// 시작 날짜 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: String,

        /// 종료 날짜 (YYYY-MM-DD)
        #[arg(short, long)]
        to: String,

        /// CSV 출력 경로
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Purged walk-forward 폴드 구성 출력
    Folds {
        /// 상품 코드
        #[arg(short, long)]
        instrument: String,

        /// 시작 날짜 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: String,

        /// 종료 날짜 (YYYY-MM-DD)
        #[arg(short, long)]
        to: String,
    },

    /// walk-forward 백테스트 실행
    Backtest {
        /// 상품 코드 (기본: 설정된 전체 상품)
        #[arg(short, long)]
        instrument: Option<String>,

        /// 시작 날짜 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: String,

        /// 종료 날짜 (YYYY-MM-DD)
        #[arg(short, long)]
        to: String,

        /// 결과 저장 경로 (.md 또는 .json)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// 2단계 모델 학습 및 번들 저장
    Train {
        /// 상품 코드 (기본: 설정된 전체 상품)
        #[arg(short, long)]
        instrument: Option<String>,

        /// 시작 날짜 (YYYY-MM-DD)
        #[arg(short = 'f', long)]
        from: String,

        /// 종료 날짜 (YYYY-MM-DD)
        #[arg(short, long)]
        to: String,
    },

    /// 하루치 예측 및 알람 결정
    Predict {
        /// 상품 코드 (기본: 설정된 전체 상품)
        #[arg(short, long)]
        instrument: Option<String>,

        /// 기준일 (YYYY-MM-DD, 기본: 오늘)
        #[arg(short, long)]
        date: Option<String>,

        /// 캐시를 비우고 최신 모델을 다시 로드
        #[arg(long, default_value = "false")]
        reload: bool,

        /// JSON 출력
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config))?;
    config.validate()?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;
    info!(config = %cli.config, "Configuration loaded");

    let pipeline = Pipeline::from_storage(config)?;

    match cli.command {
        Commands::Labels {
            instrument,
            from,
            to,
            output,
        } => {
            let (start, end) = parse_range(&from, &to)?;
            run_labels(
                &pipeline,
                LabelsCliConfig {
                    instrument: Instrument::new(&instrument),
                    start,
                    end,
                    output_path: output,
                },
            )
            .await?;
        }

        Commands::Folds {
            instrument,
            from,
            to,
        } => {
            let (start, end) = parse_range(&from, &to)?;
            run_folds(&pipeline, &Instrument::new(&instrument), start, end).await?;
        }

        Commands::Backtest {
            instrument,
            from,
            to,
            output,
        } => {
            let (start_date, end_date) = parse_range(&from, &to)?;
            let config = BacktestCliConfig {
                instruments: pipeline.instruments(instrument.as_deref()),
                start_date,
                end_date,
                output_path: output,
            };
            run_backtest(&pipeline, config).await?;
        }

        Commands::Train {
            instrument,
            from,
            to,
        } => {
            let (start, end) = parse_range(&from, &to)?;
            let instruments = pipeline.instruments(instrument.as_deref());
            run_train(&pipeline, &instruments, start, end).await?;
        }

        Commands::Predict {
            instrument,
            date,
            reload,
            json,
        } => {
            let now = Utc::now();
            let run_date = match date {
                Some(d) => parse_date(&d)?,
                None => now.date_naive(),
            };
            let config = PredictCliConfig {
                instruments: pipeline.instruments(instrument.as_deref()),
                run_date,
                force_reload: reload,
                json,
            };
            run_predict(&pipeline, config, now).await?;
        }
    }

    Ok(())
}
