//! Project Smokey - Wildfire Prediction
//!
//! 学習データの前処理、モデル学習、予測、地図画像のシャープ化を行うCLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use smokey_lib::imaging;
use smokey_lib::model::{AppConfig, DeviceType, LossKind};

#[derive(Parser)]
#[command(name = "smokey")]
#[command(about = "Project Smokey - Wildfire Prediction", long_about = None)]
struct Cli {
    /// 設定ファイル（省略時は config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 学習データを読み込み、分割結果を表示
    Prepare {
        /// 学習データファイル
        #[arg(long)]
        data: Option<String>,
        /// 分割用のランダムシード
        #[arg(long)]
        seed: Option<u64>,
    },
    /// モデルを学習して保存
    Train {
        /// 学習データファイル
        #[arg(long)]
        data: Option<String>,
        /// エポック数
        #[arg(long)]
        epochs: Option<usize>,
        /// 損失関数 (mse | mean_absolute_error)
        #[arg(long)]
        loss: Option<LossKind>,
        /// 計算デバイス (cpu | wgpu)
        #[arg(long)]
        device: Option<String>,
        /// 保存先
        #[arg(long)]
        output: Option<String>,
        /// モデルを保存しない
        #[arg(long)]
        no_save: bool,
    },
    /// 保存済みモデルで予測
    Predict {
        /// モデルファイル (.tar.gz)
        #[arg(long)]
        model: PathBuf,
        /// 特徴量ファイル（ラベル列無し、26列）
        #[arg(long)]
        input: PathBuf,
    },
    /// 保存済みモデルのメタデータを表示
    Inspect {
        /// モデルファイル (.tar.gz)
        #[arg(long)]
        model: PathBuf,
    },
    /// 地図画像をシャープ化して保存
    Sharpen {
        /// 元の地図画像（省略時は設定値）
        #[arg(long)]
        input: Option<PathBuf>,
        /// 出力先
        #[arg(long, default_value = "sharpened_map.png")]
        output: PathBuf,
        /// シャープ化の係数
        #[arg(long)]
        factor: Option<f32>,
    },
    /// 地図画像のピクセル位置を経度・緯度に変換
    Locate {
        /// 横方向のピクセル位置
        #[arg(long, allow_negative_numbers = true)]
        x: f64,
        /// 縦方向のピクセル位置
        #[arg(long, allow_negative_numbers = true)]
        y: f64,
    },
    /// 現在の設定を表示
    Config {
        /// デフォルト設定をファイルに書き出す
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

/// エントリポイント（1回だけ実行）
fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_default_from(&config_path);

    match cli.command {
        Commands::Prepare { data, seed } => {
            if let Some(data) = data {
                config.dataset.path = data;
            }
            if let Some(seed) = seed {
                config.dataset.seed = seed;
            }
            let prepared = smokey_lib::prepare_dataset(&config)?;
            smokey_lib::print_dataset_summary(&prepared);
        }
        Commands::Train {
            data,
            epochs,
            loss,
            device,
            output,
            no_save,
        } => {
            if let Some(data) = data {
                config.dataset.path = data;
            }
            if let Some(epochs) = epochs {
                config.training.num_epochs = epochs;
            }
            if let Some(loss) = loss {
                config.training.loss = loss;
            }
            if let Some(device) = device {
                config.device_type = parse_device(&device)?;
            }
            if let Some(output) = output {
                config.model.output_path = output;
            }
            if no_save {
                config.model.persist = false;
            }
            train(&config)?;
        }
        Commands::Predict { model, input } => predict(&config, &model, &input)?,
        Commands::Inspect { model } => {
            let metadata = smokey_lib::model::load_metadata(&model)?;
            smokey_lib::model::print_metadata_info(&metadata);
        }
        Commands::Sharpen {
            input,
            output,
            factor,
        } => {
            let input = input.unwrap_or_else(|| PathBuf::from(&config.image.map_path));
            let factor = factor.unwrap_or(config.image.sharpen_factor);
            let (width, height) = imaging::sharpen_file(&input, &output, factor)?;
            let bounds = config.image.projection.bounds(width, height);
            println!("シャープ化した画像を保存しました: {}", output.display());
            println!(
                "範囲: 経度 {:.4} ～ {:.4}, 緯度 {:.4} ～ {:.4}",
                bounds.west, bounds.east, bounds.south, bounds.north
            );
        }
        Commands::Locate { x, y } => {
            let projection = &config.image.projection;
            let (mx, my) = projection.pixels_to_meters(x, y);
            let (lon, lat) = imaging::meters_to_lon_lat(mx, my);
            println!("MERC: ({:.2}, {:.2})", mx, my);
            println!("LON/LAT: ({:.6}, {:.6})", lon, lat);
        }
        Commands::Config { init } => {
            if init {
                config.save(&config_path)?;
                println!("設定ファイルを保存しました: {}", config_path.display());
            }
            config.display();
        }
    }

    Ok(())
}

fn parse_device(value: &str) -> Result<DeviceType> {
    match value.to_lowercase().as_str() {
        "cpu" | "ndarray" => Ok(DeviceType::Cpu),
        "wgpu" | "gpu" => Ok(DeviceType::Wgpu),
        other => anyhow::bail!("unknown device: {}", other),
    }
}

#[cfg(feature = "ml")]
fn train(config: &AppConfig) -> Result<()> {
    let prepared = smokey_lib::prepare_dataset(config)?;
    smokey_lib::print_dataset_summary(&prepared);

    let report = smokey_lib::ml::train_and_save(&prepared, config)?;

    println!("\n=== 学習結果 ===");
    println!("学習: {} 行 / 検証: {} 行", report.train_rows, report.validation_rows);
    match report.test_metrics {
        Some(m) => println!("テスト ({} 行): mse={:.4}, mae={:.4}", m.rows, m.mse, m.mae),
        None => println!("テストデータなし"),
    }
    match report.saved_path {
        Some(path) => println!("保存先: {}", path.display()),
        None => println!("モデルは保存されていません"),
    }
    println!("================");
    Ok(())
}

#[cfg(feature = "ml")]
fn predict(config: &AppConfig, model: &std::path::Path, input: &std::path::Path) -> Result<()> {
    let predictor = smokey_lib::ml::Predictor::load(model)?;
    let options = config.dataset.load_options()?;
    let table = smokey_lib::load_feature_table(input, &options)?;

    let predictions = predictor.predict_table(&table)?;
    for (row, score) in table.rows.iter().zip(&predictions) {
        // Bin X, Bin Y, 予測値
        println!("{} {} {:.4}", row[0], row[1], score);
    }
    Ok(())
}

#[cfg(not(feature = "ml"))]
fn train(_config: &AppConfig) -> Result<()> {
    anyhow::bail!("this build does not include the `ml` feature")
}

#[cfg(not(feature = "ml"))]
fn predict(_config: &AppConfig, _model: &std::path::Path, _input: &std::path::Path) -> Result<()> {
    anyhow::bail!("this build does not include the `ml` feature")
}
