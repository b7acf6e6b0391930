#![recursion_limit = "256"]

mod types;
mod csv_loader;

// 学習データ・モデル・地図画像のモジュール
pub mod model;
pub mod imaging;
#[cfg(feature = "ml")]
pub mod ml;

pub use csv_loader::{load_dataset, load_feature_table, partition, LoadOptions, PrepareError};
pub use types::{FeatureTable, PreparedDataset, Schema, COLUMN_NAMES, LABEL_COLUMN};

use model::AppConfig;
use std::path::Path;

/// 設定に従って学習データを読み込み、分割する
pub fn prepare_dataset(config: &AppConfig) -> anyhow::Result<PreparedDataset> {
    let options = config.dataset.load_options()?;
    let data = load_dataset(Path::new(&config.dataset.path), &options)?;
    Ok(data)
}

/// 分割結果の概要を表示
pub fn print_dataset_summary(data: &PreparedDataset) {
    println!("\n=== データセット ===");
    println!("有効行数: {}", data.total_rows());
    println!("学習データ: {} 行", data.train_features.len());
    println!("テストデータ: {} 行", data.test_features.len());
    println!("特徴量列: {} 列", data.train_features.num_columns());

    let positives = data.train_labels.iter().filter(|l| **l > 0.5).count();
    println!("学習データの山火事あり: {} / {}", positives, data.train_labels.len());
    println!("====================");
}
