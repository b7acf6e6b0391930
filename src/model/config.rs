//! アプリケーション設定管理モジュール
//!
//! データセット、学習、計算デバイスなどの設定をJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::csv_loader::LoadOptions;
use crate::imaging::MapProjection;
use crate::types::Schema;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

/// 損失関数の種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LossKind {
    /// 平均二乗誤差
    #[serde(rename = "mse")]
    #[default]
    MeanSquaredError,
    /// 平均絶対誤差
    #[serde(rename = "mean_absolute_error")]
    MeanAbsoluteError,
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LossKind::MeanSquaredError => write!(f, "mse"),
            LossKind::MeanAbsoluteError => write!(f, "mean_absolute_error"),
        }
    }
}

impl std::str::FromStr for LossKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mse" | "mean_squared_error" => Ok(LossKind::MeanSquaredError),
            "mae" | "mean_absolute_error" => Ok(LossKind::MeanAbsoluteError),
            other => Err(format!("unknown loss: {}", other)),
        }
    }
}

/// データセット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// 学習データファイルのパス
    pub path: String,
    /// 区切り文字（1バイト）
    pub delimiter: String,
    /// コメント行の先頭文字（空文字でコメント無し）
    pub comment_prefix: String,
    /// 欠損値を表すトークン
    pub missing_sentinel: String,
    /// 学習用データの割合
    pub train_fraction: f64,
    /// 分割用のランダムシード
    pub seed: u64,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            path: "training_data.csv".to_string(),
            delimiter: " ".to_string(),
            comment_prefix: "\t".to_string(),
            missing_sentinel: "?".to_string(),
            train_fraction: 0.8,
            seed: 0,
        }
    }
}

impl DatasetSettings {
    /// 読み込み設定に変換
    pub fn load_options(&self) -> anyhow::Result<LoadOptions> {
        let delimiter = single_byte(&self.delimiter)
            .ok_or_else(|| anyhow::anyhow!("delimiter must be a single byte: {:?}", self.delimiter))?;
        let comment_prefix = if self.comment_prefix.is_empty() {
            None
        } else {
            Some(single_byte(&self.comment_prefix).ok_or_else(|| {
                anyhow::anyhow!("comment prefix must be a single byte: {:?}", self.comment_prefix)
            })?)
        };

        Ok(LoadOptions {
            schema: Schema::default(),
            missing_sentinel: self.missing_sentinel.clone(),
            comment_prefix,
            delimiter,
            drop_missing: true,
            train_fraction: self.train_fraction,
            seed: self.seed,
        })
    }
}

fn single_byte(s: &str) -> Option<u8> {
    match s.as_bytes() {
        [b] => Some(*b),
        _ => None,
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// 学習済みモデルの保存先（拡張子 .tar.gz が付与される）
    pub output_path: String,
    /// 中間層のユニット数
    pub hidden_units: usize,
    /// 学習後にモデルを保存するか
    pub persist: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            output_path: "../prediction_model".to_string(),
            hidden_units: 70,
            persist: true,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// 学習率
    pub learning_rate: f64,
    /// 学習データのうち検証に回す割合（末尾から）
    pub validation_split: f64,
    /// 損失関数
    pub loss: LossKind,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 100,
            batch_size: 32,
            learning_rate: 1e-3,
            validation_split: 0.2,
            loss: LossKind::MeanSquaredError,
        }
    }
}

/// 地図画像の設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    /// 元の地図画像
    pub map_path: String,
    /// シャープ化の係数
    pub sharpen_factor: f32,
    /// 地図画像と世界地図の対応
    #[serde(default)]
    pub projection: MapProjection,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            map_path: "rawmap.png".to_string(),
            sharpen_factor: 2.0,
            projection: MapProjection::default(),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    pub device_type: DeviceType,
    /// データセット設定
    #[serde(default)]
    pub dataset: DatasetSettings,
    /// モデル設定
    #[serde(default)]
    pub model: ModelSettings,
    /// トレーニング設定
    #[serde(default)]
    pub training: TrainingSettings,
    /// 地図画像設定
    #[serde(default)]
    pub image: ImageSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パスから設定を読み込む、失敗した場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => {
                    log::info!("設定ファイルを読み込みました: {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!(
                        "設定ファイルの読み込みに失敗しました ({}): {}",
                        path.display(),
                        e
                    );
                    log::warn!("デフォルト設定を使用します");
                    Self::default()
                }
            }
        } else {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            Self::default()
        }
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報を表示
    pub fn display(&self) {
        println!("=== アプリケーション設定 ===");
        println!("計算デバイス: {}", self.device_type);
        println!("\n--- データセット設定 ---");
        println!("データファイル: {}", self.dataset.path);
        println!("区切り文字: {:?}", self.dataset.delimiter);
        println!("コメント行: {:?}", self.dataset.comment_prefix);
        println!("欠損値: {:?}", self.dataset.missing_sentinel);
        println!("学習データ割合: {}", self.dataset.train_fraction);
        println!("シード: {}", self.dataset.seed);
        println!("\n--- モデル設定 ---");
        println!("保存先: {}", self.model.output_path);
        println!("中間層ユニット数: {}", self.model.hidden_units);
        println!("保存: {}", if self.model.persist { "する" } else { "しない" });
        println!("\n--- トレーニング設定 ---");
        println!("エポック数: {}", self.training.num_epochs);
        println!("バッチサイズ: {}", self.training.batch_size);
        println!("学習率: {}", self.training.learning_rate);
        println!("検証データ割合: {}", self.training.validation_split);
        println!("損失関数: {}", self.training.loss);
        println!("\n--- 地図画像設定 ---");
        println!("地図画像: {}", self.image.map_path);
        println!("シャープ化係数: {}", self.image.sharpen_factor);
        println!(
            "投影: タイル {} px, オフセット ({}, {}), 倍率 {}",
            self.image.projection.tile_size,
            self.image.projection.offset_x,
            self.image.projection.offset_y,
            self.image.projection.scale
        );
        println!("========================\n");
    }
}
