//! モデルメタデータの定義と永続化
//!
//! tar.gz形式でモデルと関連するメタデータを保存・読み込みします。
//! 予測側（Rust）はこのメタデータから入力列の順序と正規化層の統計量を復元します。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::config::LossKind;

/// 入力（正規化）層の名前
pub const INPUT_LAYER_NAME: &str = "model_in";

/// 出力層の名前
pub const OUTPUT_LAYER_NAME: &str = "model_out";

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// 特徴量列（入力の順序）
    pub feature_columns: Vec<String>,

    /// 予測対象の列
    pub label_column: String,

    /// 入力層の名前
    #[serde(default = "default_input_layer")]
    pub input_layer: String,

    /// 出力層の名前
    #[serde(default = "default_output_layer")]
    pub output_layer: String,

    /// 中間層のユニット数
    pub hidden_units: usize,

    /// 正規化層の平均（特徴量列ごと）
    pub feature_mean: Vec<f32>,

    /// 正規化層の分散（特徴量列ごと）
    pub feature_variance: Vec<f32>,

    /// 損失関数
    pub loss: LossKind,

    /// 学習率
    pub learning_rate: f64,

    /// 学習エポック数
    pub num_epochs: u32,

    /// 学習に使用した行数（検証分を含む）
    pub train_rows: usize,

    /// テスト行数
    pub test_rows: usize,

    /// 学習時刻（ISO8601形式）
    pub trained_at: String,
}

fn default_input_layer() -> String {
    INPUT_LAYER_NAME.to_string()
}

fn default_output_layer() -> String {
    OUTPUT_LAYER_NAME.to_string()
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        feature_columns: Vec<String>,
        label_column: String,
        hidden_units: usize,
        feature_mean: Vec<f32>,
        feature_variance: Vec<f32>,
        loss: LossKind,
        learning_rate: f64,
        num_epochs: u32,
        train_rows: usize,
        test_rows: usize,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            feature_columns,
            label_column,
            input_layer: default_input_layer(),
            output_layer: default_output_layer(),
            hidden_units,
            feature_mean,
            feature_variance,
            loss,
            learning_rate,
            num_epochs,
            train_rows,
            test_rows,
            trained_at,
        }
    }

    /// 入力特徴量の次元
    pub fn num_features(&self) -> usize {
        self.feature_columns.len()
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize metadata to JSON")
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        let metadata: Self =
            serde_json::from_str(json).context("Failed to deserialize metadata from JSON")?;

        if metadata.feature_mean.len() != metadata.num_features()
            || metadata.feature_variance.len() != metadata.num_features()
        {
            anyhow::bail!(
                "normalization statistics do not match feature columns ({} columns, {} means, {} variances)",
                metadata.num_features(),
                metadata.feature_mean.len(),
                metadata.feature_variance.len()
            );
        }

        Ok(metadata)
    }
}
