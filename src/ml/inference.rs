//! 学習済みモデルによる予測

use anyhow::Result;
use std::path::Path;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
};
use burn_ndarray::{NdArray, NdArrayDevice};

use crate::ml::training::predict_table;
use crate::ml::{ModelConfig, WildfireRegressor};
use crate::model::{load_model_with_metadata, ModelMetadata};
use crate::types::FeatureTable;

/// 予測エンジン（CPUバックエンド）
pub struct Predictor {
    model: WildfireRegressor<NdArray>,
    metadata: ModelMetadata,
    device: NdArrayDevice,
}

impl Predictor {
    /// 保存済みモデル（tar.gz）を読み込んで初期化
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        Self::from_parts(metadata, model_binary)
    }

    /// メタデータと重みバイナリから初期化
    pub fn from_parts(metadata: ModelMetadata, model_binary: Vec<u8>) -> Result<Self> {
        let device = NdArrayDevice::Cpu;

        let model_config =
            ModelConfig::new(metadata.num_features()).with_hidden_units(metadata.hidden_units);
        let model = model_config.init::<NdArray>(
            &metadata.feature_mean,
            &metadata.feature_variance,
            metadata.loss,
            &device,
        )?;

        // モデルの重みを復元
        let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
        let record = recorder
            .load(model_binary, &device)
            .map_err(|e| anyhow::anyhow!("モデル重みの読み込みエラー: {:?}", e))?;
        let model = model.load_record(record);

        log::info!(
            "モデルを読み込みました: 入力 {} 列, 学習日時 {}",
            metadata.num_features(),
            metadata.trained_at
        );

        Ok(Self {
            model,
            metadata,
            device,
        })
    }

    /// 特徴量の行（メタデータの列順）から予測値を返す
    pub fn predict_rows(&self, rows: &[Vec<f32>]) -> Result<Vec<f32>> {
        let expected = self.metadata.num_features();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            anyhow::bail!("行 {} の列数が不正です: {} (期待: {})", i, row.len(), expected);
        }

        let table = FeatureTable {
            columns: self.metadata.feature_columns.clone(),
            rows: rows.to_vec(),
        };
        predict_table(&self.model, &table, &self.device)
    }

    /// 特徴量テーブルから予測値を返す（列名と順序を検証）
    pub fn predict_table(&self, table: &FeatureTable) -> Result<Vec<f32>> {
        if table.columns != self.metadata.feature_columns {
            anyhow::bail!(
                "特徴量列がモデルと一致しません: {} 列 (期待: {} 列)",
                table.num_columns(),
                self.metadata.num_features()
            );
        }
        self.predict_rows(&table.rows)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
