//! モデル学習と評価

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use burn::{
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    module::Module,
    optim::AdamConfig,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
    train::{
        metric::LossMetric, LearnerBuilder, LearningStrategy, RegressionOutput, TrainOutput,
        TrainStep, ValidStep,
    },
};
use burn_autodiff::Autodiff;
use burn_dataset::Dataset;
use burn_ndarray::{NdArray, NdArrayDevice};
use burn_wgpu::{Wgpu, WgpuDevice};

use crate::ml::{ModelConfig, WildfireRegressor};
use crate::model::config::{AppConfig, DeviceType, TrainingSettings};
use crate::model::{save_model_with_metadata, ModelMetadata};
use crate::types::{FeatureTable, PreparedDataset, LABEL_COLUMN};

/// 学習データセット（1行 = 1サンプル）
pub struct WildfireDataset {
    items: Vec<WildfireItem>,
}

impl WildfireDataset {
    /// 特徴量テーブルとラベルから作成
    pub fn from_table(features: &FeatureTable, labels: &[f32]) -> Self {
        let items = features
            .rows
            .iter()
            .zip(labels)
            .map(|(row, label)| WildfireItem {
                features: row.clone(),
                label: *label,
            })
            .collect();
        Self { items }
    }
}

/// データセットアイテム
#[derive(Clone, Debug)]
pub struct WildfireItem {
    pub features: Vec<f32>,
    pub label: f32,
}

impl Dataset<WildfireItem> for WildfireDataset {
    fn get(&self, index: usize) -> Option<WildfireItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// バッチャー
#[derive(Clone)]
pub struct WildfireBatcher<B: Backend> {
    device: B::Device,
    num_features: usize,
}

impl<B: Backend> WildfireBatcher<B> {
    pub fn new(device: B::Device, num_features: usize) -> Self {
        Self {
            device,
            num_features,
        }
    }
}

impl<B: Backend> Batcher<B, WildfireItem, WildfireBatch<B>> for WildfireBatcher<B> {
    fn batch(&self, items: Vec<WildfireItem>, _device: &B::Device) -> WildfireBatch<B> {
        let batch_size = items.len();
        let mut features = Vec::with_capacity(batch_size * self.num_features);
        let mut targets = Vec::with_capacity(batch_size);

        for item in items {
            features.extend_from_slice(&item.features);
            targets.push(item.label);
        }

        let features = Tensor::<B, 1>::from_floats(features.as_slice(), &self.device)
            .reshape([batch_size, self.num_features]);
        let targets = Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device)
            .reshape([batch_size, 1]);

        WildfireBatch { features, targets }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct WildfireBatch<B: Backend> {
    pub features: Tensor<B, 2>,
    pub targets: Tensor<B, 2>,
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<WildfireBatch<B>, RegressionOutput<B>> for WildfireRegressor<B> {
    fn step(&self, batch: WildfireBatch<B>) -> TrainOutput<RegressionOutput<B>> {
        let item = self.forward_regression(batch.features, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<WildfireBatch<B>, RegressionOutput<B>> for WildfireRegressor<B> {
    fn step(&self, batch: WildfireBatch<B>) -> RegressionOutput<B> {
        self.forward_regression(batch.features, batch.targets)
    }
}

/// 回帰の評価指標
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationMetrics {
    /// 平均二乗誤差
    pub mse: f32,
    /// 平均絶対誤差
    pub mae: f32,
    /// 評価した行数
    pub rows: usize,
}

impl EvaluationMetrics {
    /// 予測値と正解ラベルから計算（空の場合は None）
    pub fn from_predictions(predictions: &[f32], labels: &[f32]) -> Option<Self> {
        if predictions.is_empty() || predictions.len() != labels.len() {
            return None;
        }

        let n = predictions.len() as f64;
        let (sq, abs) = predictions
            .iter()
            .zip(labels)
            .fold((0.0f64, 0.0f64), |(sq, abs), (p, y)| {
                let d = (*p - *y) as f64;
                (sq + d * d, abs + d.abs())
            });

        Some(Self {
            mse: (sq / n) as f32,
            mae: (abs / n) as f32,
            rows: predictions.len(),
        })
    }
}

/// 学習結果
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// テストデータでの評価（テストデータが空なら None）
    pub test_metrics: Option<EvaluationMetrics>,
    /// 保存したモデルのパス（保存しない設定なら None）
    pub saved_path: Option<PathBuf>,
    pub train_rows: usize,
    pub validation_rows: usize,
}

/// 特徴量テーブルに対する予測値
pub fn predict_table<B: Backend>(
    model: &WildfireRegressor<B>,
    features: &FeatureTable,
    device: &B::Device,
) -> Result<Vec<f32>> {
    if features.is_empty() {
        return Ok(Vec::new());
    }

    let input = Tensor::<B, 1>::from_floats(features.flatten().as_slice(), device)
        .reshape([features.len(), features.num_columns()]);
    let output = model.forward(input);

    output
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("予測結果の取得エラー: {:?}", e))
}

/// 学習済みモデルをテストデータで評価
pub fn evaluate<B: Backend>(
    model: &WildfireRegressor<B>,
    features: &FeatureTable,
    labels: &[f32],
    device: &B::Device,
) -> Result<Option<EvaluationMetrics>> {
    let predictions = predict_table(model, features, device)?;
    Ok(EvaluationMetrics::from_predictions(&predictions, labels))
}

/// モデルの重みをバイナリに変換
pub fn model_to_bytes<B: Backend>(model: WildfireRegressor<B>) -> Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(model.into_record(), ())
        .map_err(|e| anyhow::anyhow!("モデル重みの書き出しエラー: {:?}", e))
}

/// 学習データの末尾を検証用に分割
///
/// 学習用は `floor(len * (1 - validation_split))` 行です。
pub fn validation_split(
    features: &FeatureTable,
    labels: &[f32],
    fraction: f64,
) -> ((FeatureTable, Vec<f32>), (FeatureTable, Vec<f32>)) {
    let split_at = ((features.len() as f64) * (1.0 - fraction)).floor() as usize;
    let split_at = split_at.min(features.len());

    let (train_features, val_features) = features.split_at(split_at);
    let (train_labels, val_labels) = labels.split_at(split_at.min(labels.len()));

    (
        (train_features, train_labels.to_vec()),
        (val_features, val_labels.to_vec()),
    )
}

/// 設定のバックエンドで学習・評価・保存を実行
pub fn train_and_save(data: &PreparedDataset, config: &AppConfig) -> Result<TrainingReport> {
    log::info!("計算デバイス: {}", config.device_type);
    match config.device_type {
        DeviceType::Cpu => train_with_backend::<Autodiff<NdArray>>(data, config, NdArrayDevice::Cpu),
        DeviceType::Wgpu => train_with_backend::<Autodiff<Wgpu>>(data, config, WgpuDevice::DiscreteGpu(0)),
    }
}

fn train_with_backend<B: AutodiffBackend>(
    data: &PreparedDataset,
    config: &AppConfig,
    device: B::Device,
) -> Result<TrainingReport> {
    // 学習の作業領域（終了時に削除）
    let artifact_dir = tempfile::Builder::new()
        .prefix("smokey_training")
        .tempdir()
        .context("Failed to create training directory")?;

    let (model, train_rows, validation_rows) = train_model::<B>(
        data,
        &config.training,
        config.model.hidden_units,
        artifact_dir.path(),
        device.clone(),
    )?;

    let test_metrics = evaluate(&model, &data.test_features, &data.test_labels, &device)?;
    match &test_metrics {
        Some(m) => log::info!("テストデータ評価 ({} 行): mse={:.4}, mae={:.4}", m.rows, m.mse, m.mae),
        None => log::warn!("テストデータが無いため評価をスキップしました"),
    }

    let saved_path = if config.model.persist {
        let (mean, variance) = data.train_features.column_stats();
        let metadata = ModelMetadata::new(
            data.train_features.columns.clone(),
            LABEL_COLUMN.to_string(),
            config.model.hidden_units,
            mean,
            variance,
            config.training.loss,
            config.training.learning_rate,
            config.training.num_epochs as u32,
            data.train_features.len(),
            data.test_features.len(),
        );
        let binary = model_to_bytes(model)?;
        let path = save_model_with_metadata(Path::new(&config.model.output_path), &metadata, &binary)
            .context("Failed to save trained model")?;
        Some(path)
    } else {
        log::info!("モデルの保存は無効です");
        None
    };

    Ok(TrainingReport {
        test_metrics,
        saved_path,
        train_rows,
        validation_rows,
    })
}

/// モデル学習を実行
///
/// 正規化層の統計量は検証分を含む学習データ全体から求めます。
/// 戻り値は (学習済みモデル, 学習行数, 検証行数) です。
pub fn train_model<B: AutodiffBackend>(
    data: &PreparedDataset,
    settings: &TrainingSettings,
    hidden_units: usize,
    artifact_dir: &Path,
    device: B::Device,
) -> Result<(WildfireRegressor<B::InnerBackend>, usize, usize)> {
    let num_features = data.train_features.num_columns();
    let (mean, variance) = data.train_features.column_stats();

    let ((train_features, train_labels), (val_features, val_labels)) =
        validation_split(&data.train_features, &data.train_labels, settings.validation_split);

    if train_features.is_empty() || val_features.is_empty() {
        anyhow::bail!(
            "学習データが不足しています: 学習 {} 行, 検証 {} 行",
            train_features.len(),
            val_features.len()
        );
    }

    let train_rows = train_features.len();
    let validation_rows = val_features.len();
    log::info!("学習データ: {} 行", train_rows);
    log::info!("検証データ: {} 行", validation_rows);

    let model_config = ModelConfig::new(num_features).with_hidden_units(hidden_units);
    let model = model_config.init::<B>(&mean, &variance, settings.loss, &device)?;
    log::info!(
        "モデル設定: 入力 {} 列, 中間層 {} ユニット, 損失関数 {}, パラメータ数 {}",
        num_features,
        hidden_units,
        settings.loss,
        model.num_params()
    );

    let batcher_train = WildfireBatcher::<B>::new(device.clone(), num_features);
    let batcher_val = WildfireBatcher::<B::InnerBackend>::new(device.clone(), num_features);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(settings.batch_size)
        .shuffle(0)
        .num_workers(1)
        .build(WildfireDataset::from_table(&train_features, &train_labels));

    let dataloader_val = DataLoaderBuilder::new(batcher_val)
        .batch_size(settings.batch_size)
        .num_workers(1)
        .build(WildfireDataset::from_table(&val_features, &val_labels));

    log::info!(
        "学習を開始します: エポック数 {}, バッチサイズ {}, 学習率 {}",
        settings.num_epochs,
        settings.batch_size,
        settings.learning_rate
    );

    let artifact_dir_str = artifact_dir.to_string_lossy().to_string();
    let learner = LearnerBuilder::new(&artifact_dir_str)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .learning_strategy(LearningStrategy::SingleDevice(device))
        .num_epochs(settings.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), settings.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_val);
    log::info!("学習が完了しました");

    Ok((model_trained.model, train_rows, validation_rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::LossKind;

    type TestBackend = NdArray;

    fn table(rows: Vec<Vec<f32>>) -> FeatureTable {
        let n = rows.first().map(|r| r.len()).unwrap_or(0);
        FeatureTable {
            columns: (0..n).map(|i| format!("f{}", i)).collect(),
            rows,
        }
    }

    #[test]
    fn test_validation_split_takes_tail() {
        let features = table((0..10).map(|i| vec![i as f32]).collect());
        let labels: Vec<f32> = (0..10).map(|i| i as f32).collect();

        let ((train, train_labels), (val, val_labels)) = validation_split(&features, &labels, 0.2);

        assert_eq!(train.len(), 8);
        assert_eq!(train_labels.len(), 8);
        assert_eq!(val.rows, vec![vec![8.0], vec![9.0]]);
        assert_eq!(val_labels, vec![8.0, 9.0]);
    }

    #[test]
    fn test_batcher_shapes() {
        let device = NdArrayDevice::Cpu;
        let batcher = WildfireBatcher::<TestBackend>::new(device.clone(), 3);
        let items = vec![
            WildfireItem { features: vec![1.0, 2.0, 3.0], label: 0.0 },
            WildfireItem { features: vec![4.0, 5.0, 6.0], label: 1.0 },
        ];

        let batch = batcher.batch(items, &device);
        assert_eq!(batch.features.dims(), [2, 3]);
        assert_eq!(batch.targets.dims(), [2, 1]);

        let targets: Vec<f32> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![0.0, 1.0]);
    }

    #[test]
    fn test_dataset_from_table() {
        let features = table(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let dataset = WildfireDataset::from_table(&features, &[0.0, 1.0]);

        assert_eq!(dataset.len(), 2);
        let item = dataset.get(1).unwrap();
        assert_eq!(item.features, vec![3.0, 4.0]);
        assert_eq!(item.label, 1.0);
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_metrics_from_predictions() {
        let metrics = EvaluationMetrics::from_predictions(&[1.0, 3.0], &[0.0, 1.0]).unwrap();
        assert!((metrics.mse - 2.5).abs() < 1e-6);
        assert!((metrics.mae - 1.5).abs() < 1e-6);
        assert_eq!(metrics.rows, 2);

        assert!(EvaluationMetrics::from_predictions(&[], &[]).is_none());
        assert!(EvaluationMetrics::from_predictions(&[1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_evaluate_matches_forward() {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new(2).init::<TestBackend>(
            &[0.0, 0.0],
            &[1.0, 1.0],
            LossKind::MeanSquaredError,
            &device,
        )
        .unwrap();
        let features = table(vec![vec![0.5, -0.5], vec![1.0, 2.0], vec![3.0, 0.0]]);
        let predictions = predict_table(&model, &features, &device).unwrap();
        assert_eq!(predictions.len(), 3);

        let labels = vec![0.0, 1.0, 0.0];
        let metrics = evaluate(&model, &features, &labels, &device).unwrap().unwrap();
        let expected = EvaluationMetrics::from_predictions(&predictions, &labels).unwrap();
        assert_eq!(metrics, expected);

        let empty = table(Vec::new());
        assert!(evaluate(&model, &empty, &[], &device).unwrap().is_none());
    }

    #[test]
    fn test_too_few_rows_for_validation() {
        let data = PreparedDataset {
            train_features: table(vec![vec![1.0, 2.0]]),
            train_labels: vec![1.0],
            test_features: table(vec![vec![1.0, 2.0]]),
            test_labels: vec![0.0],
        };
        let dir = tempfile::tempdir().unwrap();

        let result = train_model::<Autodiff<TestBackend>>(
            &data,
            &TrainingSettings::default(),
            4,
            dir.path(),
            NdArrayDevice::Cpu,
        );
        assert!(result.is_err());
    }

    /// 2列の特徴量から作る小さなデータセット（学習 20 行, テスト 5 行）
    fn small_dataset() -> PreparedDataset {
        let rows = |range: std::ops::Range<usize>| {
            table(range.clone().map(|i| vec![i as f32, (i % 3) as f32]).collect())
        };
        let labels = |range: std::ops::Range<usize>| range.map(|i| (i % 2) as f32).collect();
        PreparedDataset {
            train_features: rows(0..20),
            train_labels: labels(0..20),
            test_features: rows(20..25),
            test_labels: labels(20..25),
        }
    }

    fn quick_config(output: &Path, loss: LossKind, persist: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.device_type = DeviceType::Cpu;
        config.model.output_path = output.to_string_lossy().to_string();
        config.model.hidden_units = 4;
        config.model.persist = persist;
        config.training.num_epochs = 1;
        config.training.batch_size = 4;
        config.training.loss = loss;
        config
    }

    #[test]
    fn test_train_and_save_writes_loadable_archive() {
        let dir = tempfile::tempdir().unwrap();
        let data = small_dataset();
        let config = quick_config(&dir.path().join("prediction_model"), LossKind::MeanSquaredError, true);

        let report = train_and_save(&data, &config).unwrap();

        assert_eq!(report.train_rows, 16);
        assert_eq!(report.validation_rows, 4);
        let metrics = report.test_metrics.unwrap();
        assert_eq!(metrics.rows, 5);
        assert!(metrics.mse.is_finite());

        let path = report.saved_path.unwrap();
        assert_eq!(path, dir.path().join("prediction_model.tar.gz"));
        let predictor = crate::ml::Predictor::load(&path).unwrap();
        assert_eq!(predictor.metadata().hidden_units, 4);
        assert_eq!(predictor.metadata().train_rows, 20);
        let predictions = predictor.predict_table(&data.test_features).unwrap();
        assert_eq!(predictions.len(), 5);
        assert!(predictions.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_train_without_persist_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("prediction_model");
        let config = quick_config(&output, LossKind::MeanSquaredError, false);

        let report = train_and_save(&small_dataset(), &config).unwrap();

        assert!(report.saved_path.is_none());
        assert!(!dir.path().join("prediction_model.tar.gz").exists());
        assert!(!output.exists());
    }

    #[test]
    fn test_train_with_mean_absolute_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config(&dir.path().join("mae_model"), LossKind::MeanAbsoluteError, true);

        let report = train_and_save(&small_dataset(), &config).unwrap();

        assert!(report.test_metrics.unwrap().mae.is_finite());
        let metadata = crate::model::load_metadata(&report.saved_path.unwrap()).unwrap();
        assert_eq!(metadata.loss, LossKind::MeanAbsoluteError);
    }
}
