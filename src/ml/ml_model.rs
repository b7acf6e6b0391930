//! 山火事予測の回帰モデル
//!
//! 正規化層 + 全結合1層 (ReLU) + 線形出力1ユニットの構成です。

use anyhow::Result;
use burn::{
    config::Config,
    module::{Ignored, Module},
    nn::{
        loss::{MseLoss, Reduction},
        Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
    train::RegressionOutput,
};

use crate::model::config::LossKind;

/// 正規化層で分散がゼロの列に使う下限
pub const NORMALIZATION_EPSILON: f32 = 1e-7;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 入力特徴量の次元
    pub num_features: usize,
    /// 中間層のユニット数
    #[config(default = 70)]
    pub hidden_units: usize,
}

impl ModelConfig {
    /// モデルを初期化
    ///
    /// `mean` / `variance` は学習データから求めた列ごとの統計量です（正規化層の adapt）。
    pub fn init<B: Backend>(
        &self,
        mean: &[f32],
        variance: &[f32],
        loss: LossKind,
        device: &B::Device,
    ) -> Result<WildfireRegressor<B>> {
        if mean.len() != self.num_features || variance.len() != self.num_features {
            anyhow::bail!(
                "正規化の統計量が入力次元と一致しません: {} 列, mean {} 件, variance {} 件",
                self.num_features,
                mean.len(),
                variance.len()
            );
        }

        log::debug!(
            "[Model] {} -> Normalization -> Dense({}, relu) -> Dense(1)",
            self.num_features,
            self.hidden_units
        );

        Ok(WildfireRegressor {
            norm: Normalization::adapted(mean, variance, device),
            hidden: LinearConfig::new(self.num_features, self.hidden_units).init(device),
            output: LinearConfig::new(self.hidden_units, 1).init(device),
            activation: Relu::new(),
            loss: Ignored(loss),
        })
    }
}

/// 特徴量の正規化層
///
/// `(x - mean) / max(sqrt(variance), epsilon)` を計算します。統計量は学習対象外です。
#[derive(Module, Debug)]
pub struct Normalization<B: Backend> {
    mean: Tensor<B, 2>,
    std: Tensor<B, 2>,
}

impl<B: Backend> Normalization<B> {
    pub fn adapted(mean: &[f32], variance: &[f32], device: &B::Device) -> Self {
        let n = mean.len();
        let std: Vec<f32> = variance
            .iter()
            .map(|v| v.max(0.0).sqrt().max(NORMALIZATION_EPSILON))
            .collect();

        Self {
            mean: Tensor::<B, 1>::from_floats(mean, device).reshape([1, n]),
            std: Tensor::<B, 1>::from_floats(std.as_slice(), device).reshape([1, n]),
        }
    }

    /// [batch_size, num_features] -> [batch_size, num_features]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        features.sub(self.mean.clone()).div(self.std.clone())
    }
}

/// 山火事予測モデル
#[derive(Module, Debug)]
pub struct WildfireRegressor<B: Backend> {
    norm: Normalization<B>,   // model_in
    hidden: Linear<B>,        // num_features -> hidden_units
    output: Linear<B>,        // hidden_units -> 1 (model_out)
    activation: Relu,
    loss: Ignored<LossKind>,
}

impl<B: Backend> WildfireRegressor<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `features`: [batch_size, num_features]
    ///
    /// # 戻り値
    /// - 予測値 [batch_size, 1]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.norm.forward(features);
        let x = self.hidden.forward(x);
        let x = self.activation.forward(x);
        self.output.forward(x)
    }

    pub fn loss_kind(&self) -> LossKind {
        *self.loss
    }

    /// 損失を計算
    pub fn loss(&self, output: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        match *self.loss {
            LossKind::MeanSquaredError => MseLoss::new().forward(output, targets, Reduction::Mean),
            LossKind::MeanAbsoluteError => output.sub(targets).abs().mean(),
        }
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// # 引数
    /// - `features`: [batch_size, num_features]
    /// - `targets`: [batch_size, 1]
    pub fn forward_regression(
        &self,
        features: Tensor<B, 2>,
        targets: Tensor<B, 2>,
    ) -> RegressionOutput<B> {
        let output = self.forward(features);
        let loss = self.loss(output.clone(), targets.clone());

        RegressionOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray;

    #[test]
    fn test_normalization_forward() {
        let device = NdArrayDevice::Cpu;
        let norm = Normalization::<TestBackend>::adapted(&[1.0, 2.0], &[4.0, 0.0], &device);

        let input = Tensor::<TestBackend, 1>::from_floats([3.0f32, 2.0, -1.0, 2.0].as_slice(), &device)
            .reshape([2, 2]);
        let output: Vec<f32> = norm.forward(input).into_data().to_vec().unwrap();

        assert_eq!(output, vec![1.0, 0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_forward_shape() {
        let device = NdArrayDevice::Cpu;
        let model = ModelConfig::new(26).init::<TestBackend>(
            &[0.0; 26],
            &[1.0; 26],
            LossKind::MeanSquaredError,
            &device,
        )
        .unwrap();

        let input = Tensor::<TestBackend, 2>::zeros([3, 26], &device);
        assert_eq!(model.forward(input).dims(), [3, 1]);
    }

    #[test]
    fn test_loss_kinds() {
        let device = NdArrayDevice::Cpu;
        let output = Tensor::<TestBackend, 1>::from_floats([1.0f32, 3.0].as_slice(), &device).reshape([2, 1]);
        let targets = Tensor::<TestBackend, 1>::from_floats([0.0f32, 1.0].as_slice(), &device).reshape([2, 1]);

        let mse_model = ModelConfig::new(1).init::<TestBackend>(&[0.0], &[1.0], LossKind::MeanSquaredError, &device).unwrap();
        let mae_model = ModelConfig::new(1).init::<TestBackend>(&[0.0], &[1.0], LossKind::MeanAbsoluteError, &device).unwrap();

        let mse: f32 = mse_model.loss(output.clone(), targets.clone()).into_scalar();
        let mae: f32 = mae_model.loss(output, targets).into_scalar();

        assert!((mse - 2.5).abs() < 1e-6);
        assert!((mae - 1.5).abs() < 1e-6);
        assert_eq!(mae_model.loss_kind(), LossKind::MeanAbsoluteError);
    }

    #[test]
    fn test_mismatched_statistics_are_rejected() {
        let device = NdArrayDevice::Cpu;
        let result = ModelConfig::new(2).init::<TestBackend>(
            &[0.0],
            &[1.0, 1.0],
            LossKind::MeanSquaredError,
            &device,
        );
        assert!(result.is_err());
    }
}
