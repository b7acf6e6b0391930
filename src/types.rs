use serde::{Deserialize, Serialize};

/// 予測対象のラベル列
pub const LABEL_COLUMN: &str = "Was Wildfire";

/// 入力ファイルの列定義（ヘッダー無し、位置で対応付け）
///
/// - Bin X, Bin Y: 空間ビンの座標
/// - Day T-3 ～ Day T-0: 予測日からの日オフセットごとの気象値 6種
/// - Was Wildfire: 学習用の出力 (0/1)
pub const COLUMN_NAMES: [&str; 27] = [
    "Bin X",
    "Bin Y",
    // 予測日の3日前（リクエストの2日前）
    "Day T-3 Lightning Prob",
    "Day T-3 Mixing Ratio",
    "Day T-3 Wind Speed",
    "Day T-3 Wind Dir",
    "Day T-3 Temp",
    "Day T-3 Precip Prob",
    // 予測日の2日前（リクエストの前日）
    "Day T-2 Lightning Prob",
    "Day T-2 Mixing Ratio",
    "Day T-2 Wind Speed",
    "Day T-2 Wind Dir",
    "Day T-2 Temp",
    "Day T-2 Precip Prob",
    // 予測日の前日（リクエスト当日）
    "Day T-1 Lightning Prob",
    "Day T-1 Mixing Ratio",
    "Day T-1 Wind Speed",
    "Day T-1 Wind Dir",
    "Day T-1 Temp",
    "Day T-1 Precip Prob",
    // 予測日の予報値
    "Day T-0 Lightning Prob",
    "Day T-0 Mixing Ratio",
    "Day T-0 Wind Speed",
    "Day T-0 Wind Dir",
    "Day T-0 Temp",
    "Day T-0 Precip Prob",
    LABEL_COLUMN,
];

/// 列スキーマ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<String>,
    pub label: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(COLUMN_NAMES.iter().map(|c| c.to_string()).collect(), LABEL_COLUMN)
    }
}

impl Schema {
    pub fn new(columns: Vec<String>, label: impl Into<String>) -> Self {
        Self {
            columns,
            label: label.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn label_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| *c == self.label)
    }

    /// ラベル列を除いた特徴量列（スキーマ順）
    pub fn feature_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| **c != self.label)
            .cloned()
            .collect()
    }
}

/// 特徴量テーブル（行優先）
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f32>>,
}

impl FeatureTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// 行を連結した1次元配列 (rows * columns)
    pub fn flatten(&self) -> Vec<f32> {
        self.rows.iter().flatten().copied().collect()
    }

    /// 列ごとの平均と分散（母分散）
    ///
    /// 正規化層の adapt に使用します。空のテーブルではゼロを返します。
    pub fn column_stats(&self) -> (Vec<f32>, Vec<f32>) {
        let n_cols = self.num_columns();
        let mut mean = vec![0.0f64; n_cols];
        let mut variance = vec![0.0f64; n_cols];

        if self.rows.is_empty() {
            return (vec![0.0; n_cols], vec![0.0; n_cols]);
        }

        let n = self.rows.len() as f64;
        for row in &self.rows {
            for (acc, value) in mean.iter_mut().zip(row) {
                *acc += *value as f64;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        for row in &self.rows {
            for ((acc, value), m) in variance.iter_mut().zip(row).zip(&mean) {
                let d = *value as f64 - m;
                *acc += d * d;
            }
        }
        variance.iter_mut().for_each(|v| *v /= n);

        (
            mean.into_iter().map(|m| m as f32).collect(),
            variance.into_iter().map(|v| v as f32).collect(),
        )
    }

    /// 先頭 `at` 行とそれ以降に分割
    pub fn split_at(&self, at: usize) -> (Self, Self) {
        let at = at.min(self.rows.len());
        (
            Self {
                columns: self.columns.clone(),
                rows: self.rows[..at].to_vec(),
            },
            Self {
                columns: self.columns.clone(),
                rows: self.rows[at..].to_vec(),
            },
        )
    }
}

/// 前処理済みデータセット（学習用/テスト用の特徴量とラベル）
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub train_features: FeatureTable,
    pub train_labels: Vec<f32>,
    pub test_features: FeatureTable,
    pub test_labels: Vec<f32>,
}

impl PreparedDataset {
    pub fn total_rows(&self) -> usize {
        self.train_features.len() + self.test_features.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_layout() {
        let schema = Schema::default();
        assert_eq!(schema.len(), 27);
        assert_eq!(schema.label_index(), Some(26));
        assert_eq!(schema.columns[0], "Bin X");
        assert_eq!(schema.columns[1], "Bin Y");

        let features = schema.feature_columns();
        assert_eq!(features.len(), 26);
        assert!(!features.iter().any(|c| c == LABEL_COLUMN));
        assert_eq!(features[2], "Day T-3 Lightning Prob");
        assert_eq!(features[25], "Day T-0 Precip Prob");
    }

    #[test]
    fn test_column_stats() {
        let mut table = FeatureTable::new(vec!["a".to_string(), "b".to_string()]);
        table.rows.push(vec![1.0, 10.0]);
        table.rows.push(vec![3.0, 10.0]);

        let (mean, variance) = table.column_stats();
        assert_eq!(mean, vec![2.0, 10.0]);
        assert_eq!(variance, vec![1.0, 0.0]);
    }

    #[test]
    fn test_split_at_keeps_order() {
        let mut table = FeatureTable::new(vec!["a".to_string()]);
        for i in 0..5 {
            table.rows.push(vec![i as f32]);
        }

        let (head, tail) = table.split_at(4);
        assert_eq!(head.len(), 4);
        assert_eq!(tail.rows, vec![vec![4.0]]);
        assert_eq!(table.flatten(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
