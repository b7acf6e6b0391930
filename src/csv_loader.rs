//! 学習データの読み込みと前処理
//!
//! ヘッダー無しの区切り文字付きテキストを列スキーマに従って読み込み、
//! 欠損値を含む行を除外してから学習用/テスト用に分割します。

use crate::types::{FeatureTable, PreparedDataset, Schema};
use csv::{ReaderBuilder, StringRecord, Trim};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 設定トークン以外にも欠損値として扱う表記
pub const DEFAULT_MISSING_TOKENS: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// 前処理のエラー
#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("input file not found or unreadable: {}", .path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected {expected} fields, found {found}")]
    SchemaMismatch {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("no rows left after dropping missing values in {}", .path.display())]
    EmptyDataset { path: PathBuf },

    #[error("line {line}: column '{column}' has non-numeric or non-finite value '{value}'")]
    InvalidValue {
        line: u64,
        column: String,
        value: String,
    },

    #[error("invalid load options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// 読み込み設定
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub schema: Schema,
    /// 欠損値を表すトークン
    pub missing_sentinel: String,
    /// この文字で始まる行は読み飛ばす
    pub comment_prefix: Option<u8>,
    pub delimiter: u8,
    /// 欠損値を含む行を除外する（補完はしない）
    pub drop_missing: bool,
    pub train_fraction: f64,
    pub seed: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            schema: Schema::default(),
            missing_sentinel: "?".to_string(),
            comment_prefix: Some(b'\t'),
            delimiter: b' ',
            drop_missing: true,
            train_fraction: 0.8,
            seed: 0,
        }
    }
}

impl LoadOptions {
    /// 欠損値かどうか（設定トークン、既定の欠損表記、空フィールド）
    pub fn is_missing(&self, field: &str) -> bool {
        field == self.missing_sentinel || DEFAULT_MISSING_TOKENS.contains(&field)
    }

    fn validate(&self) -> Result<(), PrepareError> {
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(PrepareError::InvalidOptions(format!(
                "train_fraction must be in (0, 1], got {}",
                self.train_fraction
            )));
        }
        if self.schema.label_index().is_none() {
            return Err(PrepareError::InvalidOptions(format!(
                "label column '{}' is not part of the schema",
                self.schema.label
            )));
        }
        if !self.drop_missing {
            return Err(PrepareError::InvalidOptions(
                "rows with missing values are always dropped".to_string(),
            ));
        }
        Ok(())
    }
}

/// データファイルを読み込み、学習用/テスト用の特徴量とラベルを返す
pub fn load_dataset(path: &Path, options: &LoadOptions) -> Result<PreparedDataset, PrepareError> {
    options.validate()?;

    let rows = read_clean_rows(path, options)?;
    if rows.is_empty() {
        return Err(PrepareError::EmptyDataset {
            path: path.to_path_buf(),
        });
    }

    let (train_idx, test_idx) = partition(rows.len(), options.train_fraction, options.seed);
    log::info!(
        "データ分割: 学習 {} 行, テスト {} 行 (train_fraction={}, seed={})",
        train_idx.len(),
        test_idx.len(),
        options.train_fraction,
        options.seed
    );

    let (train_features, train_labels) = split_label(&rows, &train_idx, &options.schema);
    let (test_features, test_labels) = split_label(&rows, &test_idx, &options.schema);

    Ok(PreparedDataset {
        train_features,
        train_labels,
        test_features,
        test_labels,
    })
}

/// ラベル列を含まない特徴量ファイルを読み込む（予測用）
///
/// 列はスキーマからラベル列を除いたものです。欠損値を含む行は除外されます。
pub fn load_feature_table(path: &Path, options: &LoadOptions) -> Result<FeatureTable, PrepareError> {
    let feature_options = LoadOptions {
        schema: Schema::new(options.schema.feature_columns(), options.schema.label.clone()),
        ..options.clone()
    };

    let rows = read_clean_rows(path, &feature_options)?;
    if rows.is_empty() {
        return Err(PrepareError::EmptyDataset {
            path: path.to_path_buf(),
        });
    }

    Ok(FeatureTable {
        columns: feature_options.schema.columns,
        rows,
    })
}

/// 行を読み込み、欠損値を含む行を除外する
///
/// ファイルハンドルはこの関数内でのみ保持されます。
fn read_clean_rows(path: &Path, options: &LoadOptions) -> Result<Vec<Vec<f32>>, PrepareError> {
    let file = File::open(path).map_err(|source| PrepareError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(options.delimiter)
        .comment(options.comment_prefix)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    // 空白区切りの場合は連続する区切り文字を1つとみなす
    let collapse = options.delimiter.is_ascii_whitespace();
    let expected = options.schema.len();

    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let fields = collect_fields(&record, collapse);

        if fields.is_empty() {
            continue;
        }
        if fields.len() != expected {
            return Err(PrepareError::SchemaMismatch {
                line,
                expected,
                found: fields.len(),
            });
        }

        if fields.iter().any(|f| options.is_missing(f)) {
            dropped += 1;
            continue;
        }

        let mut values = Vec::with_capacity(expected);
        for (field, column) in fields.iter().zip(&options.schema.columns) {
            let value = field
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| PrepareError::InvalidValue {
                    line,
                    column: column.clone(),
                    value: field.to_string(),
                })?;
            values.push(value);
        }
        rows.push(values);
    }

    log::info!(
        "{} を読み込みました: 有効 {} 行, 欠損値により除外 {} 行",
        path.display(),
        rows.len(),
        dropped
    );

    Ok(rows)
}

fn collect_fields(record: &StringRecord, collapse: bool) -> Vec<&str> {
    if collapse {
        record.iter().filter(|f| !f.is_empty()).collect()
    } else {
        record.iter().collect()
    }
}

/// 行インデックスを学習用とテスト用に分割
///
/// 学習用は `floor(len * train_fraction)` 行をシード付きで無作為抽出した順序、
/// テスト用は残りの行を元の順序で返します。
pub fn partition(len: usize, train_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train_len = ((len as f64 * train_fraction).floor() as usize).min(len);
    let mut test = indices.split_off(train_len);
    test.sort_unstable();

    (indices, test)
}

/// ラベル列を取り出し、残りを特徴量テーブルにする
fn split_label(rows: &[Vec<f32>], indices: &[usize], schema: &Schema) -> (FeatureTable, Vec<f32>) {
    let label_idx = schema.label_index().unwrap_or(schema.len() - 1);
    let mut features = FeatureTable::new(schema.feature_columns());
    let mut labels = Vec::with_capacity(indices.len());

    for &i in indices {
        let row = &rows[i];
        labels.push(row[label_idx]);
        features.rows.push(
            row.iter()
                .enumerate()
                .filter(|(col, _)| *col != label_idx)
                .map(|(_, v)| *v)
                .collect(),
        );
    }

    (features, labels)
}
