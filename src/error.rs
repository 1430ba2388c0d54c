use std::path::PathBuf;
use thiserror::Error;

/// 署名オラクル (セキュアエレメント) 側のエラー
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("鍵スロット {key_id} に鍵が存在しません")]
    UnknownKey { key_id: u8 },

    #[error("署名カウンタが上限に達しました (鍵スロット {key_id}, 上限 {limit})")]
    CounterExhausted { key_id: u8, limit: u32 },

    #[error("署名オラクルが応答しませんでした (タイムアウト)")]
    Timeout,

    #[error("デバイスエラー: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("入力検証エラー: {0}")]
    InputValidation(String),

    #[error("ネットワーク不整合: CLI指定 ({cli_network}) vs WIF/アドレス ({inferred_network})")]
    NetworkMismatch {
        cli_network: String,
        inferred_network: String,
    },

    #[error("無効なBitcoinアドレス: {0}")]
    InvalidAddress(String),

    #[error("台帳との通信エラー: {0}")]
    Ledger(String),

    #[error("無効なアドレス、または未使用出力がありません: {address}")]
    NoFundsOrInvalidAddress { address: String },

    #[error("入力が多すぎます ({count} 件) - 手数料が高くなりすぎる可能性があります")]
    TooManyInputs { count: usize },

    #[error("残高不足: 残高 {balance} sats, 要求額 {required} sats (手数料を含む)")]
    InsufficientBalance { balance: u64, required: u64 },

    #[error("おつり {change} sats がダスト値を下回ります。手数料を {suggested_fee} sats に調整してください")]
    ChangeBelowDust { change: u64, suggested_fee: u64 },

    #[error("スクリプトが長すぎます ({len} bytes)")]
    ScriptTooLong { len: usize },

    #[error("署名エラー (入力インデックス {input_index}): {source}")]
    SigningFailed {
        input_index: usize,
        #[source]
        source: OracleError,
    },

    #[error("トランザクション組み立てエラー: {0}")]
    AssemblyFailed(String),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Ledger(e.to_string())
    }
}
