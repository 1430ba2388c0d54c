//! レガシー P2PKH トランザクションを構築し、秘密鍵を外に出さない署名オラクルで署名する。
//!
//! 未使用出力の取得 ([`utxo`])、おつりとダストの計画 ([`planner`])、入力ごとの
//! 署名用プリイメージ ([`sighash`])、署名とワイヤフォーマットへの組み立て
//! ([`transaction`]) を [`engine::build_payment`] がまとめて実行する。

pub mod address;
pub mod audit;
pub mod encode;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod planner;
pub mod sighash;
pub mod transaction;
pub mod types;
pub mod utxo;

pub use engine::{BuiltPayment, PaymentRequest, build_payment};
pub use error::{AppError, OracleError};
pub use oracle::{SignResponse, SigningOracle, SoftwareOracle};
pub use transaction::{BuildStage, SignedTransaction, TransactionAssembler};
pub use types::{KeyId, KeySlot, KeyUsage, PaymentPlan, UnspentOutput};
pub use utxo::{BlockchainInfo, LedgerSource, StaticLedger, UnspentOutputSet};
