use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::Hash as _;
use bitcoin::{OutPoint, ScriptBuf, Sequence, TxIn, Txid, Witness};

use crate::error::AppError;

/// 1 バイトの入力数フィールドで表現できる上限 (この値以上は扱わない)
pub const MAX_INPUTS: usize = 0xFD;

/// 外部の台帳から取得した未使用出力
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    /// 台帳が返したバイト順のままのハッシュ (ワイヤに書く順序)
    pub tx_hash: [u8; 32],
    pub output_index: u32,
    pub value_satoshi: u64,
}

impl UnspentOutput {
    /// ワイヤ順 (内部バイト順) の16進数ハッシュから作る。
    pub fn from_stored_hex(tx_hash_hex: &str, output_index: u32, value_satoshi: u64) -> Result<Self, AppError> {
        Ok(Self {
            tx_hash: decode_hash(tx_hash_hex)?,
            output_index,
            value_satoshi,
        })
    }

    /// 表示用 (ビッグエンディアン) のTXIDから作る。バイト順を反転して保持する。
    pub fn from_txid_hex(txid_hex: &str, output_index: u32, value_satoshi: u64) -> Result<Self, AppError> {
        let txid = Txid::from_str(txid_hex)
            .map_err(|e| AppError::InputValidation(format!("無効なTXID形式 ({}): {}", txid_hex, e)))?;
        Ok(Self {
            tx_hash: txid.to_byte_array(),
            output_index,
            value_satoshi,
        })
    }

    pub fn out_point(&self) -> OutPoint {
        OutPoint::new(Txid::from_byte_array(self.tx_hash), self.output_index)
    }

    /// この出力を使う入力。シーケンスは常に `0xFFFFFFFF`。
    pub fn to_tx_in(&self, script_sig: ScriptBuf) -> TxIn {
        TxIn {
            previous_output: self.out_point(),
            script_sig,
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }
    }

    /// 表示用のTXID (ビッグエンディアン16進数)
    pub fn txid(&self) -> String {
        self.out_point().txid.to_string()
    }
}

fn decode_hash(s: &str) -> Result<[u8; 32], AppError> {
    let bytes = hex::decode(s)
        .map_err(|e| AppError::InputValidation(format!("無効なトランザクションハッシュ ({}): {}", s, e)))?;
    bytes
        .try_into()
        .map_err(|_| AppError::InputValidation(format!("トランザクションハッシュは32バイトである必要があります: {}", s)))
}

/// 鍵スロット番号 (1..=253)
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(u8);

impl KeyId {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 253;

    pub fn new(id: u32) -> Result<Self, AppError> {
        match u8::try_from(id) {
            Ok(id) if (Self::MIN..=Self::MAX).contains(&id) => Ok(KeyId(id)),
            _ => Err(AppError::InputValidation(format!(
                "鍵スロット番号は {}..={} の範囲で指定してください: {}",
                Self::MIN,
                Self::MAX,
                id
            ))),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 署名オラクル上の鍵スロット情報。カウンタはオラクルが更新し、こちらは読むだけ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySlot {
    pub id: KeyId,
    pub public_key: Vec<u8>,
    pub global_counter: u32,
    pub counter: u32,
}

/// 署名後にオラクルが返した使用カウンタ
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyUsage {
    pub key_id: KeyId,
    pub global_counter: u32,
    pub counter: u32,
}

/// 金額・手数料・おつりの計画
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PaymentPlan {
    pub amount: u64,
    pub fee: u64,
    pub change: u64,
    pub change_present: bool,
}
