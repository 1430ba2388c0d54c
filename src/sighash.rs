//! 入力ごとの署名用プリイメージ (レガシー SIGHASH_ALL) とダイジェスト
//!
//! N 個の入力を持つトランザクションでは N 個のプリイメージを作る。署名する入力の
//! script_sig だけを使用済み出力のスクリプトに置き換え、他の入力は空スクリプトにする。

use bitcoin::hashes::{Hash, sha256d};
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{PublicKey, Script, ScriptBuf, Transaction, TxOut};

use crate::encode::{legacy_transaction, serialize_legacy};
use crate::error::AppError;
use crate::types::UnspentOutput;

/// プリイメージ末尾に付ける 4 バイトの署名ハッシュタイプ
pub const SIGHASH_ALL: u32 = 0x0000_0001;
/// script_sig 内の署名の後ろに付ける 1 バイトの署名ハッシュタイプ
pub const SIGHASH_ALL_BYTE: u8 = 0x01;

/// 1 バイトの長さで直接 push できる上限 (OP_PUSHBYTES_75)
const MAX_DIRECT_PUSH: usize = 0x4B;

/// `signing_index` の入力に署名するためのトランザクションビュー
pub fn signing_view(
    inputs: &[UnspentOutput],
    spent_script: &Script,
    outputs: &[TxOut],
    signing_index: usize,
) -> Result<Transaction, AppError> {
    if signing_index >= inputs.len() {
        return Err(AppError::AssemblyFailed(format!(
            "入力インデックス {} が範囲外です (入力数 {})",
            signing_index,
            inputs.len()
        )));
    }

    let tx_inputs = inputs
        .iter()
        .enumerate()
        .map(|(k, utxo)| {
            if k == signing_index {
                utxo.to_tx_in(spent_script.to_owned())
            } else {
                utxo.to_tx_in(ScriptBuf::new())
            }
        })
        .collect();
    Ok(legacy_transaction(tx_inputs, outputs.to_vec()))
}

/// 署名用ビューをシリアライズし、SIGHASH_ALL を付けたプリイメージを返す。
pub fn build_preimage(
    inputs: &[UnspentOutput],
    spent_script: &Script,
    outputs: &[TxOut],
    signing_index: usize,
) -> Result<Vec<u8>, AppError> {
    let view = signing_view(inputs, spent_script, outputs, signing_index)?;
    let mut preimage = serialize_legacy(&view)?;
    preimage.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
    Ok(preimage)
}

/// SHA256(SHA256(preimage))
pub fn digest(preimage: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(preimage).to_byte_array()
}

/// push(signature || 0x01) || push(public_key)
pub fn make_script_sig(der_signature: &[u8], public_key: &[u8]) -> Result<ScriptBuf, AppError> {
    let mut signature = Vec::with_capacity(der_signature.len() + 1);
    signature.extend_from_slice(der_signature);
    signature.push(SIGHASH_ALL_BYTE);
    if signature.len() > MAX_DIRECT_PUSH || public_key.len() > MAX_DIRECT_PUSH {
        return Err(AppError::AssemblyFailed(format!(
            "署名 ({} bytes) または公開鍵 ({} bytes) が長すぎます",
            signature.len(),
            public_key.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key)
        .map_err(|e| AppError::AssemblyFailed(format!("公開鍵が不正です: {}", e)))?;
    let signature = PushBytesBuf::try_from(signature)
        .map_err(|_| AppError::AssemblyFailed("署名のPushBytes変換失敗".to_string()))?;
    Ok(Builder::new().push_slice(signature).push_key(&public_key).into_script())
}
