//! レガシートランザクションのワイヤフォーマット
//!
//! バイト列への変換は `bitcoin::consensus` に任せる。ここで扱うのは入力数の上限と、
//! 長すぎるスクリプトの警告だけ。

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{self, VarInt};
use bitcoin::transaction::Version;
use bitcoin::{Script, Transaction, TxIn, TxOut};

use crate::error::AppError;
use crate::types::MAX_INPUTS;

/// この値以上の長さは compact-size で 1 バイトに収まらない
pub const COMPACT_SIZE_U16_MARKER: u8 = 0xFD;

/// `n` を compact-size (1/3/5/9 バイト) でエンコードする。
pub fn compact_size(n: u64) -> Vec<u8> {
    encode::serialize(&VarInt(n))
}

/// スクリプト長を確認する。`0xFD` 以上は警告のみで処理を続ける。
pub fn check_script_length(script: &Script) -> Result<(), AppError> {
    let len = script.len();
    u64::try_from(len).map_err(|_| AppError::ScriptTooLong { len })?;
    if len >= COMPACT_SIZE_U16_MARKER as usize {
        log::warn!("スクリプトが異常に長いです ({} bytes)", len);
    }
    Ok(())
}

/// version 1、ロックタイム 0 のトランザクション
pub fn legacy_transaction(input: Vec<TxIn>, output: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::ONE,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

/// version(4) ‖ 入力数 ‖ 入力 ‖ 出力数 ‖ 出力 ‖ lock_time(4) の順でシリアライズする。
pub fn serialize_legacy(tx: &Transaction) -> Result<Vec<u8>, AppError> {
    if tx.input.len() >= MAX_INPUTS {
        return Err(AppError::TooManyInputs { count: tx.input.len() });
    }
    // 入力 0 件はセグウィット形式と区別できない
    if tx.input.is_empty() {
        return Err(AppError::AssemblyFailed("入力が 1 件もありません".to_string()));
    }
    for input in &tx.input {
        check_script_length(&input.script_sig)?;
    }
    for output in &tx.output {
        check_script_length(&output.script_pubkey)?;
    }
    Ok(encode::serialize(tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::{Amount, ScriptBuf};

    use crate::types::UnspentOutput;

    #[test]
    fn compact_size_single_byte_below_marker() {
        assert_eq!(compact_size(0), vec![0x00]);
        assert_eq!(compact_size(252), vec![0xFC]);
    }

    #[test]
    fn compact_size_uses_smallest_field() {
        assert_eq!(compact_size(253), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(compact_size(0xFFFF), vec![0xFD, 0xFF, 0xFF]);
        assert_eq!(compact_size(0x10000), vec![0xFE, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(compact_size(0xFFFF_FFFF), vec![0xFE, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            compact_size(0x1_0000_0000),
            vec![0xFF, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn long_script_is_not_fatal() {
        let script = ScriptBuf::from_bytes(vec![0x51; 300]);
        assert!(check_script_length(&script).is_ok());

        let utxo = UnspentOutput { tx_hash: [0x11; 32], output_index: 0, value_satoshi: 1 };
        let tx = legacy_transaction(
            vec![utxo.to_tx_in(ScriptBuf::new())],
            vec![TxOut { value: Amount::from_sat(1), script_pubkey: script }],
        );
        let bytes = serialize_legacy(&tx).unwrap();
        // value(8) の直後に 0xFD マーカー付きの長さが続く
        let at = 4 + 1 + 32 + 4 + 1 + 4 + 1 + 8;
        assert_eq!(&bytes[at..at + 3], &[0xFD, 0x2C, 0x01]);
    }

    #[test]
    fn serializes_single_input_single_output() {
        let utxo = UnspentOutput::from_stored_hex(&"11".repeat(32), 1, 5000).unwrap();
        let tx = legacy_transaction(
            vec![utxo.to_tx_in(ScriptBuf::new())],
            vec![TxOut { value: Amount::from_sat(1000), script_pubkey: ScriptBuf::from_bytes(vec![0x51]) }],
        );
        let bytes = serialize_legacy(&tx).unwrap();
        let expected = format!(
            "01000000{}{}{}{}{}{}",
            "01",
            "11".repeat(32),
            "01000000",
            "00ffffffff",
            "01e803000000000000",
            "015100000000"
        );
        assert_eq!(hex::encode(bytes), expected);
    }

    #[test]
    fn too_many_inputs_are_rejected() {
        let utxo = UnspentOutput::from_stored_hex(&"22".repeat(32), 0, 1).unwrap();
        let tx = legacy_transaction(vec![utxo.to_tx_in(ScriptBuf::new()); MAX_INPUTS], Vec::new());
        assert!(matches!(serialize_legacy(&tx), Err(AppError::TooManyInputs { count: 253 })));
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let tx = legacy_transaction(Vec::new(), Vec::new());
        assert!(matches!(serialize_legacy(&tx), Err(AppError::AssemblyFailed(_))));
    }
}
