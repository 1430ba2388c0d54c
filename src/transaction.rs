use std::fmt;

use bitcoin::hashes::{Hash, sha256d};
use bitcoin::{Script, ScriptBuf, TxOut};

use crate::audit::AuditLog;
use crate::encode::{legacy_transaction, serialize_legacy};
use crate::error::AppError;
use crate::oracle::SigningOracle;
use crate::sighash::{build_preimage, digest, make_script_sig};
use crate::types::{KeyId, KeyUsage, UnspentOutput};

/// 1 回の構築の進行段階。どの段階で失敗しても `Aborted` になり、途中の署名は再利用しない。
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BuildStage {
    Planning,
    Signing(usize),
    Assembling,
    Done,
    Aborted,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Planning => write!(f, "planning"),
            BuildStage::Signing(i) => write!(f, "signing input {}", i),
            BuildStage::Assembling => write!(f, "assembling"),
            BuildStage::Done => write!(f, "done"),
            BuildStage::Aborted => write!(f, "aborted"),
        }
    }
}

/// ブロードキャスト可能な署名済みトランザクション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub bytes: Vec<u8>,
    pub input_count: usize,
    /// 最後の署名後にオラクルが返したカウンタ
    pub key_usage: KeyUsage,
}

impl SignedTransaction {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// 表示用TXID (SHA256d を反転した16進数)
    pub fn txid(&self) -> String {
        let mut hash = sha256d::Hash::hash(&self.bytes).to_byte_array();
        hash.reverse();
        hex::encode(hash)
    }
}

// 署名に必要な情報を一時的に保持するための構造体
struct SigningInfo {
    input_index: usize,
    digest: [u8; 32],
}

/// 入力ごとに署名オラクルを呼び出し、最終的なトランザクションを組み立てる。
pub struct TransactionAssembler<'a, O: SigningOracle + ?Sized> {
    oracle: &'a mut O,
    audit: &'a mut AuditLog,
    stage: BuildStage,
    key_usage: Option<KeyUsage>,
}

impl<'a, O: SigningOracle + ?Sized> TransactionAssembler<'a, O> {
    pub fn new(oracle: &'a mut O, audit: &'a mut AuditLog) -> Self {
        Self {
            oracle,
            audit,
            stage: BuildStage::Planning,
            key_usage: None,
        }
    }

    pub fn stage(&self) -> BuildStage {
        self.stage
    }

    /// オラクルが最後に返した使用カウンタ (中断された構築でも更新される)
    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.key_usage
    }

    pub fn audit(&mut self) -> &mut AuditLog {
        &mut *self.audit
    }

    /// 構築を中断する。以降この構築の途中状態は使われない。
    pub fn abort(&mut self, err: &AppError) {
        log::error!("トランザクション構築を中断しました (段階: {}): {}", self.stage, err);
        self.audit.record(format!("Error occurred: {}", err));
        self.stage = BuildStage::Aborted;
    }

    pub fn assemble(
        &mut self,
        inputs: &[UnspentOutput],
        outputs: &[TxOut],
        spent_script: &Script,
        public_key: &[u8],
        key_id: KeyId,
    ) -> Result<SignedTransaction, AppError> {
        match self.sign_and_assemble(inputs, outputs, spent_script, public_key, key_id) {
            Ok(signed) => {
                self.stage = BuildStage::Done;
                log::info!("署名済みトランザクションの生成に成功しました。txid={}", signed.txid());
                Ok(signed)
            }
            Err(e) => {
                self.abort(&e);
                Err(e)
            }
        }
    }

    fn sign_and_assemble(
        &mut self,
        inputs: &[UnspentOutput],
        outputs: &[TxOut],
        spent_script: &Script,
        public_key: &[u8],
        key_id: KeyId,
    ) -> Result<SignedTransaction, AppError> {
        if inputs.is_empty() || outputs.is_empty() {
            return Err(AppError::AssemblyFailed(format!(
                "入力 ({} 件) と出力 ({} 件) がそれぞれ 1 件以上必要です",
                inputs.len(),
                outputs.len()
            )));
        }

        log::info!("トランザクション署名処理を開始します。入力数: {}", inputs.len());

        // 1. 署名ハッシュ計算フェーズ
        let mut signing_infos = Vec::with_capacity(inputs.len());
        for input_index in 0..inputs.len() {
            let preimage = build_preimage(inputs, spent_script, outputs, input_index)?;
            let sighash = digest(&preimage);

            let utxo = &inputs[input_index];
            self.audit.record(format!("  Unsigned transaction for input {}:", input_index + 1));
            self.audit.record(format!("    TxOutHash: {}", hex::encode(utxo.tx_hash)));
            self.audit.record(format!("    TxOutIndex: {}", hex::encode(utxo.output_index.to_le_bytes())));
            self.audit.record(format!("  Transaction to sign prehash: {}", hex::encode(&preimage)));
            self.audit.record(format!("  Transaction to sign hash: {}", hex::encode(sighash)));
            log::debug!("入力 {} の署名ハッシュ: {}", input_index, hex::encode(sighash));

            signing_infos.push(SigningInfo { input_index, digest: sighash });
        }

        // 2. 署名生成フェーズ (オラクルへの呼び出しは 1 入力ずつ順番に)
        let mut script_sigs = Vec::with_capacity(inputs.len());
        for info in signing_infos {
            self.stage = BuildStage::Signing(info.input_index);
            let response = self
                .oracle
                .sign(key_id, &info.digest)
                .map_err(|source| AppError::SigningFailed { input_index: info.input_index, source })?;

            self.key_usage = Some(KeyUsage {
                key_id,
                global_counter: response.global_counter,
                counter: response.counter,
            });
            log::debug!(
                "入力 {} の署名完了 (global_counter={}, counter={})",
                info.input_index,
                response.global_counter,
                response.counter
            );
            self.audit.record(format!(
                "  Signature for standard transaction input {}: {}",
                info.input_index + 1,
                hex::encode(&response.signature)
            ));
            self.audit.blank();

            script_sigs.push(make_script_sig(&response.signature, public_key)?);
        }

        // 3. 実際の script_sig で再シリアライズ
        self.stage = BuildStage::Assembling;
        self.audit.record(format!("  Public key: {}", hex::encode(public_key)));
        let bytes = serialize_signed(inputs, &script_sigs, outputs)?;
        self.audit.record(format!("  Signed Transaction: {}", hex::encode(&bytes)));

        let key_usage = self
            .key_usage
            .ok_or_else(|| AppError::AssemblyFailed("署名カウンタが取得できませんでした".to_string()))?;
        Ok(SignedTransaction {
            bytes,
            input_count: inputs.len(),
            key_usage,
        })
    }
}

/// 入力ごとの script_sig を使って最終的なトランザクションをシリアライズする。
///
/// 同じ署名からは常に同じバイト列になる。
pub fn serialize_signed(inputs: &[UnspentOutput], script_sigs: &[ScriptBuf], outputs: &[TxOut]) -> Result<Vec<u8>, AppError> {
    if inputs.len() != script_sigs.len() {
        return Err(AppError::AssemblyFailed(format!(
            "署名数 ({}) が入力数 ({}) と一致しません",
            script_sigs.len(),
            inputs.len()
        )));
    }
    let tx_inputs = inputs
        .iter()
        .zip(script_sigs)
        .map(|(utxo, script_sig)| utxo.to_tx_in(script_sig.clone()))
        .collect();
    serialize_legacy(&legacy_transaction(tx_inputs, outputs.to_vec()))
}
