//! 送金 1 回分の構築: 未使用出力の取得 → 計画 → 入力ごとの署名 → 組み立て
//!
//! 画面などの状態は参照せず、必要な値はすべて `PaymentRequest` で受け取る。
//! 失敗した構築は最初からやり直す (途中の署名は再利用しない)。

use bitcoin::{Network, ScriptBuf, TxOut};

use crate::address::address_to_script;
use crate::audit::AuditLog;
use crate::error::AppError;
use crate::oracle::SigningOracle;
use crate::planner::{self, DUST_THRESHOLD_SATS};
use crate::transaction::{BuildStage, SignedTransaction, TransactionAssembler};
use crate::types::{KeyId, PaymentPlan};
use crate::utxo::{LedgerSource, UnspentOutputSet};

#[derive(Debug, Clone)]
pub struct PaymentRequest<'a> {
    pub source_address: &'a str,
    pub target_address: &'a str,
    pub public_key: &'a [u8],
    pub key_id: KeyId,
    pub amount: u64,
    pub fee: u64,
    /// 送金元・送金先アドレスのネットワーク
    pub network: Network,
}

#[derive(Debug, Clone)]
pub struct BuiltPayment {
    pub plan: PaymentPlan,
    pub transaction: SignedTransaction,
}

struct PreparedPayment {
    utxos: UnspentOutputSet,
    plan: PaymentPlan,
    outputs: Vec<TxOut>,
    spent_script: ScriptBuf,
}

pub fn build_payment<L, O>(
    ledger: &L,
    oracle: &mut O,
    request: &PaymentRequest<'_>,
    audit: &mut AuditLog,
) -> Result<BuiltPayment, AppError>
where
    L: LedgerSource + ?Sized,
    O: SigningOracle + ?Sized,
{
    let mut assembler = TransactionAssembler::new(oracle, audit);
    log::info!("トランザクション構築を開始します (段階: {})", assembler.stage());
    debug_assert_eq!(assembler.stage(), BuildStage::Planning);

    let prepared = match prepare(ledger, request, assembler.audit()) {
        Ok(prepared) => prepared,
        Err(e) => {
            assembler.abort(&e);
            return Err(e);
        }
    };

    let transaction = assembler.assemble(
        prepared.utxos.outputs(),
        &prepared.outputs,
        &prepared.spent_script,
        request.public_key,
        request.key_id,
    )?;
    Ok(BuiltPayment {
        plan: prepared.plan,
        transaction,
    })
}

fn prepare<L: LedgerSource + ?Sized>(
    ledger: &L,
    request: &PaymentRequest<'_>,
    audit: &mut AuditLog,
) -> Result<PreparedPayment, AppError> {
    address_to_script(request.target_address, request.network)?;
    let spent_script = address_to_script(request.source_address, request.network)?;

    let utxos = UnspentOutputSet::fetch(ledger, request.source_address)?;
    utxos.ensure_input_limit()?;

    audit.record(format!("Own address: {}", utxos.address()));
    audit.record(format!("Target address: {}", request.target_address));
    audit.blank();
    audit.record(format!("Balance: {}", utxos.total_balance()));
    audit.record(format!("Amount: {}", request.amount));
    audit.record(format!("Fee: {}", request.fee));

    let plan = planner::plan(utxos.total_balance(), request.amount, request.fee, DUST_THRESHOLD_SATS)?;
    audit.record(format!("Change: {}", plan.change));
    audit.blank();

    let outputs = planner::build_outputs(&plan, request.target_address, request.source_address, request.network)?;
    Ok(PreparedPayment {
        utxos,
        plan,
        outputs,
        spent_script,
    })
}
