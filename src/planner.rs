//! 金額・手数料からおつりを計算し、出力を組み立てる

use bitcoin::{Amount, Network, TxOut};

use crate::address::address_to_script;
use crate::error::AppError;
use crate::types::PaymentPlan;

/// Bitcoin Coreのデフォルトダスト閾値 (P2PKH出力に対して)
pub const DUST_THRESHOLD_SATS: u64 = 546;

/// 残高・送金額・手数料からおつりを計算する。
///
/// おつりがダスト閾値未満 (0 を除く) の場合は、おつりを手数料に含めた額を
/// `suggested_fee` として返す。手数料の変更は呼び出し側が行う。
pub fn plan(balance: u64, amount: u64, fee: u64, dust_floor: u64) -> Result<PaymentPlan, AppError> {
    let required = amount
        .checked_add(fee)
        .ok_or_else(|| AppError::InputValidation(format!("金額と手数料の合計が大きすぎます: {} + {}", amount, fee)))?;
    if required > balance {
        return Err(AppError::InsufficientBalance { balance, required });
    }

    let change = balance - required;
    log::debug!("残高: {} sats, 送金額: {} sats, 手数料: {} sats, おつり: {} sats", balance, amount, fee, change);

    if change > 0 && change < dust_floor {
        log::warn!("おつり {} sats はダスト閾値 {} sats 未満です。", change, dust_floor);
        return Err(AppError::ChangeBelowDust {
            change,
            suggested_fee: fee + change,
        });
    }

    Ok(PaymentPlan {
        amount,
        fee,
        change,
        change_present: change != 0,
    })
}

/// 送金先への出力と、おつりがあれば送金元への出力を作る (この順序で固定)。
///
/// どちらのアドレスも `network` の P2PKH アドレスでなければならない。
pub fn build_outputs(
    plan: &PaymentPlan,
    target_address: &str,
    source_address: &str,
    network: Network,
) -> Result<Vec<TxOut>, AppError> {
    let mut outputs = vec![TxOut {
        value: Amount::from_sat(plan.amount),
        script_pubkey: address_to_script(target_address, network)?,
    }];
    log::debug!("受信者出力追加: address={}, value={}", target_address, plan.amount);

    if plan.change_present {
        outputs.push(TxOut {
            value: Amount::from_sat(plan.change),
            script_pubkey: address_to_script(source_address, network)?,
        });
        log::debug!("おつり出力追加: address={}, value={}", source_address, plan.change);
    }
    Ok(outputs)
}
