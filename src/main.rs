use std::fs::File;
use std::io::Write;
use bitcoin::Network;
use clap::Parser;

mod cli;
mod config;

use cli::{CliArgs, parse_network};
use config::InputConfig;
use p2pkh_oracle_signer::address::public_key_to_address;
use p2pkh_oracle_signer::audit::AuditLog;
use p2pkh_oracle_signer::{
    AppError, BlockchainInfo, BuiltPayment, KeyId, LedgerSource, PaymentRequest, SoftwareOracle, StaticLedger,
    build_payment,
};

fn main() -> Result<(), AppError> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("アプリケーションを開始します。引数: {:?}", args);

    let network = parse_network(&args.network)?;
    log::info!("指定されたネットワーク: {:?}", network);

    let config = InputConfig::load(&args.input_file)?;
    log::debug!("入力設定ファイルのパース成功: 送金先={}, 金額={}, 手数料={}", config.target_address, config.amount_sats, config.fee_sats);

    let key_id = KeyId::new(config.key_id)?;
    let mut oracle = SoftwareOracle::new();
    let slot = oracle.load_wif(key_id, &config.signer_wif, network)?;
    log::info!("鍵スロット {}: global_counter={}, counter={}", slot.id, slot.global_counter, slot.counter);

    let source_address = config
        .source_address
        .clone()
        .unwrap_or_else(|| public_key_to_address(&slot.public_key, network));
    log::info!("送金元アドレス: {}", source_address);

    let ledger: Box<dyn LedgerSource> = match config.unspent_outputs()? {
        Some(outputs) => {
            log::info!("入力ファイルの未使用出力 {} 件を使用します。", outputs.len());
            Box::new(StaticLedger::new().with_outputs(&source_address, outputs))
        }
        None => Box::new(BlockchainInfo::new(&args.ledger_url)?),
    };
    match ledger.balance(&source_address) {
        Ok(balance) => log::info!("台帳上の残高: {} sats", balance),
        Err(e) => log::warn!("台帳から残高を取得できませんでした: {}", e),
    }

    let mut audit = AuditLog::new();
    let result = build_with_dust_retry(
        &args,
        &config,
        ledger.as_ref(),
        &mut oracle,
        &source_address,
        &slot.public_key,
        key_id,
        network,
        &mut audit,
    );

    if let Some(path) = &args.audit_log {
        audit.write_to(path).map_err(|e| {
            log::error!("構築記録の書き込みに失敗しました: {:?}", path);
            AppError::Io(e)
        })?;
        log::info!("構築記録を {:?} に保存しました。", path);
    }

    let built = result?;
    let serialized_tx = built.transaction.to_hex();
    log::info!("Raw transaction hex: {}", serialized_tx);
    log::info!(
        "txid: {}, おつり: {} sats, 鍵スロット {} global_counter={}, counter={}",
        built.transaction.txid(),
        built.plan.change,
        built.transaction.key_usage.key_id,
        built.transaction.key_usage.global_counter,
        built.transaction.key_usage.counter
    );

    println!("{}", serialized_tx);

    let mut output_file = File::create(&args.output_file).map_err(|e| {
        log::error!("出力ファイルの作成に失敗しました: {:?}", args.output_file);
        AppError::Io(e)
    })?;
    output_file.write_all(serialized_tx.as_bytes()).map_err(|e| {
        log::error!("出力ファイルへの書き込みに失敗しました。");
        AppError::Io(e)
    })?;
    log::info!("Raw transactionを {:?} に保存しました。", args.output_file);

    log::info!("処理が正常に完了しました。");
    Ok(())
}

/// おつりがダスト値を下回った場合、`--accept-dust-fee` 指定時のみ提案された手数料で最初から構築し直す。
#[allow(clippy::too_many_arguments)]
fn build_with_dust_retry(
    args: &CliArgs,
    config: &InputConfig,
    ledger: &dyn LedgerSource,
    oracle: &mut SoftwareOracle,
    source_address: &str,
    public_key: &[u8],
    key_id: KeyId,
    network: Network,
    audit: &mut AuditLog,
) -> Result<BuiltPayment, AppError> {
    let mut request = PaymentRequest {
        source_address,
        target_address: &config.target_address,
        public_key,
        key_id,
        amount: config.amount_sats,
        fee: config.fee_sats,
        network,
    };

    match build_payment(ledger, oracle, &request, audit) {
        Err(AppError::ChangeBelowDust { change, suggested_fee }) if args.accept_dust_fee => {
            log::warn!("おつり {} sats を手数料に含め、手数料 {} sats で再構築します。", change, suggested_fee);
            audit.record(format!("Fees have been adjusted: {} -> {}", request.fee, suggested_fee));
            audit.blank();
            request.fee = suggested_fee;
            build_payment(ledger, oracle, &request, audit)
        }
        other => other,
    }
}
