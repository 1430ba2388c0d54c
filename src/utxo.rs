//! 送金元アドレスの未使用出力と、その取得元 (台帳)

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::types::{MAX_INPUTS, UnspentOutput};

/// 台帳への問い合わせのタイムアウト
pub const LEDGER_TIMEOUT: Duration = Duration::from_secs(10);
/// 一度に取得する未使用出力の上限
pub const MAX_FETCHED_OUTPUTS: usize = 50;
/// 0 なら未承認の出力も使う
pub const MIN_CONFIRMATIONS: u32 = 0;

pub const DEFAULT_LEDGER_URL: &str = "https://blockchain.info";

/// 未使用出力と残高を提供する外部データソース
pub trait LedgerSource {
    /// `address` の未使用出力を台帳が返した順序のまま返す。
    fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>, AppError>;

    fn balance(&self, address: &str) -> Result<u64, AppError>;
}

/// 1 つのアドレスの未使用出力。取得後は読み取り専用。
#[derive(Debug, Clone)]
pub struct UnspentOutputSet {
    address: String,
    outputs: Vec<UnspentOutput>,
    total: u64,
}

impl UnspentOutputSet {
    /// 台帳から未使用出力を取得する。
    ///
    /// 台帳側のエラーも、出力が 0 件の場合も `NoFundsOrInvalidAddress` になる。
    pub fn fetch<L: LedgerSource + ?Sized>(ledger: &L, address: &str) -> Result<Self, AppError> {
        log::info!("未使用出力を取得します: {}", address);
        let outputs = ledger.unspent_outputs(address).map_err(|e| {
            log::warn!("未使用出力の取得に失敗しました ({}): {}", address, e);
            AppError::NoFundsOrInvalidAddress { address: address.to_string() }
        })?;
        Self::from_outputs(address, outputs)
    }

    /// 出力が 0 件、または合計額が `u64` に収まらない場合は `NoFundsOrInvalidAddress`
    pub fn from_outputs(address: &str, outputs: Vec<UnspentOutput>) -> Result<Self, AppError> {
        if outputs.is_empty() {
            return Err(AppError::NoFundsOrInvalidAddress { address: address.to_string() });
        }
        let total = sum_values(&outputs).ok_or_else(|| {
            log::warn!("未使用出力の合計額がオーバーフローしました ({})", address);
            AppError::NoFundsOrInvalidAddress { address: address.to_string() }
        })?;
        let set = Self {
            address: address.to_string(),
            outputs,
            total,
        };
        log::debug!("未使用出力 {} 件, 合計 {} sats", set.count(), set.total_balance());
        Ok(set)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn total_balance(&self) -> u64 {
        self.total
    }

    pub fn count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_at(&self, i: usize) -> Option<&UnspentOutput> {
        self.outputs.get(i)
    }

    pub fn outputs(&self) -> &[UnspentOutput] {
        &self.outputs
    }

    /// 入力数が 1 バイトの compact-size で表せない場合は `TooManyInputs`
    pub fn ensure_input_limit(&self) -> Result<(), AppError> {
        if self.count() >= MAX_INPUTS {
            return Err(AppError::TooManyInputs { count: self.count() });
        }
        Ok(())
    }
}

fn sum_values(outputs: &[UnspentOutput]) -> Option<u64> {
    outputs.iter().try_fold(0u64, |acc, o| acc.checked_add(o.value_satoshi))
}

#[derive(Debug, Deserialize)]
struct UnspentResponse {
    unspent_outputs: Vec<UnspentEntry>,
}

#[derive(Debug, Deserialize)]
struct UnspentEntry {
    /// 内部バイト順のハッシュ
    tx_hash: String,
    tx_output_n: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RawAddrResponse {
    final_balance: u64,
}

impl UnspentResponse {
    fn into_outputs(self) -> Result<Vec<UnspentOutput>, AppError> {
        self.unspent_outputs
            .into_iter()
            .map(|e| UnspentOutput::from_stored_hex(&e.tx_hash, e.tx_output_n, e.value))
            .collect()
    }
}

/// blockchain.info の未使用出力 API のレスポンスを解析する。
pub fn parse_unspent_payload(payload: &str) -> Result<Vec<UnspentOutput>, AppError> {
    let response: UnspentResponse = serde_json::from_str(payload)
        .map_err(|e| AppError::Ledger(format!("不正なレスポンス: {}", e)))?;
    response.into_outputs()
}

/// blockchain.info の `/rawaddr` のレスポンスから残高を取り出す。
pub fn parse_balance_payload(payload: &str) -> Result<u64, AppError> {
    let response: RawAddrResponse = serde_json::from_str(payload)
        .map_err(|e| AppError::Ledger(format!("不正なレスポンス: {}", e)))?;
    Ok(response.final_balance)
}

/// blockchain.info 互換 API の台帳
pub struct BlockchainInfo {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl BlockchainInfo {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(LEDGER_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn unspent_url(&self, address: &str) -> String {
        format!(
            "{}/unspent?active={}&confirmations={}&limit={}",
            self.base_url, address, MIN_CONFIRMATIONS, MAX_FETCHED_OUTPUTS
        )
    }
}

impl LedgerSource for BlockchainInfo {
    fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>, AppError> {
        let url = self.unspent_url(address);
        log::debug!("GET {}", url);
        let body = self.client.get(&url).send()?.error_for_status()?.text()?;
        parse_unspent_payload(&body)
    }

    fn balance(&self, address: &str) -> Result<u64, AppError> {
        let url = format!("{}/rawaddr/{}", self.base_url, address);
        log::debug!("GET {}", url);
        let body = self.client.get(&url).send()?.error_for_status()?.text()?;
        parse_balance_payload(&body)
    }
}

/// 入力ファイルなどから与えられた未使用出力を返すオフライン台帳
#[derive(Debug, Default, Clone)]
pub struct StaticLedger {
    outputs: BTreeMap<String, Vec<UnspentOutput>>,
}

impl StaticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(mut self, address: &str, outputs: Vec<UnspentOutput>) -> Self {
        self.outputs.entry(address.to_string()).or_default().extend(outputs);
        self
    }
}

impl LedgerSource for StaticLedger {
    fn unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>, AppError> {
        self.outputs
            .get(address)
            .cloned()
            .ok_or_else(|| AppError::Ledger(format!("未知のアドレス: {}", address)))
    }

    fn balance(&self, address: &str) -> Result<u64, AppError> {
        sum_values(&self.unspent_outputs(address)?)
            .ok_or_else(|| AppError::Ledger(format!("残高がオーバーフローしました: {}", address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

    struct FailingLedger;

    impl LedgerSource for FailingLedger {
        fn unspent_outputs(&self, _address: &str) -> Result<Vec<UnspentOutput>, AppError> {
            Err(AppError::Ledger("connection refused".to_string()))
        }

        fn balance(&self, _address: &str) -> Result<u64, AppError> {
            Err(AppError::Ledger("connection refused".to_string()))
        }
    }

    fn utxo(byte: u8, index: u32, value: u64) -> UnspentOutput {
        UnspentOutput { tx_hash: [byte; 32], output_index: index, value_satoshi: value }
    }

    #[test]
    fn fetch_preserves_source_order_and_sums_balance() {
        let ledger = StaticLedger::new().with_outputs(ADDRESS, vec![utxo(3, 0, 700), utxo(1, 2, 300)]);
        let set = UnspentOutputSet::fetch(&ledger, ADDRESS).unwrap();
        assert_eq!(set.count(), 2);
        assert_eq!(set.total_balance(), 1000);
        assert_eq!(set.input_at(0), Some(&utxo(3, 0, 700)));
        assert_eq!(set.input_at(1), Some(&utxo(1, 2, 300)));
        assert_eq!(set.input_at(2), None);
        assert_eq!(ledger.balance(ADDRESS).unwrap(), 1000);
    }

    #[test]
    fn ledger_error_maps_to_no_funds() {
        let err = UnspentOutputSet::fetch(&FailingLedger, ADDRESS).unwrap_err();
        assert!(matches!(err, AppError::NoFundsOrInvalidAddress { .. }));
    }

    #[test]
    fn empty_result_maps_to_no_funds() {
        let ledger = StaticLedger::new().with_outputs(ADDRESS, Vec::new());
        let err = UnspentOutputSet::fetch(&ledger, ADDRESS).unwrap_err();
        assert!(matches!(err, AppError::NoFundsOrInvalidAddress { .. }));

        let err = UnspentOutputSet::fetch(&ledger, "1unknown").unwrap_err();
        assert!(matches!(err, AppError::NoFundsOrInvalidAddress { .. }));
    }

    #[test]
    fn overflowing_balance_maps_to_no_funds() {
        let err = UnspentOutputSet::from_outputs(ADDRESS, vec![utxo(1, 0, u64::MAX), utxo(2, 0, 1)]).unwrap_err();
        assert!(matches!(err, AppError::NoFundsOrInvalidAddress { .. }));

        let ledger = StaticLedger::new().with_outputs(ADDRESS, vec![utxo(1, 0, u64::MAX), utxo(2, 0, 1)]);
        assert!(matches!(ledger.balance(ADDRESS), Err(AppError::Ledger(_))));
        assert!(matches!(
            UnspentOutputSet::fetch(&ledger, ADDRESS),
            Err(AppError::NoFundsOrInvalidAddress { .. })
        ));
    }

    #[test]
    fn input_limit() {
        let set = UnspentOutputSet::from_outputs(ADDRESS, vec![utxo(9, 0, 1); 252]).unwrap();
        assert!(set.ensure_input_limit().is_ok());

        let set = UnspentOutputSet::from_outputs(ADDRESS, vec![utxo(9, 0, 1); 253]).unwrap();
        assert!(matches!(set.ensure_input_limit(), Err(AppError::TooManyInputs { count: 253 })));
    }

    #[test]
    fn parses_blockchain_info_payload() {
        let payload = r#"{
            "notice": "",
            "unspent_outputs": [
                {
                    "tx_hash_big_endian": "e2fa2ae1e9a45b72ff180c2a41a06eea293e1a046426bbc363b0ff141cc6c738",
                    "tx_hash": "38c7c61c14ffb063c3bb2664041a3e29ea6ea0412a0c18ff725ba4e9e12afae2",
                    "tx_output_n": 3,
                    "script": "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac",
                    "value": 15000,
                    "confirmations": 12
                }
            ]
        }"#;
        let outputs = parse_unspent_payload(payload).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].output_index, 3);
        assert_eq!(outputs[0].value_satoshi, 15000);
        assert_eq!(
            outputs[0].txid(),
            "e2fa2ae1e9a45b72ff180c2a41a06eea293e1a046426bbc363b0ff141cc6c738"
        );
    }

    #[test]
    fn malformed_payload_is_ledger_error() {
        assert!(matches!(parse_unspent_payload("<html>"), Err(AppError::Ledger(_))));
        assert!(matches!(
            parse_unspent_payload(r#"{"unspent_outputs":[{"tx_hash":"zz","tx_output_n":0,"value":1}]}"#),
            Err(AppError::InputValidation(_))
        ));
    }

    #[test]
    fn parses_rawaddr_balance() {
        let payload = r#"{
            "hash160": "751e76e8199196d454941c45d1b3a323f1433bd6",
            "address": "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH",
            "n_tx": 2,
            "total_received": 20000,
            "total_sent": 5000,
            "final_balance": 15000,
            "txs": []
        }"#;
        assert_eq!(parse_balance_payload(payload).unwrap(), 15000);
        assert!(matches!(parse_balance_payload("{}"), Err(AppError::Ledger(_))));
    }

    #[test]
    fn unspent_url_carries_restrictions() {
        let ledger = BlockchainInfo::new("https://blockchain.info/").unwrap();
        assert_eq!(
            ledger.unspent_url(ADDRESS),
            "https://blockchain.info/unspent?active=1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH&confirmations=0&limit=50"
        );
    }
}
