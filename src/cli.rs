use clap::Parser;
use std::path::PathBuf;
use bitcoin::Network as BitcoinNetwork;
use p2pkh_oracle_signer::AppError;
use p2pkh_oracle_signer::utxo::DEFAULT_LEDGER_URL;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// 送金情報を記述したJSONファイルへのパス
    #[clap(short, long, value_parser)]
    pub input_file: PathBuf,

    /// 生成されたraw transaction hexを保存するファイルへのパス
    #[clap(short, long, value_parser)]
    pub output_file: PathBuf,

    /// 使用するネットワーク ("bitcoin", "testnet", "regtest")
    #[clap(short, long, value_parser, default_value = "bitcoin")]
    pub network: String,

    /// 構築過程の記録を保存するファイルへのパス
    #[clap(short, long, value_parser)]
    pub audit_log: Option<PathBuf>,

    /// 未使用出力を取得する台帳APIのベースURL (入力ファイルにutxosがない場合に使用)
    #[clap(long, value_parser, default_value = DEFAULT_LEDGER_URL)]
    pub ledger_url: String,

    /// おつりがダスト値を下回る場合、提案された手数料で1回だけ再構築する
    #[clap(long)]
    pub accept_dust_fee: bool,
}

pub fn parse_network(network_str: &str) -> Result<BitcoinNetwork, AppError> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(BitcoinNetwork::Bitcoin),
        "testnet" => Ok(BitcoinNetwork::Testnet),
        "regtest" => Ok(BitcoinNetwork::Regtest),
        s => Err(AppError::InputValidation(format!("無効なネットワークが指定されました: {}", s))),
    }
}
