use std::fs;
use std::path::Path;

use serde::Deserialize;
use p2pkh_oracle_signer::{AppError, UnspentOutput};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    pub target_address: String,
    pub amount_sats: u64,
    pub fee_sats: u64,
    pub key_id: u32,
    /// ソフトウェア鍵スロットに読み込む秘密鍵 (WIF)
    pub signer_wif: String,
    /// 省略時は鍵スロットの公開鍵から導出
    #[serde(default)]
    pub source_address: Option<String>,
    /// 指定された場合は台帳に問い合わせずこれを使う (オフライン)
    #[serde(default)]
    pub utxos: Option<Vec<UtxoInput>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UtxoInput {
    /// 表示用 (ビッグエンディアン) のTXID
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
}

impl InputConfig {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            log::error!("入力ファイルの読み込みに失敗しました: {:?}", path);
            AppError::Io(e)
        })?;
        serde_json::from_str(&content).map_err(|e| {
            log::error!("入力JSONのパースに失敗しました。");
            AppError::JsonParse {
                file_path: path.to_path_buf(),
                source: e,
            }
        })
    }

    pub fn unspent_outputs(&self) -> Result<Option<Vec<UnspentOutput>>, AppError> {
        self.utxos
            .as_ref()
            .map(|utxos| {
                utxos
                    .iter()
                    .map(|u| UnspentOutput::from_txid_hex(&u.txid, u.vout, u.value_sats))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offline_config() {
        let json = r#"{
            "targetAddress": "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm",
            "amountSats": 400,
            "feeSats": 50,
            "keyId": 1,
            "signerWif": "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn",
            "utxos": [
                { "txid": "e2fa2ae1e9a45b72ff180c2a41a06eea293e1a046426bbc363b0ff141cc6c738", "vout": 3, "valueSats": 1000 }
            ]
        }"#;
        let config: InputConfig = serde_json::from_str(json).unwrap();
        assert!(config.source_address.is_none());
        let outputs = config.unspent_outputs().unwrap().unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].tx_hash[0], 0x38);
        assert_eq!(outputs[0].value_satoshi, 1000);
    }

    #[test]
    fn missing_utxos_means_online() {
        let json = r#"{
            "targetAddress": "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm",
            "amountSats": 400,
            "feeSats": 50,
            "keyId": 1,
            "signerWif": "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn"
        }"#;
        let config: InputConfig = serde_json::from_str(json).unwrap();
        assert!(config.unspent_outputs().unwrap().is_none());
    }

    #[test]
    fn load_reports_json_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        match InputConfig::load(&path) {
            Err(AppError::JsonParse { file_path, .. }) => assert_eq!(file_path, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
