//! 公開鍵 → P2PKHアドレス変換と Base58Check のデコード

use bitcoin::base58;
use bitcoin::hashes::{Hash, hash160};
use bitcoin::{Network, NetworkKind, PubkeyHash, ScriptBuf};

use crate::error::AppError;

/// メインネットの P2PKH バージョンバイト
pub const MAINNET_P2PKH_VERSION: u8 = 0x00;
/// テストネット系 (testnet/signet/regtest) の P2PKH バージョンバイト
pub const TESTNET_P2PKH_VERSION: u8 = 0x6F;

/// バージョンバイト + 20 バイトのハッシュ (チェックサムを除く)
const P2PKH_PAYLOAD_LEN: usize = 21;

pub fn version_byte(network: Network) -> u8 {
    if NetworkKind::from(network).is_mainnet() {
        MAINNET_P2PKH_VERSION
    } else {
        TESTNET_P2PKH_VERSION
    }
}

/// RIPEMD160(SHA256(public_key))
pub fn hash160(public_key: &[u8]) -> [u8; 20] {
    hash160::Hash::hash(public_key).to_byte_array()
}

/// 公開鍵から Base58Check エンコードされた P2PKH アドレスを作る。
pub fn public_key_to_address(public_key: &[u8], network: Network) -> String {
    let mut payload = Vec::with_capacity(P2PKH_PAYLOAD_LEN);
    payload.push(version_byte(network));
    payload.extend_from_slice(&hash160(public_key));
    base58::encode_check(&payload)
}

/// アドレスを Base58Check デコードし、埋め込まれた 20 バイトのハッシュを返す。
///
/// チェックサムが一致しないもの、長さが P2PKH と異なるもの、`network` の P2PKH
/// バージョンバイト以外 (P2SH や別ネットワーク) はすべて `InvalidAddress`。
pub fn address_to_pubkey_hash(address: &str, network: Network) -> Result<PubkeyHash, AppError> {
    let decoded = base58::decode_check(address)
        .map_err(|e| AppError::InvalidAddress(format!("{}: {}", address, e)))?;
    if decoded.len() != P2PKH_PAYLOAD_LEN {
        return Err(AppError::InvalidAddress(format!(
            "{}: ペイロード長が不正です ({} bytes)",
            address,
            decoded.len()
        )));
    }
    let expected = version_byte(network);
    if decoded[0] != expected {
        return Err(AppError::InvalidAddress(format!(
            "{}: {:?} の P2PKH アドレスではありません (バージョンバイト 0x{:02x}, 期待値 0x{:02x})",
            address, network, decoded[0], expected
        )));
    }

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&decoded[1..]);
    Ok(PubkeyHash::from_byte_array(hash))
}

/// OP_DUP OP_HASH160 <push 20> <hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn make_p2pkh_script(pubkey_hash: &PubkeyHash) -> ScriptBuf {
    ScriptBuf::new_p2pkh(pubkey_hash)
}

/// アドレス文字列から直接 P2PKH スクリプトを作る。
pub fn address_to_script(address: &str, network: Network) -> Result<ScriptBuf, AppError> {
    Ok(make_p2pkh_script(&address_to_pubkey_hash(address, network)?))
}
