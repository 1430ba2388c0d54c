//! 署名オラクル: 秘密鍵を外に出さずにダイジェストへ署名する外部エンティティ
//!
//! 本番ではセキュアエレメント (カード) がこの役割を担う。`SoftwareOracle` は
//! 開発・検証用に同じ振る舞い (スロット、使用カウンタ、DER署名) を再現する。

use std::collections::BTreeMap;

use bitcoin::secp256k1::{All, Message, Secp256k1, SecretKey};
use bitcoin::{Network, NetworkKind, PrivateKey, PublicKey};

use crate::error::{AppError, OracleError};
use crate::types::{KeyId, KeySlot};

/// 1 回の署名に対するオラクルの応答
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResponse {
    pub global_counter: u32,
    pub counter: u32,
    /// DERエンコードされたECDSA署名 (署名ハッシュタイプのバイトは含まない)
    pub signature: Vec<u8>,
}

pub trait SigningOracle {
    /// `digest` に鍵スロット `key_id` で署名する。呼び出しは 1 回ずつ順番に行われる。
    fn sign(&mut self, key_id: KeyId, digest: &[u8; 32]) -> Result<SignResponse, OracleError>;

    /// 鍵スロットの公開鍵と現在のカウンタ
    fn key_slot(&mut self, key_id: KeyId) -> Result<KeySlot, OracleError>;
}

impl<T: SigningOracle + ?Sized> SigningOracle for &mut T {
    fn sign(&mut self, key_id: KeyId, digest: &[u8; 32]) -> Result<SignResponse, OracleError> {
        (**self).sign(key_id, digest)
    }

    fn key_slot(&mut self, key_id: KeyId) -> Result<KeySlot, OracleError> {
        (**self).key_slot(key_id)
    }
}

struct SoftwareSlot {
    secret: SecretKey,
    public_key: PublicKey,
    counter: u32,
}

/// secp256k1 による鍵スロットのエミュレータ
pub struct SoftwareOracle {
    secp: Secp256k1<All>,
    slots: BTreeMap<KeyId, SoftwareSlot>,
    global_counter: u32,
    signature_limit: u32,
}

impl Default for SoftwareOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareOracle {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
            slots: BTreeMap::new(),
            global_counter: 0,
            signature_limit: u32::MAX,
        }
    }

    /// 全スロット合計の署名回数の上限を設定する。
    pub fn with_signature_limit(mut self, limit: u32) -> Self {
        self.signature_limit = limit;
        self
    }

    /// WIF形式の秘密鍵をスロットに読み込む。
    pub fn load_wif(&mut self, key_id: KeyId, wif: &str, network: Network) -> Result<KeySlot, AppError> {
        let private_key = PrivateKey::from_wif(wif)
            .map_err(|e| AppError::InputValidation(format!("秘密鍵(WIF)のデコード失敗: {}", e)))?;
        if private_key.network != NetworkKind::from(network) {
            return Err(AppError::NetworkMismatch {
                cli_network: format!("{:?}", network),
                inferred_network: format!("{:?}", private_key.network),
            });
        }

        let public_key = private_key.public_key(&self.secp);
        self.slots.insert(
            key_id,
            SoftwareSlot {
                secret: private_key.inner,
                public_key,
                counter: 0,
            },
        );
        log::info!("鍵スロット {} に鍵を読み込みました。", key_id);
        Ok(self.slot_info(key_id, &public_key, 0))
    }

    fn slot_info(&self, key_id: KeyId, public_key: &PublicKey, counter: u32) -> KeySlot {
        KeySlot {
            id: key_id,
            public_key: public_key.to_bytes(),
            global_counter: self.global_counter,
            counter,
        }
    }
}

impl SigningOracle for SoftwareOracle {
    fn sign(&mut self, key_id: KeyId, digest: &[u8; 32]) -> Result<SignResponse, OracleError> {
        if self.global_counter >= self.signature_limit {
            return Err(OracleError::CounterExhausted {
                key_id: key_id.get(),
                limit: self.signature_limit,
            });
        }
        let slot = self
            .slots
            .get_mut(&key_id)
            .ok_or(OracleError::UnknownKey { key_id: key_id.get() })?;

        let message = Message::from_digest(*digest);
        let signature = self.secp.sign_ecdsa(&message, &slot.secret);

        self.global_counter += 1;
        slot.counter += 1;
        Ok(SignResponse {
            global_counter: self.global_counter,
            counter: slot.counter,
            signature: signature.serialize_der().to_vec(),
        })
    }

    fn key_slot(&mut self, key_id: KeyId) -> Result<KeySlot, OracleError> {
        let slot = self
            .slots
            .get(&key_id)
            .ok_or(OracleError::UnknownKey { key_id: key_id.get() })?;
        Ok(self.slot_info(key_id, &slot.public_key, slot.counter))
    }
}
