//! セキュアクッキー：encrypt-then-MACによる不透明なクッキー値
//!
//! 値の構造は `base64(IV ∥ ストリーム暗号文) | base64(HMAC)`。
//! 暗号鍵と署名鍵は同じシークレットから異なるソルトで導出され、互いに独立。
//! 復号側は失敗理由を区別せず「存在しない」として扱う。

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes256;
use ctr::Ctr128BE;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha512;

use crate::common::cookie::Cookie;
use crate::context::Context;
use crate::error::Error;

type Aes256Ctr = Ctr128BE<Aes256>;
type HmacSha512 = Hmac<Sha512>;

const PBKDF2_ITERATIONS: u32 = 64_000;
const KEY_SIZE: usize = 32;
const BLOCK_SIZE: usize = 16;

const ENCRYPTION_SALT: &str = "encryption key salt";
const SIGNATURE_SALT: &str = "signature key salt";

/// シークレットから導出された鍵ペア。シークレットが空なら両方とも空
#[derive(Debug, Default)]
pub(crate) struct SecureKeys {
    pub enc: Vec<u8>,
    pub sign: Vec<u8>,
}

impl SecureKeys {
    pub fn is_empty(&self) -> bool {
        self.enc.is_empty() || self.sign.is_empty()
    }
}

/// シークレットから暗号鍵と署名鍵を導出する
pub(crate) fn derive_keys(secret: &str) -> SecureKeys {
    if secret.is_empty() {
        return SecureKeys::default();
    }
    SecureKeys {
        enc: gen_key(secret, ENCRYPTION_SALT),
        sign: gen_key(secret, SIGNATURE_SALT),
    }
}

fn gen_key(password: &str, salt: &str) -> Vec<u8> {
    let mut key = vec![0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha512>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut key,
    );
    key
}

/// 平文をIV ∥ AES-256-CTRストリーム暗号文へ変換する
fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; BLOCK_SIZE + plaintext.len()];
    rand::thread_rng().fill_bytes(&mut out[..BLOCK_SIZE]);
    let mut cipher =
        Aes256Ctr::new_from_slices(key, &out[..BLOCK_SIZE]).map_err(|_| Error::InvalidKey)?;
    out[BLOCK_SIZE..].copy_from_slice(plaintext);
    cipher.apply_keystream(&mut out[BLOCK_SIZE..]);
    Ok(out)
}

/// IV ∥ 暗号文から平文を復元する
fn decrypt(ciphertext: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    if ciphertext.len() <= BLOCK_SIZE {
        return None;
    }
    let mut cipher = Aes256Ctr::new_from_slices(key, &ciphertext[..BLOCK_SIZE]).ok()?;
    let mut plaintext = ciphertext[BLOCK_SIZE..].to_vec();
    cipher.apply_keystream(&mut plaintext);
    Some(plaintext)
}

/// 暗号文全体へのHMAC-SHA-512
fn sign(data: &[u8], key: &[u8]) -> Option<Vec<u8>> {
    let mut mac = HmacSha512::new_from_slice(key).ok()?;
    mac.update(data);
    Some(mac.finalize().into_bytes().to_vec())
}

/// MACを定数時間で検証する
fn verify(data: &[u8], key: &[u8], sig: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha512::new_from_slice(key) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(sig).is_ok()
}

impl<'a> Context<'a> {
    /// 値を暗号化・署名してクッキーに保存する
    ///
    /// ageは秒。0は無期限（遠い未来の有効期限）として扱う。
    pub fn set_secure_cookie(&mut self, name: &str, value: &str, age: i64) -> Result<(), Error> {
        if self.server.config.cookie_secret.is_empty() {
            return Err(Error::MissingCookieSecret);
        }
        let keys = self.server.secure_keys();
        if keys.is_empty() {
            return Err(Error::InvalidKey);
        }
        let ciphertext = encrypt(value.as_bytes(), &keys.enc)?;
        let sig = sign(&ciphertext, &keys.sign).ok_or(Error::InvalidKey)?;
        let data = format!("{}|{}", base64::encode(&ciphertext), base64::encode(&sig));
        self.set_cookie(Cookie::with_age(name, data, age));
        Ok(())
    }

    /// クッキーを検証・復号して平文を返す
    ///
    /// 形式不正・MAC不一致・復号失敗はいずれも区別なくNone。
    pub fn get_secure_cookie(&self, name: &str) -> Option<String> {
        let raw = self.request.cookie(name)?;
        let (cipher_b64, sig_b64) = raw.split_once('|')?;
        let ciphertext = base64::decode(cipher_b64).ok()?;
        let sig = base64::decode(sig_b64).ok()?;
        let keys = self.server.secure_keys();
        if keys.is_empty() {
            return None;
        }
        if !verify(&ciphertext, &keys.sign, &sig) {
            return None;
        }
        let plaintext = decrypt(&ciphertext, &keys.enc)?;
        String::from_utf8(plaintext).ok()
    }
}
