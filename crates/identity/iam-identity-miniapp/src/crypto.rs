//! AES-128-CBC decryption of the encrypted user data blob.

use crate::error::{MiniAppError, MiniAppResult};
use base64::{Engine, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use serde::Deserialize;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Signature block attached to every decrypted payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Watermark {
    pub appid: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// Decrypted profile or phone number payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedUserData {
    #[serde(default)]
    pub open_id: Option<String>,
    #[serde(default)]
    pub union_id: Option<String>,
    #[serde(default)]
    pub nick_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub watermark: Watermark,
}

fn decode(field: &'static str, value: &str) -> MiniAppResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|source| MiniAppError::InvalidEncoding { field, source })
}

/// Decrypt `encrypted_data` with the session key and check it was issued for `app_id`.
pub fn decrypt_user_data(
    app_id: &str,
    session_key: &str,
    encrypted_data: &str,
    iv: &str,
) -> MiniAppResult<DecryptedUserData> {
    let key = decode("session_key", session_key)?;
    let iv = decode("iv", iv)?;
    let ciphertext = decode("encrypted_data", encrypted_data)?;

    let plaintext = Aes128CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| MiniAppError::InvalidKeyLength)?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| MiniAppError::DecryptionFailed)?;

    let data: DecryptedUserData = serde_json::from_slice(&plaintext)?;
    if data.watermark.appid != app_id {
        return Err(MiniAppError::WatermarkMismatch {
            expected: app_id.to_string(),
            actual: data.watermark.appid,
        });
    }
    Ok(data)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cbc::cipher::BlockEncryptMut;
    use serde_json::json;

    pub(crate) const SESSION_KEY: [u8; 16] = *b"0123456789abcdef";
    pub(crate) const IV: [u8; 16] = *b"fedcba9876543210";

    /// Encrypt `value` the way the platform does, returning `(session_key, data, iv)`.
    pub(crate) fn encrypt(value: &serde_json::Value) -> (String, String, String) {
        let plaintext = serde_json::to_vec(value).unwrap();
        let ciphertext = cbc::Encryptor::<aes::Aes128>::new_from_slices(&SESSION_KEY, &IV)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);
        (
            STANDARD.encode(SESSION_KEY),
            STANDARD.encode(ciphertext),
            STANDARD.encode(IV),
        )
    }

    #[test]
    fn decrypts_profile() {
        let (key, data, iv) = encrypt(&json!({
            "openId": "o-123",
            "nickName": "Band",
            "avatarUrl": "https://img.example.com/a.png",
            "unionId": "u-456",
            "watermark": {"appid": "wx-app", "timestamp": 1477314187}
        }));

        let profile = decrypt_user_data("wx-app", &key, &data, &iv).unwrap();
        assert_eq!(profile.open_id.as_deref(), Some("o-123"));
        assert_eq!(profile.union_id.as_deref(), Some("u-456"));
        assert_eq!(profile.nick_name.as_deref(), Some("Band"));
        assert_eq!(profile.watermark.timestamp, 1477314187);
    }

    #[test]
    fn watermark_must_match_app() {
        let (key, data, iv) = encrypt(&json!({"watermark": {"appid": "wx-other"}}));
        let result = decrypt_user_data("wx-app", &key, &data, &iv);
        assert!(matches!(
            result,
            Err(MiniAppError::WatermarkMismatch { ref actual, .. }) if actual == "wx-other"
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let (_, data, iv) = encrypt(&json!({"watermark": {"appid": "wx-app"}}));
        let other_key = STANDARD.encode(*b"ffffffffffffffff");
        let result = decrypt_user_data("wx-app", &other_key, &data, &iv);
        assert!(result.is_err());
    }

    #[test]
    fn short_key_rejected() {
        let (_, data, iv) = encrypt(&json!({"watermark": {"appid": "wx-app"}}));
        let result = decrypt_user_data("wx-app", &STANDARD.encode(b"short"), &data, &iv);
        assert!(matches!(result, Err(MiniAppError::InvalidKeyLength)));
    }

    #[test]
    fn invalid_base64_names_field() {
        let (key, data, _) = encrypt(&json!({"watermark": {"appid": "wx-app"}}));
        let result = decrypt_user_data("wx-app", &key, &data, "%%%");
        assert!(matches!(
            result,
            Err(MiniAppError::InvalidEncoding { field: "iv", .. })
        ));
    }
}
