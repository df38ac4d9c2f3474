use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Хеширует пароль: SHA-256, результат в нижнем регистре hex.
///
/// Схема фиксирована, хранимые хеши провайдера идентичности получены так
/// же.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Сравнивает кандидата с хранимым хешем за постоянное время.
pub fn verify_password(
    stored_hash: &str,
    candidate: &str,
) -> bool {
    let computed = hash_password(candidate);
    computed.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет известный вектор SHA-256.
    #[test]
    fn test_known_vector() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_and_verify_success() {
        let hash = hash_password("my_secret_password");
        assert!(verify_password(&hash, "my_secret_password"));
    }

    #[test]
    fn test_verify_password_failure() {
        let hash = hash_password("my_secret_password");
        assert!(!verify_password(&hash, "wrong_password"));
        assert!(!verify_password("short", "my_secret_password"));
    }

    /// Тест проверяет, что хранимый хеш в верхнем регистре не принимается.
    #[test]
    fn test_verify_is_case_sensitive() {
        let hash = hash_password("pw");
        assert!(verify_password(&hash, "pw"));
        assert!(!verify_password(&hash.to_uppercase(), "pw"));
        assert!(!verify_password("", "pw"));
    }
}
