use rand::{distributions::Alphanumeric, Rng};
use spacestore_error::AuthError;

/// Обязательный префикс ключа API.
pub const API_KEY_PREFIX: &str = "fancyspaces_api_key";
/// Максимальная длина ключа.
pub const MAX_API_KEY_LEN: usize = 300;

/// Структурная проверка ключа до обращения к провайдеру:
/// префикс, ровно две точки, длина не больше [`MAX_API_KEY_LEN`].
pub fn check_api_key_format(key: &str) -> Result<(), AuthError> {
    if !key.starts_with(API_KEY_PREFIX) {
        return Err(AuthError::MalformedApiKey {
            reason: "missing prefix",
        });
    }
    if key.bytes().filter(|b| *b == b'.').count() != 2 {
        return Err(AuthError::MalformedApiKey {
            reason: "expected exactly two dots",
        });
    }
    if key.len() > MAX_API_KEY_LEN {
        return Err(AuthError::MalformedApiKey { reason: "too long" });
    }
    Ok(())
}

/// Выпускает новый ключ вида `prefix.<id>.<secret>`.
pub fn generate_api_key() -> String {
    let mut rng = rand::thread_rng();
    let id: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    let secret: String = rng
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("{API_KEY_PREFIX}.{id}.{secret}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_is_well_formed() {
        let key = generate_api_key();
        assert!(check_api_key_format(&key).is_ok());
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(check_api_key_format("other.a.b").is_err());
        assert!(check_api_key_format("fancyspaces_api_key.a").is_err());
        assert!(check_api_key_format("fancyspaces_api_key.a.b.c").is_err());

        let long = format!("{API_KEY_PREFIX}.a.{}", "x".repeat(MAX_API_KEY_LEN));
        assert_eq!(
            check_api_key_format(&long),
            Err(AuthError::MalformedApiKey { reason: "too long" })
        );
    }
}
