use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса ответа, передаваемые по сети (поле `status: u16`).
///
/// # Диапазоны:
/// - 1: Успех
/// - 1xxx: Ошибки клиента (запрос, учётные данные, права, отсутствующие
///   сущности)
/// - 2xxx: Ошибки сервера
///
/// Числовые значения являются частью протокола и не должны меняться.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
pub enum StatusCode {
    // === Успех ===
    Ok = 1,

    // === 1xxx: Ошибки клиента ===
    InvalidMessage = 1000,
    CommandNotFound = 1001,
    InvalidCredentials = 1002,
    BadRequest = 1003,
    Unauthorized = 1004,
    DatabaseNotFound = 1005,
    CollectionNotFound = 1006,
    CommandNotAllowed = 1007,
    NotFound = 1008,
    Forbidden = 1009,

    // === 2xxx: Ошибки сервера ===
    InternalServerError = 2000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Пытается получить вариант `StatusCode` из `u16`.
    ///
    /// Возвращает `None`, если значение не соответствует ни одному варианту.
    pub fn from_u16(v: u16) -> Option<Self> {
        Self::try_from(v).ok()
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Ошибка со стороны клиента (диапазон `1xxx`).
    pub fn is_client_error(&self) -> bool {
        (1000..=1999).contains(&self.code())
    }

    /// Ошибка сервера (диапазон `2xxx`).
    pub fn is_server_error(&self) -> bool {
        (2000..=2999).contains(&self.code())
    }

    /// Ошибка уровня авторизации: нет принципала, нет прав или неверные
    /// учётные данные.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::Forbidden | Self::InvalidCredentials
        )
    }

    /// Рекомендуемый уровень логирования для данного кода.
    ///
    /// `NotFound` для `Exists`/`GetTTL` является штатным ответом, поэтому
    /// он логируется на уровне `Trace`.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Ok | Self::NotFound => LogLevel::Trace,
            Self::DatabaseNotFound
            | Self::CollectionNotFound
            | Self::BadRequest
            | Self::CommandNotAllowed => LogLevel::Debug,
            Self::InvalidCredentials
            | Self::Unauthorized
            | Self::Forbidden
            | Self::CommandNotFound => LogLevel::Info,
            Self::InvalidMessage => LogLevel::Warn,
            Self::InternalServerError => LogLevel::Error,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u16 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что числовые значения совпадают с протокольными.
    #[test]
    fn test_wire_values_are_frozen() {
        assert_eq!(StatusCode::Ok.code(), 1);
        assert_eq!(StatusCode::InvalidMessage.code(), 1000);
        assert_eq!(StatusCode::CommandNotFound.code(), 1001);
        assert_eq!(StatusCode::InvalidCredentials.code(), 1002);
        assert_eq!(StatusCode::BadRequest.code(), 1003);
        assert_eq!(StatusCode::Unauthorized.code(), 1004);
        assert_eq!(StatusCode::DatabaseNotFound.code(), 1005);
        assert_eq!(StatusCode::CollectionNotFound.code(), 1006);
        assert_eq!(StatusCode::CommandNotAllowed.code(), 1007);
        assert_eq!(StatusCode::NotFound.code(), 1008);
        assert_eq!(StatusCode::Forbidden.code(), 1009);
        assert_eq!(StatusCode::InternalServerError.code(), 2000);
    }

    /// Тест проверяет разделение клиентских и серверных ошибок.
    #[test]
    fn test_client_vs_server() {
        assert!(StatusCode::BadRequest.is_client_error());
        assert!(StatusCode::Forbidden.is_client_error());
        assert!(!StatusCode::Ok.is_client_error());
        assert!(StatusCode::InternalServerError.is_server_error());
        assert!(!StatusCode::NotFound.is_server_error());
    }

    /// Тест проверяет конвертацию через `TryFrom<u16>` и `from_u16`.
    #[test]
    fn test_from_try_from_u16() {
        assert_eq!(StatusCode::try_from(1008).unwrap(), StatusCode::NotFound);
        assert!(StatusCode::from_u16(0).is_none());
        assert!(StatusCode::from_u16(1010).is_none());
        let n: u16 = StatusCode::Forbidden.into();
        assert_eq!(n, 1009);
    }

    #[test]
    fn test_log_level_mappings() {
        assert_eq!(StatusCode::NotFound.log_level(), LogLevel::Trace);
        assert_eq!(StatusCode::Forbidden.log_level(), LogLevel::Info);
        assert_eq!(
            StatusCode::InternalServerError.log_level(),
            LogLevel::Error
        );
    }

    #[test]
    fn test_is_auth_error() {
        assert!(StatusCode::Unauthorized.is_auth_error());
        assert!(StatusCode::InvalidCredentials.is_auth_error());
        assert!(!StatusCode::NotFound.is_auth_error());
    }

    /// Тест проверяет формат `Display`: строка должна содержать имя варианта и
    /// числовой код.
    #[test]
    fn test_display_contains_name_and_code() {
        let s = format!("{}", StatusCode::NotFound);
        assert!(s.contains("1008"), "Display must contain code, got: {s}");
        assert!(s.contains("NotFound"), "Display must contain name, got: {s}");
    }

    /// Тест проверяет, что с фичей `extras` статус сериализуется числом.
    #[cfg(feature = "serde_repr")]
    #[test]
    fn test_serde_uses_numeric_code() {
        assert_eq!(serde_json::to_string(&StatusCode::NotFound).unwrap(), "1008");
        let back: StatusCode = serde_json::from_str("2000").unwrap();
        assert_eq!(back, StatusCode::InternalServerError);
    }
}
