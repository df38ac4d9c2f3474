use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки кодека значений.
///
/// Теги типов передаются как сырые `u8`, чтобы крейт ошибок не зависел от
/// определения `ValueKind`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Буфер короче минимальной длины для заявленного типа
    #[error("payload too short: need {needed} bytes, have {available}")]
    PayloadTooShort { needed: usize, available: usize },
    /// Тег типа не совпадает с ожидаемым или неизвестен
    #[error("invalid type: {}", describe_mismatch(.expected, .found))]
    InvalidType { expected: Option<u8>, found: u8 },
    /// Элементы списка или значения словаря разных типов
    #[error("mixed element kinds: declared {expected}, found {found}")]
    MixedKinds { expected: u8, found: u8 },
    /// Больше элементов, чем помещается в u16-счётчик
    #[error("too many elements: {count}")]
    TooManyElements { count: usize },
    /// Тело длиннее, чем помещается в u32-префикс
    #[error("body too large: {len} bytes")]
    BodyTooLarge { len: usize },
    /// Элементы контейнера заняли меньше байт, чем заявлено в заголовке
    #[error("container body has {unused} unused bytes")]
    BodyNotConsumed { unused: usize },
    /// Ключ словаря встречается повторно
    #[error("duplicate map key `{key}`")]
    DuplicateKey { key: String },
    /// Строка не является валидным UTF-8
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
    /// Превышена глубина вложенности списков и словарей
    #[error("nesting too deep: limit is {limit}")]
    NestingTooDeep { limit: usize },
    /// Ошибка преобразования записи в значение и обратно
    #[error("cannot map field `{field}`: {reason}")]
    Field { field: String, reason: String },
}

fn describe_mismatch(
    expected: &Option<u8>,
    found: &u8,
) -> String {
    match expected {
        Some(expected) => format!("expected kind {expected}, found {found}"),
        None => format!("unknown kind tag {found}"),
    }
}

impl CodecError {
    pub fn too_short(
        needed: usize,
        available: usize,
    ) -> Self {
        Self::PayloadTooShort { needed, available }
    }

    pub fn field(
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorExt for CodecError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BadRequest
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mismatch() {
        let known = CodecError::InvalidType {
            expected: Some(12),
            found: 4,
        };
        assert_eq!(known.to_string(), "invalid type: expected kind 12, found 4");

        let unknown = CodecError::InvalidType {
            expected: None,
            found: 99,
        };
        assert_eq!(unknown.to_string(), "invalid type: unknown kind tag 99");
    }

    #[test]
    fn test_codec_errors_are_bad_requests() {
        assert_eq!(
            CodecError::too_short(4, 1).status_code(),
            StatusCode::BadRequest
        );
        assert_eq!(CodecError::InvalidUtf8.status_code(), StatusCode::BadRequest);
        assert_eq!(
            CodecError::BodyNotConsumed { unused: 4 }.status_code(),
            StatusCode::BadRequest
        );
    }
}
