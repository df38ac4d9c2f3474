#![no_main]

use libfuzzer_sys::fuzz_target;
use spacestore::codec::{decode_prefix, Value};

fuzz_target!(|data: &[u8]| {
    // Декодер не должен паниковать ни на каких данных.
    let Ok((value, consumed)) = decode_prefix(data) else {
        return;
    };
    assert!(consumed <= data.len());
    // Размер в хранилище считается по числу прочитанных байт.
    assert_eq!(consumed, value.encoded_size());

    // Всё, что декодировалось, кодируется обратно в тот же размер.
    if let Ok(bytes) = value.encode() {
        assert_eq!(bytes.len(), value.encoded_size());
        let again = spacestore::codec::decode(&bytes).expect("re-decode failed");
        assert!(same_shape(&again, &value));
    }
});

/// NaN не равен сам себе, поэтому сравниваем структуру, а не значения.
fn same_shape(
    a: &Value,
    b: &Value,
) -> bool {
    match (a, b) {
        (Value::Float32(x), Value::Float32(y)) => x.to_bits() == y.to_bits(),
        (Value::Float64(x), Value::Float64(y)) => x.to_bits() == y.to_bits(),
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_shape(a, b))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y)
                    .all(|((ka, a), (kb, b))| ka == kb && same_shape(a, b))
        }
        _ => a == b,
    }
}
