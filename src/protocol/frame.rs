use spacestore_error::WireError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Максимальная длина кадра (16 MiB).
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Длина префикса кадра.
pub const FRAME_PREFIX_LEN: usize = 4;

/// Проверяет длину кадра: допустим диапазон `(0, MAX_FRAME_LEN]`.
pub fn check_frame_len(length: u32) -> Result<usize, WireError> {
    if length == 0 || length > MAX_FRAME_LEN {
        return Err(WireError::FrameLengthInvalid { length });
    }
    Ok(length as usize)
}

/// Читает один кадр в `buf`, переиспользуя его ёмкость.
///
/// `read_exact` дочитывает короткие чтения сам. EOF до начала кадра
/// возвращается как `WireError::Io` с `UnexpectedEof`.
pub async fn read_frame_into<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; FRAME_PREFIX_LEN];
    reader.read_exact(&mut prefix).await?;
    let len = check_frame_len(u32::from_be_bytes(prefix))?;

    buf.clear();
    buf.resize(len, 0);
    reader.read_exact(buf).await?;
    Ok(())
}

/// Пишет `body` как один кадр.
pub async fn write_frame<W>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len()).map_err(|_| WireError::FrameLengthInvalid {
        length: u32::MAX,
    })?;
    check_frame_len(len)?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    Ok(())
}

/// Резервирует место под префикс кадра и возвращает его смещение.
pub(crate) fn begin_frame(buf: &mut Vec<u8>) -> usize {
    let at = buf.len();
    buf.extend_from_slice(&[0u8; FRAME_PREFIX_LEN]);
    at
}

/// Записывает длину кадра, начатого [`begin_frame`].
pub(crate) fn finish_frame(
    buf: &mut [u8],
    at: usize,
) -> Result<(), WireError> {
    let body_len = buf.len() - at - FRAME_PREFIX_LEN;
    let len = u32::try_from(body_len).map_err(|_| WireError::FrameLengthInvalid {
        length: u32::MAX,
    })?;
    check_frame_len(len)?;
    buf[at..at + FRAME_PREFIX_LEN].copy_from_slice(&len.to_be_bytes());
    Ok(())
}
