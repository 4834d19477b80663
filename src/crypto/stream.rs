//! Stream drivers
//!
//! Blocking and async I/O around [`Sealer`] and [`Opener`]. Both flavours
//! produce and accept identical bytes.

use std::io::{self, Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::buffer::RentedBuffer;
use crate::error::{Result, VaultError};

use super::cipher::{Opener, Sealer};
use super::{Cipher, HEADER_LEN, SEALED_CHUNK_LEN};

// =============================================================================
// Blocking
// =============================================================================

/// Encrypt `plaintext` and write the whole stream to `writer`
pub fn encrypt_write<W: Write>(mut writer: W, plaintext: &[u8], cipher: &Cipher) -> Result<()> {
    let mut sealer = Sealer::new(cipher, plaintext)?;
    writer.write_all(sealer.header())?;
    while let Some(chunk) = sealer.next_chunk()? {
        writer.write_all(chunk)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a stream from `reader` and append its plaintext to `out`
///
/// An empty stream yields no plaintext. Chunks are decrypted inside `out`,
/// so no second copy of the data is made.
pub fn decrypt_read<R: Read>(mut reader: R, cipher: &Cipher, out: &mut RentedBuffer<'_>) -> Result<()> {
    let mut header = [0u8; HEADER_LEN];
    let n = read_full(&mut reader, &mut header)?;
    if n == 0 {
        return Ok(());
    }
    if n < HEADER_LEN {
        return Err(truncated_header(n));
    }

    let mut opener = Opener::new(cipher, header);
    let mut carry: Option<u8> = None;

    loop {
        let region = &mut out.writable(SEALED_CHUNK_LEN)[..SEALED_CHUNK_LEN];
        let mut filled = 0;
        if let Some(byte) = carry.take() {
            region[0] = byte;
            filled = 1;
        }
        filled += read_full(&mut reader, &mut region[filled..])?;

        // A full chunk is only final if nothing follows it
        let last = if filled < SEALED_CHUNK_LEN {
            true
        } else {
            let mut peek = [0u8; 1];
            if read_full(&mut reader, &mut peek)? == 0 {
                true
            } else {
                carry = Some(peek[0]);
                false
            }
        };

        let plaintext_len = opener.open(&mut region[..filled], last)?;
        out.advance(plaintext_len);

        if last {
            return Ok(());
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// =============================================================================
// Async
// =============================================================================

/// Async twin of [`encrypt_write`]
pub async fn encrypt_write_async<W>(writer: &mut W, plaintext: &[u8], cipher: &Cipher) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sealer = Sealer::new(cipher, plaintext)?;
    writer.write_all(sealer.header()).await?;
    while let Some(chunk) = sealer.next_chunk()? {
        writer.write_all(chunk).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Async twin of [`decrypt_read`]
pub async fn decrypt_read_async<R>(reader: &mut R, cipher: &Cipher, out: &mut RentedBuffer<'_>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let n = read_full_async(reader, &mut header).await?;
    if n == 0 {
        return Ok(());
    }
    if n < HEADER_LEN {
        return Err(truncated_header(n));
    }

    let mut opener = Opener::new(cipher, header);
    let mut carry: Option<u8> = None;

    loop {
        let region = &mut out.writable(SEALED_CHUNK_LEN)[..SEALED_CHUNK_LEN];
        let mut filled = 0;
        if let Some(byte) = carry.take() {
            region[0] = byte;
            filled = 1;
        }
        filled += read_full_async(reader, &mut region[filled..]).await?;

        let last = if filled < SEALED_CHUNK_LEN {
            true
        } else {
            let mut peek = [0u8; 1];
            if read_full_async(reader, &mut peek).await? == 0 {
                true
            } else {
                carry = Some(peek[0]);
                false
            }
        };

        let plaintext_len = opener.open(&mut region[..filled], last)?;
        out.advance(plaintext_len);

        if last {
            return Ok(());
        }
    }
}

async fn read_full_async<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn truncated_header(n: usize) -> VaultError {
    VaultError::DecryptionFailed(format!(
        "stream header truncated: expected {} bytes, got {}",
        HEADER_LEN, n
    ))
}
