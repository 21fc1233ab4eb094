//! Client-facing framing: VarInt length prefix, optional zlib compression,
//! optional AES-128/CFB8 stream encryption.
//!
//! Without compression a frame is:
//!
//! ```text
//! +------------------+--------------------------+
//! | length (VarInt)  | packet id + body         |
//! +------------------+--------------------------+
//! ```
//!
//! With compression enabled the packet is preceded by its uncompressed
//! length, or 0 when the packet is below the threshold and sent as-is:
//!
//! ```text
//! +------------------+---------------------+----------------------------+
//! | length (VarInt)  | data length (VarInt)| zlib(packet) or packet     |
//! +------------------+---------------------+----------------------------+
//! ```
//!
//! Encryption applies to every byte on the socket once enabled. The shared
//! secret is both key and IV.

use std::io::{Read, Write};

use cfb8::cipher::generic_array::GenericArray;
use cfb8::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use tether_wire::DecodeError;
use tether_wire::varint::{peek_var_int, var_int_len, write_var_int};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame (and largest uncompressed packet) accepted: a 3-byte VarInt.
pub const MAX_FRAME_LEN: usize = 2_097_151;

type Aes128Cfb8Enc = cfb8::Encryptor<aes::Aes128>;
type Aes128Cfb8Dec = cfb8::Decryptor<aes::Aes128>;

/// Errors raised while framing or unframing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame or its uncompressed payload exceeds [`MAX_FRAME_LEN`].
    #[error("frame size {size} exceeds maximum {max}")]
    TooLarge {
        /// Claimed size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A length prefix was negative.
    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    /// A length prefix was not a valid VarInt.
    #[error("bad length prefix: {0}")]
    Prefix(#[from] DecodeError),

    /// The decompressed size did not match the announced data length.
    #[error("data length mismatch: announced {announced}, got {actual}")]
    DataLength {
        /// Announced uncompressed size.
        announced: usize,
        /// Actual uncompressed size.
        actual: usize,
    },

    /// zlib failed.
    #[error("compression error: {0}")]
    Compression(#[source] std::io::Error),

    /// The shared secret is not a valid AES-128 key.
    #[error("invalid shared secret length {0}")]
    InvalidKeyLength(usize),

    /// The peer closed the connection before a complete frame arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn cipher<C: KeyIvInit>(secret: &[u8]) -> Result<C, FrameError> {
    C::new_from_slices(secret, secret).map_err(|_| FrameError::InvalidKeyLength(secret.len()))
}

fn check_len(len: i32) -> Result<usize, FrameError> {
    let len = usize::try_from(len).map_err(|_| FrameError::NegativeLength(len))?;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            size: len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(len)
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Turns packets into bytes for the socket.
#[derive(Default)]
pub struct FrameEncoder {
    threshold: Option<u32>,
    cipher: Option<Aes128Cfb8Enc>,
}

impl FrameEncoder {
    /// Plain framing, no compression or encryption.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compress packets of at least `threshold` bytes from now on.
    pub fn set_compression(&mut self, threshold: u32) {
        self.threshold = Some(threshold);
    }

    /// Encrypt all output from now on.
    pub fn enable_encryption(&mut self, secret: &[u8]) -> Result<(), FrameError> {
        self.cipher = Some(cipher(secret)?);
        Ok(())
    }

    /// Whether encryption is on.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Frame one packet (id byte plus body).
    pub fn encode(&mut self, packet: &[u8]) -> Result<Vec<u8>, FrameError> {
        if packet.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge {
                size: packet.len(),
                max: MAX_FRAME_LEN,
            });
        }

        let mut frame = Vec::with_capacity(packet.len() + 8);
        match self.threshold {
            None => {
                write_var_int(&mut frame, packet.len() as i32);
                frame.extend_from_slice(packet);
            }
            Some(threshold) if packet.len() < threshold as usize => {
                write_var_int(&mut frame, packet.len() as i32 + 1);
                frame.push(0);
                frame.extend_from_slice(packet);
            }
            Some(_) => {
                let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
                zlib.write_all(packet).map_err(FrameError::Compression)?;
                let compressed = zlib.finish().map_err(FrameError::Compression)?;

                let data_len = packet.len() as i32;
                write_var_int(
                    &mut frame,
                    (var_int_len(data_len) + compressed.len()) as i32,
                );
                write_var_int(&mut frame, data_len);
                frame.extend_from_slice(&compressed);
            }
        }

        if let Some(cipher) = self.cipher.as_mut() {
            for byte in frame.chunks_mut(1) {
                cipher.encrypt_block_mut(GenericArray::from_mut_slice(byte));
            }
        }
        Ok(frame)
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Buffers socket bytes and splits them into packets.
#[derive(Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    threshold: Option<u32>,
    cipher: Option<Aes128Cfb8Dec>,
}

impl FrameDecoder {
    /// Plain framing, no compression or encryption.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect compressed frames from now on.
    pub fn set_compression(&mut self, threshold: u32) {
        self.threshold = Some(threshold);
    }

    /// Decrypt all input from now on, including bytes already buffered but
    /// not yet returned as packets.
    pub fn enable_encryption(&mut self, secret: &[u8]) -> Result<(), FrameError> {
        let mut cipher: Aes128Cfb8Dec = cipher(secret)?;
        decrypt(&mut cipher, &mut self.buf);
        self.cipher = Some(cipher);
        Ok(())
    }

    /// Whether encryption is on.
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Bytes received but not yet returned as packets.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append bytes read from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        let start = self.buf.len();
        self.buf.extend_from_slice(data);
        if let Some(cipher) = self.cipher.as_mut() {
            decrypt(cipher, &mut self.buf[start..]);
        }
    }

    /// Take the next complete packet, or `None` if more bytes are needed.
    pub fn next_packet(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let Some((len, header)) = peek_var_int(&self.buf)? else {
            return Ok(None);
        };
        let len = check_len(len)?;
        if self.buf.len() < header + len {
            return Ok(None);
        }
        let frame: Vec<u8> = self.buf.drain(..header + len).skip(header).collect();

        if self.threshold.is_none() {
            return Ok(Some(frame));
        }
        let Some((data_len, offset)) = peek_var_int(&frame)? else {
            return Err(DecodeError::UnexpectedEof {
                offset: 0,
                needed: 1,
            }
            .into());
        };
        let data = &frame[offset..];
        if data_len == 0 {
            return Ok(Some(data.to_vec()));
        }

        let announced = check_len(data_len)?;
        let mut packet = Vec::with_capacity(announced);
        ZlibDecoder::new(data)
            .take(announced as u64 + 1)
            .read_to_end(&mut packet)
            .map_err(FrameError::Compression)?;
        if packet.len() != announced {
            return Err(FrameError::DataLength {
                announced,
                actual: packet.len(),
            });
        }
        Ok(Some(packet))
    }
}

fn decrypt(cipher: &mut Aes128Cfb8Dec, data: &mut [u8]) {
    for byte in data.chunks_mut(1) {
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(byte));
    }
}

// ---------------------------------------------------------------------------
// Async helpers
// ---------------------------------------------------------------------------

/// Read from `reader` until `decoder` yields a packet.
///
/// Returns [`FrameError::ConnectionClosed`] on EOF.
pub async fn read_packet<R: AsyncRead + Unpin>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
) -> Result<Vec<u8>, FrameError> {
    let mut buf = [0u8; 4096];
    loop {
        if let Some(packet) = decoder.next_packet()? {
            return Ok(packet);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(FrameError::ConnectionClosed);
        }
        decoder.feed(&buf[..n]);
    }
}

/// Frame `packet` and write it out.
pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    encoder: &mut FrameEncoder,
    packet: &[u8],
) -> Result<(), FrameError> {
    let frame = encoder.encode(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const SECRET: [u8; 16] = *b"0123456789abcdef";

    fn decode_all(decoder: &mut FrameDecoder) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| decoder.next_packet().unwrap()).collect()
    }

    #[test]
    fn test_plain_frame_layout() {
        let frame = FrameEncoder::new().encode(&[0x00, 0x05]).unwrap();
        assert_eq!(frame, vec![0x02, 0x00, 0x05]);
    }

    #[test]
    fn test_small_packet_below_threshold_uncompressed() {
        let mut encoder = FrameEncoder::new();
        encoder.set_compression(64);
        let frame = encoder.encode(&[0x0B, 1, 2, 3]).unwrap();
        assert_eq!(frame, vec![0x05, 0x00, 0x0B, 1, 2, 3]);
    }

    #[test]
    fn test_large_packet_compressed() {
        let packet = vec![0x42; 1000];
        let mut encoder = FrameEncoder::new();
        encoder.set_compression(256);
        let frame = encoder.encode(&packet).unwrap();
        assert!(frame.len() < packet.len());

        let mut decoder = FrameDecoder::new();
        decoder.set_compression(256);
        decoder.feed(&frame);
        assert_eq!(decode_all(&mut decoder), vec![packet]);
    }

    #[test]
    fn test_partial_frames_wait_for_more() {
        let mut encoder = FrameEncoder::new();
        let mut bytes = encoder.encode(b"\x02hello").unwrap();
        bytes.extend(encoder.encode(b"\x02world").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.feed(&bytes[..3]);
        assert_eq!(decoder.next_packet().unwrap(), None);
        decoder.feed(&bytes[3..]);
        assert_eq!(
            decode_all(&mut decoder),
            vec![b"\x02hello".to_vec(), b"\x02world".to_vec()]
        );
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_encrypted_stream() {
        let mut encoder = FrameEncoder::new();
        encoder.enable_encryption(&SECRET).unwrap();
        let first = encoder.encode(b"\x01first").unwrap();
        let second = encoder.encode(b"\x01second").unwrap();
        assert_ne!(&first[1..], b"\x01first");

        let mut decoder = FrameDecoder::new();
        decoder.enable_encryption(&SECRET).unwrap();
        // Split mid-frame to check the cipher state carries over.
        let stream: Vec<u8> = first.into_iter().chain(second).collect();
        decoder.feed(&stream[..4]);
        decoder.feed(&stream[4..]);
        assert_eq!(
            decode_all(&mut decoder),
            vec![b"\x01first".to_vec(), b"\x01second".to_vec()]
        );
    }

    #[test]
    fn test_buffered_bytes_decrypted_retroactively() {
        let mut plain = FrameEncoder::new();
        let mut stream = plain.encode(b"\x01response").unwrap();
        let mut encrypted = FrameEncoder::new();
        encrypted.enable_encryption(&SECRET).unwrap();
        stream.extend(encrypted.encode(b"\x0Bkeepalive").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.feed(&stream);
        assert_eq!(decoder.next_packet().unwrap(), Some(b"\x01response".to_vec()));

        decoder.enable_encryption(&SECRET).unwrap();
        assert_eq!(decoder.next_packet().unwrap(), Some(b"\x0Bkeepalive".to_vec()));
    }

    #[test]
    fn test_compressed_and_encrypted() {
        let packet = vec![7u8; 600];
        let mut encoder = FrameEncoder::new();
        encoder.set_compression(256);
        encoder.enable_encryption(&SECRET).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.set_compression(256);
        decoder.enable_encryption(&SECRET).unwrap();
        decoder.feed(&encoder.encode(&packet).unwrap());
        decoder.feed(&encoder.encode(&[0x0B]).unwrap());
        assert_eq!(decode_all(&mut decoder), vec![packet, vec![0x0B]]);
    }

    #[test]
    fn test_bad_key_length() {
        let mut encoder = FrameEncoder::new();
        assert!(matches!(
            encoder.enable_encryption(&[1, 2, 3]),
            Err(FrameError::InvalidKeyLength(3))
        ));
        assert!(!encoder.is_encrypted());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = FrameDecoder::new();
        // VarInt 0x400000, one past the 3-byte maximum.
        decoder.feed(&[0x80, 0x80, 0x80, 0x02]);
        assert!(matches!(
            decoder.next_packet(),
            Err(FrameError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_data_length_mismatch_rejected() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(&[1u8; 300]).unwrap();
        let compressed = zlib.finish().unwrap();

        let mut body = Vec::new();
        write_var_int(&mut body, 400);
        body.extend_from_slice(&compressed);
        let mut frame = Vec::new();
        write_var_int(&mut frame, body.len() as i32);
        frame.extend_from_slice(&body);

        let mut decoder = FrameDecoder::new();
        decoder.set_compression(256);
        decoder.feed(&frame);
        assert!(matches!(
            decoder.next_packet(),
            Err(FrameError::DataLength {
                announced: 400,
                actual: 300
            })
        ));
    }

    #[tokio::test]
    async fn test_async_helpers_over_duplex() {
        let (mut client, mut server) = duplex(16);
        let packets: Vec<Vec<u8>> = vec![b"\x00abc".to_vec(), vec![0x0B; 100]];

        let to_send = packets.clone();
        let writer = tokio::spawn(async move {
            let mut encoder = FrameEncoder::new();
            for packet in &to_send {
                write_packet(&mut client, &mut encoder, packet).await.unwrap();
            }
        });

        let mut decoder = FrameDecoder::new();
        for expected in &packets {
            let received = read_packet(&mut server, &mut decoder).await.unwrap();
            assert_eq!(&received, expected);
        }
        writer.await.unwrap();

        assert!(matches!(
            read_packet(&mut server, &mut decoder).await,
            Err(FrameError::ConnectionClosed)
        ));
    }
}
