//! framing of file objects
//!
//! a content stream is `[u32 BE header length][pad to 8][header][content]`.
//! the checksum of a file object is the SHA-256 of its uncompressed stream.
//! the compressed (archive) layout uses the compressed header and stores the
//! content as raw deflate.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::checksum::{Checksum, Hasher};
use crate::error::{Error, Result};
use crate::object::FileHeader;

/// offset of the header inside a content stream
pub const HEADER_OFFSET: usize = 8;

fn frame_prefix(header_len: usize) -> io::Result<[u8; HEADER_OFFSET]> {
    let len = u32::try_from(header_len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "file header too large"))?;
    let mut prefix = [0u8; HEADER_OFFSET];
    prefix[..4].copy_from_slice(&len.to_be_bytes());
    Ok(prefix)
}

/// frame an encoded header and in-memory content
pub fn wrap_content(header: &[u8], content: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_OFFSET + header.len() + content.len());
    out.extend_from_slice(&frame_prefix(header.len())?);
    out.extend_from_slice(header);
    out.extend_from_slice(content);
    Ok(out)
}

/// stream the framed object into `out`, returning the bytes written
pub fn write_content_stream<W: Write, R: Read>(
    out: &mut W,
    header: &[u8],
    mut content: R,
) -> io::Result<u64> {
    out.write_all(&frame_prefix(header.len())?)?;
    out.write_all(header)?;
    let n = io::copy(&mut content, out)?;
    Ok((HEADER_OFFSET + header.len()) as u64 + n)
}

/// stream the compressed layout of a file object into `out`
pub fn write_compressed_content_stream<W: Write, R: Read>(
    out: &mut W,
    header: &FileHeader,
    mut content: R,
) -> io::Result<()> {
    let encoded = header.encode_compressed();
    out.write_all(&frame_prefix(encoded.len())?)?;
    out.write_all(&encoded)?;
    let mut encoder = DeflateEncoder::new(out, Compression::default());
    io::copy(&mut content, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

/// split a content stream into its header and a reader over the content
///
/// for the plain layout the content size is whatever follows the header;
/// for the compressed layout it is taken from the header.
pub fn unwrap_content(stream: &[u8], compressed: bool) -> Result<(FileHeader, Box<dyn Read + '_>)> {
    let (header_bytes, rest) = split_frame(stream)?;
    if compressed {
        let header = FileHeader::decode_compressed(header_bytes)?;
        let reader = DeflateDecoder::new(rest).take(header.info.size);
        Ok((header, Box::new(reader)))
    } else {
        let mut header = FileHeader::decode(header_bytes)?;
        header.info.size = rest.len() as u64;
        Ok((header, Box::new(rest)))
    }
}

/// like `unwrap_content`, reading the whole content into memory
pub fn unwrap_content_to_vec(stream: &[u8], compressed: bool) -> Result<(FileHeader, Vec<u8>)> {
    let (header, mut reader) = unwrap_content(stream, compressed)?;
    let mut content = Vec::with_capacity(header.info.size.min(1 << 20) as usize);
    reader.read_to_end(&mut content).map_err(|source| Error::Io {
        path: "<content stream>".into(),
        source,
    })?;
    if content.len() as u64 != header.info.size {
        return Err(Error::invalid_variant(format!(
            "content is {} bytes, header declares {}",
            content.len(),
            header.info.size
        )));
    }
    Ok((header, content))
}

fn split_frame(stream: &[u8]) -> Result<(&[u8], &[u8])> {
    let available = stream.len() as u64;
    if stream.len() < HEADER_OFFSET {
        return Err(Error::HeaderSize { size: 0, available });
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&stream[..4]);
    let size = u32::from_be_bytes(len) as u64;
    if size == 0 || size + HEADER_OFFSET as u64 > available {
        return Err(Error::HeaderSize { size, available });
    }
    let end = HEADER_OFFSET + size as usize;
    Ok((&stream[HEADER_OFFSET..end], &stream[end..]))
}

/// checksum of a file object given its header and uncompressed content
pub fn file_checksum<R: Read>(header: &FileHeader, content: R) -> io::Result<Checksum> {
    let mut hasher = Hasher::new();
    write_content_stream(&mut hasher, &header.encode(), content)?;
    Ok(hasher.finalize())
}
