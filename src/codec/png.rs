//! `.drawio.png` files: the diagram XML is URL-encoded into a `tEXt` chunk with
//! the keyword `mxfile`. Older files may carry it compressed in a `zTXt` chunk.

use std::io::Read;

use flate2::Crc;
use flate2::read::ZlibDecoder;

use crate::error::CodecError;

const FORMAT: &str = ".drawio.png";
const KEYWORD: &[u8] = b"mxfile";

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

struct Chunk<'a> {
    kind: [u8; 4],
    data: &'a [u8],
    /// Length, type, data and CRC exactly as stored.
    raw: &'a [u8],
}

impl Chunk<'_> {
    fn is_diagram(&self) -> bool {
        matches!(&self.kind, b"tEXt" | b"zTXt") && keyword(self.data) == Some(KEYWORD)
    }
}

pub fn decode(bytes: &[u8]) -> Result<String, CodecError> {
    if bytes.is_empty() {
        return Ok(String::new());
    }

    let (chunks, _) = parse(bytes)?;
    let chunk = chunks
        .iter()
        .find(|c| c.is_diagram())
        .ok_or(CodecError::MissingDiagram { format: FORMAT })?;

    let value = &chunk.data[KEYWORD.len() + 1..];
    let encoded = match &chunk.kind {
        b"zTXt" => inflate(value)?,
        _ => value.to_vec(),
    };
    let encoded = String::from_utf8(encoded).map_err(|_| CodecError::InvalidUtf8)?;

    urlencoding::decode(&encoded)
        .map(|xml| xml.into_owned())
        .map_err(|_| CodecError::InvalidUtf8)
}

pub fn encode(container: &[u8], diagram: &str) -> Result<Vec<u8>, CodecError> {
    if container.is_empty() {
        return Err(CodecError::EmptyContainer { format: FORMAT });
    }
    if decode(container).as_deref() == Ok(diagram) {
        return Ok(container.to_vec());
    }

    let (chunks, trailer) = parse(container)?;
    let mut data = Vec::with_capacity(KEYWORD.len() + 1 + diagram.len());
    data.extend_from_slice(KEYWORD);
    data.push(0);
    data.extend_from_slice(urlencoding::encode(diagram).as_bytes());

    let mut out = Vec::with_capacity(container.len() + data.len() + 12);
    out.extend_from_slice(&SIGNATURE);

    let mut written = false;
    for chunk in &chunks {
        if chunk.is_diagram() {
            if !written {
                write_chunk(&mut out, b"tEXt", &data);
                written = true;
            }
            continue;
        }
        if &chunk.kind == b"IEND" && !written {
            write_chunk(&mut out, b"tEXt", &data);
            written = true;
        }
        out.extend_from_slice(chunk.raw);
    }
    out.extend_from_slice(trailer);

    Ok(out)
}

/// Append one chunk with its length prefix and CRC.
pub fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);

    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
}

/// Split a PNG into its chunks up to and including `IEND`, plus any trailing bytes.
fn parse(bytes: &[u8]) -> Result<(Vec<Chunk<'_>>, &[u8]), CodecError> {
    if !bytes.starts_with(&SIGNATURE) {
        return Err(malformed("missing PNG signature"));
    }

    let mut chunks = Vec::new();
    let mut pos = SIGNATURE.len();
    loop {
        let header = bytes
            .get(pos..pos + 8)
            .ok_or_else(|| malformed("truncated chunk header"))?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];

        let end = pos
            .checked_add(12)
            .and_then(|p| p.checked_add(len))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| malformed("truncated chunk data"))?;

        chunks.push(Chunk {
            kind,
            data: &bytes[pos + 8..pos + 8 + len],
            raw: &bytes[pos..end],
        });
        pos = end;

        if &kind == b"IEND" {
            return Ok((chunks, &bytes[pos..]));
        }
    }
}

fn keyword(data: &[u8]) -> Option<&[u8]> {
    data.iter().position(|&b| b == 0).map(|nul| &data[..nul])
}

/// `zTXt` payload: one compression-method byte followed by a zlib stream.
fn inflate(value: &[u8]) -> Result<Vec<u8>, CodecError> {
    let (&method, stream) = value
        .split_first()
        .ok_or_else(|| malformed("empty zTXt chunk"))?;
    if method != 0 {
        return Err(malformed("unknown zTXt compression method"));
    }

    let mut out = Vec::new();
    ZlibDecoder::new(stream)
        .read_to_end(&mut out)
        .map_err(|e| malformed(&format!("bad zTXt stream: {e}")))?;
    Ok(out)
}

fn malformed(reason: &str) -> CodecError {
    CodecError::Malformed {
        format: FORMAT,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    use super::*;

    fn image() -> Vec<u8> {
        let mut png = SIGNATURE.to_vec();
        write_chunk(&mut png, b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
        write_chunk(&mut png, b"IDAT", &[0x78, 0x9c, 0x63, 0x00, 0x00, 0x00, 0x01, 0x00]);
        write_chunk(&mut png, b"IEND", &[]);
        png
    }

    #[test]
    fn test_embed_then_decode() {
        let xml = "<mxfile><diagram name=\"Seite 1\">ä & b</diagram></mxfile>";
        let png = encode(&image(), xml).unwrap();

        assert!(png.starts_with(&SIGNATURE));
        assert!(png.ends_with(&image()[image().len() - 12..]));
        assert_eq!(decode(&png).unwrap(), xml);
    }

    #[test]
    fn test_noop_encode_is_byte_identical() {
        let png = encode(&image(), "<mxfile/>").unwrap();
        assert_eq!(encode(&png, "<mxfile/>").unwrap(), png);
    }

    #[test]
    fn test_reencode_replaces_existing_chunk() {
        let first = encode(&image(), "<mxfile>one</mxfile>").unwrap();
        let second = encode(&first, "<mxfile>two</mxfile>").unwrap();

        assert_eq!(decode(&second).unwrap(), "<mxfile>two</mxfile>");
        let (chunks, _) = parse(&second).unwrap();
        assert_eq!(chunks.iter().filter(|c| c.is_diagram()).count(), 1);
    }

    #[test]
    fn test_decode_compressed_chunk() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(urlencoding::encode("<mxfile/>").as_bytes())
            .unwrap();
        let mut data = b"mxfile\0\0".to_vec();
        data.extend(encoder.finish().unwrap());

        let mut png = SIGNATURE.to_vec();
        write_chunk(&mut png, b"zTXt", &data);
        write_chunk(&mut png, b"IEND", &[]);

        assert_eq!(decode(&png).unwrap(), "<mxfile/>");
    }

    #[test]
    fn test_plain_image_has_no_diagram() {
        assert_eq!(
            decode(&image()),
            Err(CodecError::MissingDiagram { format: FORMAT })
        );
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            decode(b"GIF89a"),
            Err(CodecError::Malformed { .. })
        ));

        let mut truncated = image();
        truncated.truncate(20);
        assert!(matches!(
            decode(&truncated),
            Err(CodecError::Malformed { .. })
        ));
        assert_eq!(
            encode(b"", "<mxfile/>"),
            Err(CodecError::EmptyContainer { format: FORMAT })
        );
    }
}
