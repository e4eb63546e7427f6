//! Tile layer data on the wire.
//!
//! A layer's GIDs are written as little-endian `u32` words, optionally
//! compressed with zlib or gzip, then base64 encoded. The alternative is
//! CSV text, which is never compressed.

use crate::error::{MapError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::{Compression as Level, GzBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Base64,
    Csv,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Base64 => "base64",
            Encoding::Csv => "csv",
        }
    }
}

impl FromStr for Encoding {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "base64" => Ok(Encoding::Base64),
            "csv" => Ok(Encoding::Csv),
            other => Err(MapError::InvalidEncoding(format!(
                "unknown encoding '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[serde(rename = "", alias = "none")]
    None,
    #[default]
    Zlib,
    Gzip,
}

impl Compression {
    /// Wire name; empty for no compression.
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Zlib => "zlib",
            Compression::Gzip => "gzip",
        }
    }
}

impl FromStr for Compression {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "none" => Ok(Compression::None),
            "zlib" => Ok(Compression::Zlib),
            "gzip" => Ok(Compression::Gzip),
            other => Err(MapError::InvalidEncoding(format!(
                "unknown compression '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one tile layer is stored. Defaults to zlib-compressed base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DataFormat {
    pub encoding: Encoding,
    pub compression: Compression,
}

impl DataFormat {
    pub const CSV: DataFormat = DataFormat {
        encoding: Encoding::Csv,
        compression: Compression::None,
    };

    pub fn new(encoding: Encoding, compression: Compression) -> Result<Self> {
        let format = Self {
            encoding,
            compression,
        };
        format.check()?;
        Ok(format)
    }

    /// Parse wire names, as found in `encoding` / `compression` attributes.
    pub fn from_names(encoding: &str, compression: Option<&str>) -> Result<Self> {
        Self::new(encoding.parse()?, compression.unwrap_or("").parse()?)
    }

    fn check(&self) -> Result<()> {
        if self.encoding == Encoding::Csv && self.compression != Compression::None {
            return Err(MapError::InvalidEncoding(format!(
                "csv data cannot be {} compressed",
                self.compression
            )));
        }
        Ok(())
    }
}

fn to_le_bytes(data: &[u32]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn from_le_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(MapError::InvalidEncoding(format!(
            "{} bytes of tile data is not a whole number of 32-bit words",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}

fn compress(bytes: &[u8], compression: Compression) -> Result<Vec<u8>> {
    let fail = |e: std::io::Error| MapError::InvalidEncoding(format!("{compression}: {e}"));
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Zlib => {
            let mut enc = ZlibEncoder::new(Vec::new(), Level::default());
            enc.write_all(bytes).map_err(fail)?;
            enc.finish().map_err(fail)
        }
        Compression::Gzip => {
            // fixed mtime keeps the output reproducible
            let mut enc = GzBuilder::new().mtime(0).write(Vec::new(), Level::default());
            enc.write_all(bytes).map_err(fail)?;
            enc.finish().map_err(fail)
        }
    }
}

fn decompress(bytes: Vec<u8>, compression: Compression) -> Result<Vec<u8>> {
    let fail = |e: std::io::Error| MapError::InvalidEncoding(format!("{compression}: {e}"));
    let mut out = Vec::new();
    match compression {
        Compression::None => return Ok(bytes),
        Compression::Zlib => ZlibDecoder::new(&bytes[..]).read_to_end(&mut out),
        Compression::Gzip => GzDecoder::new(&bytes[..]).read_to_end(&mut out),
    }
    .map_err(fail)?;
    Ok(out)
}

/// Encode a layer's raw values. CSV output has one line per row of `width`
/// values.
pub fn encode(data: &[u32], width: usize, format: DataFormat) -> Result<String> {
    format.check()?;
    match format.encoding {
        Encoding::Csv => Ok(data
            .chunks(width.max(1))
            .map(|row| {
                row.iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join(",\n")),
        Encoding::Base64 => {
            let bytes = compress(&to_le_bytes(data), format.compression)?;
            Ok(STANDARD.encode(bytes))
        }
    }
}

/// Decode a payload written by [`encode`] (or by an editor) back into
/// exactly `expected` values.
pub fn decode(payload: &str, format: DataFormat, expected: usize) -> Result<Vec<u32>> {
    format.check()?;
    let data = match format.encoding {
        Encoding::Csv => payload
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<u32>().map_err(|_| {
                    MapError::InvalidEncoding(format!("bad csv tile value '{tok}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Encoding::Base64 => {
            let text: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(text.as_bytes())
                .map_err(|e| MapError::InvalidEncoding(format!("base64: {e}")))?;
            from_le_bytes(&decompress(bytes, format.compression)?)?
        }
    };
    if data.len() != expected {
        return Err(MapError::InvalidLayerData {
            expected,
            actual: data.len(),
        });
    }
    Ok(data)
}
